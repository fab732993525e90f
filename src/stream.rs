//! Credentialed, range-addressed access to clip bytes.
//!
//! The media element normally consumes `/video/{id}` on its own; this
//! client reaches the same endpoint directly for the `probe` and `fetch`
//! commands (checking range support, pulling a clip or a slice of one to
//! disk). Requests go out with the credentials on the [`StreamSource`], the
//! same ones search uses.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use reqwest::StatusCode;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::auth::{AuthProvider, SessionAuth};
use crate::client::{build_http_client, ApiBase};
use crate::config::{Config, StreamEndpoint};
use crate::playback::{stream_url, StreamSource};
use crate::search::rejection_message;

/// Fallback message for rejected video requests.
pub const VIDEO_REQUEST_FAILED: &str = "Video request failed";

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Sign in to stream recordings")]
    SignInRequired,

    #[error("Network error")]
    Network(#[source] reqwest::Error),

    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// Writing to the download destination failed.
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Inclusive byte range, `end` open when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn starting_at(start: u64) -> Self {
        Self { start, end: None }
    }

    pub fn bounded(start: u64, end: u64) -> Result<Self, String> {
        if end < start {
            return Err(format!("range end {} is before start {}", end, start));
        }
        Ok(Self {
            start,
            end: Some(end),
        })
    }

    /// Value for the `Range` request header.
    pub fn header_value(&self) -> String {
        format!("bytes={}", self)
    }

    /// Number of bytes covered, when bounded and representable.
    pub fn byte_count(&self) -> Option<u64> {
        self.end.and_then(|end| (end - self.start).checked_add(1))
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{}-{}", self.start, end),
            None => write!(f, "{}-", self.start),
        }
    }
}

impl FromStr for ByteRange {
    type Err = String;

    /// Parses `start-end` or `start-`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("invalid range '{}': expected START-END or START-", s))?;
        let start: u64 = start
            .trim()
            .parse()
            .map_err(|_| format!("invalid range start in '{}'", s))?;
        let end = end.trim();
        if end.is_empty() {
            return Ok(Self::starting_at(start));
        }
        let end: u64 = end
            .parse()
            .map_err(|_| format!("invalid range end in '{}'", s))?;
        Self::bounded(start, end)
    }
}

/// What a one-byte probe learned about a clip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamInfo {
    pub status: u16,
    pub accepts_ranges: bool,
    /// Full clip size in bytes, when the server disclosed it.
    pub total_length: Option<u64>,
    pub content_type: Option<String>,
}

pub struct StreamClient {
    client: reqwest::Client,
    base: ApiBase,
    auth: Arc<dyn AuthProvider>,
    endpoint: StreamEndpoint,
}

impl StreamClient {
    pub fn new(client: reqwest::Client, base: ApiBase, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            client,
            base,
            auth,
            endpoint: StreamEndpoint::default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: StreamEndpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn from_config(
        config: &Config,
        client: reqwest::Client,
        auth: Arc<dyn AuthProvider>,
    ) -> Result<Self> {
        Ok(Self::new(client, config.api_base()?, auth).with_endpoint(config.playback.endpoint))
    }

    pub fn connect(config: &Config) -> Result<Self> {
        let client = build_http_client(&config.http)?;
        let auth: Arc<dyn AuthProvider> = Arc::new(SessionAuth::from_config(&config.auth));
        Self::from_config(config, client, auth)
    }

    /// Credentialed source for a clip, as a media element would receive it.
    pub fn source(&self, video_id: &str) -> Result<StreamSource, StreamError> {
        if !self.auth.is_authenticated() {
            return Err(StreamError::SignInRequired);
        }
        Ok(StreamSource {
            video_id: video_id.to_string(),
            url: stream_url(&self.base, self.endpoint, video_id),
            credentials: self.auth.credentials(),
        })
    }

    /// Request the first byte and report how the server serves the clip.
    pub async fn probe(&self, source: &StreamSource) -> Result<StreamInfo, StreamError> {
        let first_byte = ByteRange {
            start: 0,
            end: Some(0),
        };
        let response = self.send(source, Some(first_byte)).await?;
        let headers = response.headers();

        let status = response.status();
        let accepts_ranges = status == StatusCode::PARTIAL_CONTENT
            || header_str(headers, ACCEPT_RANGES)
                .map(|v| v.eq_ignore_ascii_case("bytes"))
                .unwrap_or(false);

        let total_length = header_str(headers, CONTENT_RANGE)
            .and_then(content_range_total)
            .or_else(|| {
                if status == StatusCode::PARTIAL_CONTENT {
                    None
                } else {
                    header_str(headers, CONTENT_LENGTH).and_then(|v| v.parse().ok())
                }
            });

        let info = StreamInfo {
            status: status.as_u16(),
            accepts_ranges,
            total_length,
            content_type: header_str(headers, CONTENT_TYPE).map(str::to_string),
        };
        tracing::debug!(video_id = %source.video_id, ?info, "probed stream");
        Ok(info)
    }

    /// Stream the clip (or `range` of it) into `writer`; returns bytes written.
    pub async fn download<W>(
        &self,
        source: &StreamSource,
        range: Option<ByteRange>,
        writer: &mut W,
    ) -> Result<u64, StreamError>
    where
        W: AsyncWrite + Unpin,
    {
        self.open(source, range).await?.copy_to(writer).await
    }

    /// Send the request and check its status without reading the body.
    pub async fn open(
        &self,
        source: &StreamSource,
        range: Option<ByteRange>,
    ) -> Result<ClipStream, StreamError> {
        let response = self.send(source, range).await?;
        Ok(ClipStream {
            video_id: source.video_id.clone(),
            range,
            response,
        })
    }

    async fn send(
        &self,
        source: &StreamSource,
        range: Option<ByteRange>,
    ) -> Result<reqwest::Response, StreamError> {
        if !self.auth.is_authenticated() {
            return Err(StreamError::SignInRequired);
        }

        let mut request = self.client.get(source.url.clone());
        if let Some(credentials) = &source.credentials {
            request = credentials.apply(request);
        }
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }

        let response = request.send().await.map_err(StreamError::Network)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(StreamError::Rejected {
                status: status.as_u16(),
                message: rejection_message(&body, VIDEO_REQUEST_FAILED),
            });
        }
        Ok(response)
    }
}

/// An accepted clip response whose body has not been read yet.
pub struct ClipStream {
    video_id: String,
    range: Option<ByteRange>,
    response: reqwest::Response,
}

impl ClipStream {
    pub fn status(&self) -> u16 {
        self.response.status().as_u16()
    }

    /// Copy the body into `writer`; returns bytes written.
    pub async fn copy_to<W>(mut self, writer: &mut W) -> Result<u64, StreamError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut written = 0u64;
        while let Some(chunk) = self.response.chunk().await.map_err(StreamError::Network)? {
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;

        tracing::info!(
            video_id = %self.video_id,
            range = ?self.range.map(|r| r.to_string()),
            bytes = written,
            "download complete"
        );
        Ok(written)
    }
}

fn header_str(
    headers: &reqwest::header::HeaderMap,
    name: reqwest::header::HeaderName,
) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Total length from a `Content-Range` value (`bytes 0-0/1234`, `bytes */1234`).
fn content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.trim().strip_prefix("bytes")?.rsplit_once('/')?;
    total.trim().parse().ok()
}

/// CLI entry point for `probe`.
pub async fn run_probe(config: &Config, video_id: &str) -> Result<()> {
    let client = StreamClient::connect(config)?;
    let source = client.source(video_id).map_err(cli_error)?;
    let info = client.probe(&source).await.map_err(cli_error)?;

    println!("video:         {}", video_id);
    println!("url:           {}", source.url);
    println!("status:        {}", info.status);
    println!(
        "range support: {}",
        if info.accepts_ranges { "yes" } else { "no" }
    );
    match info.total_length {
        Some(len) => println!(
            "length:        {} ({} bytes)",
            crate::search::format_bytes(len),
            len
        ),
        None => println!("length:        unknown"),
    }
    println!(
        "content type:  {}",
        info.content_type.as_deref().unwrap_or("unknown")
    );
    Ok(())
}

/// CLI entry point for `fetch`.
pub async fn run_fetch(
    config: &Config,
    video_id: &str,
    out: &Path,
    range: Option<ByteRange>,
) -> Result<()> {
    let client = StreamClient::connect(config)?;
    let source = client.source(video_id).map_err(cli_error)?;
    let clip = client.open(&source, range).await.map_err(cli_error)?;

    // Stage next to the destination; `out` is only replaced on success.
    let staging = staging_path(out);
    let mut file = tokio::fs::File::create(&staging).await.map_err(|e| {
        anyhow::anyhow!("Failed to create output file {}: {}", staging.display(), e)
    })?;
    let copied = clip.copy_to(&mut file).await;
    drop(file);

    let written = match copied {
        Ok(written) => written,
        Err(e) => {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(cli_error(e));
        }
    };
    if let Err(e) = tokio::fs::rename(&staging, out).await {
        let _ = tokio::fs::remove_file(&staging).await;
        anyhow::bail!("Failed to write output file {}: {}", out.display(), e);
    }

    println!(
        "Wrote {} to {}",
        crate::search::format_bytes(written),
        out.display()
    );
    Ok(())
}

fn staging_path(out: &Path) -> PathBuf {
    let mut name = out.file_name().map(OsString::from).unwrap_or_default();
    name.push(".part");
    out.with_file_name(name)
}

fn cli_error(err: StreamError) -> anyhow::Error {
    match err {
        StreamError::SignInRequired => anyhow::anyhow!(
            "Authentication required. Set [auth].token or {}.",
            crate::auth::TOKEN_ENV
        ),
        other => anyhow::anyhow!("{}", other),
    }
}
