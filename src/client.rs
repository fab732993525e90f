//! HTTP plumbing shared by the search and stream clients.
//!
//! [`ApiBase`] is a validated backend origin that endpoint URLs are built
//! from; [`build_http_client`] creates the single [`reqwest::Client`] that
//! every session reuses for connection pooling.

use anyhow::{bail, Result};
use std::time::Duration;
use url::Url;

use crate::config::HttpConfig;

/// A validated absolute `http`/`https` base URL.
///
/// May carry a path prefix (`https://host/api`); endpoint segments are
/// appended after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiBase {
    url: Url,
}

impl ApiBase {
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw.trim())?;
        match url.scheme() {
            "http" | "https" => {}
            other => bail!("unsupported scheme '{}', expected http or https", other),
        }
        if url.cannot_be_a_base() {
            bail!("'{}' cannot be used as a base URL", raw);
        }
        Ok(Self { url })
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Append path segments, percent-encoding each one individually.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.url.clone();
        url.set_query(None);
        url.set_fragment(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

/// Build the shared HTTP client from the `[http]` config section.
pub fn build_http_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .build()?;
    Ok(client)
}
