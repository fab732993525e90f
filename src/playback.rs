//! Playback session for one selected clip.
//!
//! [`PlaybackSession`] owns the timeline state (source, status, current
//! time, duration) and drives a [`MediaElement`], the collaborator that
//! actually fetches and decodes the stream. Progress flows back in through
//! the observer methods ([`on_ready`](PlaybackSession::on_ready),
//! [`on_time_update`](PlaybackSession::on_time_update),
//! [`on_duration_known`](PlaybackSession::on_duration_known)), which tests
//! call directly with literal values.
//!
//! ```text
//!   Empty ──load──▶ Loaded ──play──▶ Playing ◀──play/pause──▶ Paused
//!                     ▲                 │                       │
//!                     └──────stop───────┴───────────stop────────┘
//! ```

use std::sync::Arc;

use serde::Serialize;

use crate::auth::{AuthProvider, Credentials};
use crate::client::ApiBase;
use crate::config::{PlaybackConfig, StreamEndpoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    /// No clip selected.
    Empty,
    /// Source set; not playing (freshly loaded, or stopped).
    Loaded,
    Playing,
    Paused,
}

impl PlaybackStatus {
    pub fn is_playable(self) -> bool {
        self != PlaybackStatus::Empty
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackState {
    pub status: PlaybackStatus,
    pub video_id: Option<String>,
    pub source_url: Option<String>,
    /// Seconds from the start of the clip, always `>= 0`.
    pub current_time: f64,
    /// Clip length in seconds; `None` until the media reports metadata.
    pub duration: Option<f64>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            status: PlaybackStatus::Empty,
            video_id: None,
            source_url: None,
            current_time: 0.0,
            duration: None,
        }
    }
}

/// Everything a media element needs to open a clip with the session's credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSource {
    pub video_id: String,
    pub url: url::Url,
    pub credentials: Option<Credentials>,
}

/// The media element refused an operation (decode error, autoplay policy, auth).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("media error: {0}")]
pub struct MediaError(pub String);

/// The underlying player the session drives.
///
/// Implementations report progress back through the session's observer
/// methods. Errors raised while streaming are the element's to surface.
pub trait MediaElement {
    fn set_source(&mut self, source: &StreamSource);
    fn play(&mut self) -> Result<(), MediaError>;
    fn pause(&mut self);
    fn set_current_time(&mut self, seconds: f64);
}

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("Sign in to play recordings")]
    SignInRequired,

    #[error("No video loaded")]
    NothingLoaded,

    #[error("No search result at position {0}")]
    NoSuchResult(usize),

    #[error(transparent)]
    Media(#[from] MediaError),
}

pub struct PlaybackSession<M> {
    media: M,
    base: ApiBase,
    auth: Arc<dyn AuthProvider>,
    endpoint: StreamEndpoint,
    skip_step: f64,
    autoplay: bool,
    autoplay_armed: bool,
    state: PlaybackState,
}

impl<M: MediaElement> PlaybackSession<M> {
    pub fn new(media: M, base: ApiBase, auth: Arc<dyn AuthProvider>) -> Self {
        Self::with_config(media, base, auth, &PlaybackConfig::default())
    }

    pub fn with_config(
        media: M,
        base: ApiBase,
        auth: Arc<dyn AuthProvider>,
        config: &PlaybackConfig,
    ) -> Self {
        Self {
            media,
            base,
            auth,
            endpoint: config.endpoint,
            skip_step: config.skip_seconds,
            autoplay: config.autoplay,
            autoplay_armed: false,
            state: PlaybackState::default(),
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn status(&self) -> PlaybackStatus {
        self.state.status
    }

    pub fn media(&self) -> &M {
        &self.media
    }

    pub fn media_mut(&mut self) -> &mut M {
        &mut self.media
    }

    /// Stream URL for a clip under the configured endpoint.
    pub fn stream_url(&self, video_id: &str) -> url::Url {
        stream_url(&self.base, self.endpoint, video_id)
    }

    /// Select a clip. Any previous timeline is discarded.
    pub fn load(&mut self, video_id: &str) -> Result<&PlaybackState, PlaybackError> {
        self.require_auth()?;

        if self.state.status == PlaybackStatus::Playing {
            self.media.pause();
        }

        let source = StreamSource {
            video_id: video_id.to_string(),
            url: self.stream_url(video_id),
            credentials: self.auth.credentials(),
        };
        tracing::info!(video_id, url = %source.url, "loading clip");

        self.state = PlaybackState {
            status: PlaybackStatus::Loaded,
            video_id: Some(source.video_id.clone()),
            source_url: Some(source.url.to_string()),
            current_time: 0.0,
            duration: None,
        };
        self.autoplay_armed = self.autoplay;
        self.media.set_source(&source);
        Ok(&self.state)
    }

    /// Media is ready to play: start playback if autoplay is armed.
    ///
    /// A refusal is expected (readiness races, autoplay policies) and leaves
    /// the session in `Loaded`.
    pub fn on_ready(&mut self) {
        if !self.autoplay_armed || self.state.status != PlaybackStatus::Loaded {
            return;
        }
        self.autoplay_armed = false;
        match self.media.play() {
            Ok(()) => self.state.status = PlaybackStatus::Playing,
            Err(e) => tracing::debug!(error = %e, "autoplay refused"),
        }
    }

    pub fn play_pause(&mut self) -> Result<PlaybackStatus, PlaybackError> {
        self.require_loaded()?;
        self.autoplay_armed = false;

        match self.state.status {
            PlaybackStatus::Playing => {
                self.media.pause();
                self.state.status = PlaybackStatus::Paused;
            }
            _ => {
                self.media.play()?;
                self.state.status = PlaybackStatus::Playing;
            }
        }
        Ok(self.state.status)
    }

    /// Pause and rewind to the start. The clip stays loaded.
    pub fn stop(&mut self) -> Result<(), PlaybackError> {
        self.require_loaded()?;
        self.autoplay_armed = false;
        self.media.pause();
        self.move_to(0.0);
        self.state.status = PlaybackStatus::Loaded;
        Ok(())
    }

    /// Move by `delta` seconds, saturating at `0` and at the duration.
    pub fn skip(&mut self, delta: f64) -> Result<f64, PlaybackError> {
        self.require_loaded()?;
        let target = self.state.current_time + delta;
        if target.is_finite() {
            self.move_to(target);
        }
        Ok(self.state.current_time)
    }

    pub fn skip_forward(&mut self) -> Result<f64, PlaybackError> {
        self.skip(self.skip_step)
    }

    pub fn skip_back(&mut self) -> Result<f64, PlaybackError> {
        self.skip(-self.skip_step)
    }

    /// Jump to a slider position.
    pub fn seek(&mut self, target: f64) -> Result<f64, PlaybackError> {
        self.require_loaded()?;
        if target.is_finite() {
            self.move_to(target);
        }
        Ok(self.state.current_time)
    }

    /// Progress report from the media element.
    pub fn on_time_update(&mut self, time: f64) {
        if time.is_finite() {
            self.state.current_time = self.clamp(time);
        }
    }

    /// Metadata report from the media element.
    pub fn on_duration_known(&mut self, duration: f64) {
        if !duration.is_finite() || duration < 0.0 {
            tracing::debug!(duration, "ignoring unusable duration");
            return;
        }
        self.state.duration = Some(duration);
        self.state.current_time = self.clamp(self.state.current_time);
    }

    /// `(current, duration)` labels for the timeline; unknown duration is `--:--`.
    pub fn timeline(&self) -> (String, String) {
        let duration = self
            .state
            .duration
            .map(format_time)
            .unwrap_or_else(|| "--:--".to_string());
        (format_time(self.state.current_time), duration)
    }

    fn move_to(&mut self, target: f64) {
        let time = self.clamp(target);
        self.state.current_time = time;
        self.media.set_current_time(time);
    }

    fn clamp(&self, time: f64) -> f64 {
        let upper = self.state.duration.unwrap_or(f64::INFINITY);
        time.clamp(0.0, upper)
    }

    fn require_auth(&self) -> Result<(), PlaybackError> {
        if self.auth.is_authenticated() {
            Ok(())
        } else {
            Err(PlaybackError::SignInRequired)
        }
    }

    fn require_loaded(&self) -> Result<(), PlaybackError> {
        self.require_auth()?;
        if self.state.status.is_playable() {
            Ok(())
        } else {
            Err(PlaybackError::NothingLoaded)
        }
    }
}

pub fn stream_url(base: &ApiBase, endpoint: StreamEndpoint, video_id: &str) -> url::Url {
    match endpoint {
        StreamEndpoint::Raw => base.endpoint(&["video", video_id]),
        StreamEndpoint::Decrypted => base.endpoint(&["video", "decrypted", video_id]),
    }
}

/// Render seconds as `m:ss`.
pub fn format_time(seconds: f64) -> String {
    let whole = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", whole / 60, whole % 60)
}
