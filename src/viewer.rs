//! View coordinator: one viewing session over search and playback.
//!
//! Owns the [`Filter`] being edited, routes submit/clear to the
//! [`SearchSession`] and result selection to the [`PlaybackSession`]. While
//! the injected auth reports no session, only the sign-in screen is
//! reachable and every action is refused without side effects.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::auth::AuthProvider;
use crate::config::Config;
use crate::playback::{MediaElement, PlaybackError, PlaybackSession, PlaybackState};
use crate::query::{Filter, FilterField};
use crate::search::{SearchError, SearchSession, SearchState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    SignIn,
    Browse,
}

pub struct Viewer<M> {
    search: SearchSession,
    playback: PlaybackSession<M>,
    filter: Filter,
}

impl<M: MediaElement> Viewer<M> {
    pub fn new(search: SearchSession, playback: PlaybackSession<M>) -> Self {
        Self {
            search,
            playback,
            filter: Filter::new(),
        }
    }

    /// Wire both sessions to the same HTTP client and auth capability.
    pub fn from_config(
        config: &Config,
        client: reqwest::Client,
        auth: Arc<dyn AuthProvider>,
        media: M,
    ) -> Result<Self> {
        let search = SearchSession::from_config(config, client, auth.clone())?;
        let playback =
            PlaybackSession::with_config(media, config.api_base()?, auth, &config.playback);
        Ok(Self::new(search, playback))
    }

    pub fn screen(&self) -> Screen {
        if self.search.auth().is_authenticated() {
            Screen::Browse
        } else {
            Screen::SignIn
        }
    }

    /// Enter the view: on the browse screen, list every clip.
    pub async fn open(&mut self) -> Result<Screen, SearchError> {
        if self.screen() == Screen::SignIn {
            return Ok(Screen::SignIn);
        }
        self.search.search(&self.filter).await?;
        Ok(Screen::Browse)
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn set_field(
        &mut self,
        field: FilterField,
        value: impl Into<String>,
    ) -> Result<(), SearchError> {
        self.require_browse()?;
        self.filter.set_field(field, value);
        Ok(())
    }

    /// Search with the current filter. Refused while a search is loading.
    pub async fn submit(&mut self) -> Result<SearchState, SearchError> {
        self.require_browse()?;
        if self.search.is_loading() {
            return Err(SearchError::Busy);
        }
        self.search.search(&self.filter).await
    }

    pub async fn clear(&mut self) -> Result<SearchState, SearchError> {
        self.search.clear(&mut self.filter).await
    }

    pub fn results(&self) -> SearchState {
        self.search.state()
    }

    pub fn summary(&self) -> String {
        let stats = self.search.state().stats;
        format!("Showing {} of {} videos", stats.filtered, stats.total)
    }

    /// Load the result at `index` of the current result list.
    pub fn select(&mut self, index: usize) -> Result<&PlaybackState, PlaybackError> {
        if self.screen() == Screen::SignIn {
            return Err(PlaybackError::SignInRequired);
        }
        let video_id = self
            .search
            .state()
            .results
            .get(index)
            .map(|r| r.video_id.clone())
            .ok_or(PlaybackError::NoSuchResult(index))?;
        self.playback.load(&video_id)
    }

    pub fn select_video(&mut self, video_id: &str) -> Result<&PlaybackState, PlaybackError> {
        self.playback.load(video_id)
    }

    /// Id of the clip loaded in the player, if any.
    pub fn selected(&self) -> Option<&str> {
        self.playback.state().video_id.as_deref()
    }

    pub fn search_session(&self) -> &SearchSession {
        &self.search
    }

    pub fn playback(&self) -> &PlaybackSession<M> {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut PlaybackSession<M> {
        &mut self.playback
    }

    fn require_browse(&self) -> Result<(), SearchError> {
        match self.screen() {
            Screen::Browse => Ok(()),
            Screen::SignIn => Err(SearchError::SignInRequired),
        }
    }
}
