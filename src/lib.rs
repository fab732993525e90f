//! # Camvault
//!
//! Client core for a surveillance-video archive: search recorded clips by
//! date, time window, camera and license plate, then stream and scrub the
//! selected clip.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────┐  serialize  ┌───────────────┐  GET /search   ┌─────────┐
//!  │  Filter  │────────────▶│ SearchSession │───────────────▶│         │
//!  └──────────┘             └───────┬───────┘                │         │
//!        ▲                          │ results                │ archive │
//!        │        ┌────────┐        ▼                        │ backend │
//!        └────────│ Viewer │──select──▶┌─────────────────┐   │         │
//!                 └────────┘           │ PlaybackSession │──▶│         │
//!                                      │  (MediaElement) │   │         │
//!                                      └─────────────────┘   └─────────┘
//!                                          GET /video/{id}  (Range)
//! ```
//!
//! Both sessions read authentication from an injected [`auth::AuthProvider`];
//! neither mutates it.
//!
//! ## Quick Start
//!
//! ```bash
//! camvault status
//! camvault search --date 2024-03-01 --camera cam_01
//! camvault probe 65f0a1c2
//! camvault fetch 65f0a1c2 --out clip.mp4 --range 0-1048575
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`query`] | Search filter and query-string serialization |
//! | [`search`] | Search session: request, response shapes, result state |
//! | [`playback`] | Playback session: timeline, skip/seek, media element seam |
//! | [`viewer`] | View coordinator wiring filter, search and playback |
//! | [`stream`] | Credentialed range requests against `/video/{id}` |
//! | [`auth`] | Injected authentication capability |
//! | [`client`] | Base URL handling and the shared HTTP client |
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Wire data types |

pub mod auth;
pub mod client;
pub mod config;
pub mod models;
pub mod playback;
pub mod query;
pub mod search;
pub mod stream;
pub mod viewer;
