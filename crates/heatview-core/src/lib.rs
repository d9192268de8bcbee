//! Heatview Core - Viewing telemetry for video players
//!
//! This crate records which seconds of a video a viewer watched and reports it
//! to an analytics endpoint:
//! - Per-second watch heatmap with duplicate suppression
//! - Compact range encoding of the heatmap (`"1-2,4:3"`)
//! - Throttled, fire-and-forget beacon dispatch
//! - Media metadata resolution
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      Heatview Core                        │
//! ├───────────────────────────────────────────────────────────┤
//! │                                                           │
//! │   player events ──► ┌──────────────┐   ┌──────────────┐   │
//! │                     │   Viewing    │◄──│   Session    │   │
//! │                     │   Tracker    │   │   Context    │   │
//! │                     └──────┬───────┘   └──────────────┘   │
//! │                            │                              │
//! │                     ┌──────┴───────┐   ┌──────────────┐   │
//! │                     │  Telemetry   │──►│    Range     │   │
//! │                     │  Dispatcher  │   │   Encoder    │   │
//! │                     └──────┬───────┘   └──────────────┘   │
//! │                            │                              │
//! │                     ┌──────┴───────┐                      │
//! │                     │  Transport   │──► analytics GET     │
//! │                     └──────────────┘                      │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use heatview_core::{SessionContext, TelemetryConfig, TelemetryDispatcher, ViewerIdentity, ViewingTracker};
//! use std::sync::Arc;
//!
//! # async fn run() -> heatview_core::Result<()> {
//! let session = Arc::new(SessionContext::new());
//! let dispatcher = TelemetryDispatcher::http(&TelemetryConfig::default())?;
//!
//! let mut tracker = ViewingTracker::new("media-id", ViewerIdentity::anonymous(), session, dispatcher);
//! tracker.initialize(Some(120_000), Some("Product tour".into()));
//! tracker.record_play_pause(true);
//! tracker.record_position(1.0);
//! tracker.record_ended();
//! tracker.dispose();
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod heatmap;
pub mod metadata;
pub mod session;
pub mod tracker;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{HeatviewConfig, MetadataConfig, TelemetryConfig};
pub use dispatch::{
    HttpTransport, TelemetryDispatcher, TelemetryPayload, TelemetryRequest, TelemetryTransport,
    ViewerDetails,
};
pub use error::{Error, Result};
pub use heatmap::{encode_ranges, EncodedHeatmap, Heatmap, HeatmapRange};
pub use metadata::{parse_duration, MediaMetadata, MetadataClient, SubtitleTrack};
pub use session::SessionContext;
pub use tracker::ViewingTracker;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log library initialization
pub fn init() {
    tracing::info!(version = VERSION, "Heatview Core initialized");
}
