//! Viewing tracker - per-player heatmap and send scheduling
//!
//! One tracker lives for one mounted player with a resolved media source:
//! - Counts passes over each watched second
//! - Sends immediately on lifecycle events (initialize, play/pause, end)
//! - Sends at most once per update interval on position updates
//!
//! Throttling is reactive. There is no timer; if position updates stop, nothing
//! is sent until the next event. Every send, forced or throttled, re-arms the
//! commit clock.

use crate::{
    clock::{Clock, SystemClock},
    dispatch::{PayloadContext, TelemetryDispatcher, TelemetryPayload},
    heatmap::Heatmap,
    session::SessionContext,
    types::{HeatmapId, PlayerEvent, ViewerIdentity},
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tracks what one viewer watched of one media item
pub struct ViewingTracker {
    media_id: String,
    viewer: ViewerIdentity,
    heatmap_id: HeatmapId,
    session: Arc<SessionContext>,
    dispatcher: TelemetryDispatcher,
    clock: Arc<dyn Clock>,
    update_interval: Duration,
    heatmap: Heatmap,
    /// Last recorded second, for duplicate suppression
    last_second: Option<u64>,
    duration_ms: Option<u64>,
    title: Option<String>,
    /// Earliest time a throttled send may go out
    next_commit: Option<DateTime<Utc>>,
    initialized: bool,
}

impl ViewingTracker {
    /// Create a tracker for `media_id` with a fresh heatmap id
    ///
    /// The throttle window is taken from the dispatcher's configuration.
    pub fn new(
        media_id: impl Into<String>,
        viewer: ViewerIdentity,
        session: Arc<SessionContext>,
        dispatcher: TelemetryDispatcher,
    ) -> Self {
        let media_id = media_id.into();
        let heatmap_id = HeatmapId::new();
        let session_id = session.id().to_string();
        let update_interval = dispatcher.update_interval();

        debug!(rid = %media_id, hmid = %heatmap_id, ckid = %session_id, "Tracker created");

        Self {
            media_id,
            viewer: viewer.normalized(),
            heatmap_id,
            session,
            dispatcher,
            clock: Arc::new(SystemClock),
            update_interval,
            heatmap: Heatmap::new(),
            last_second: None,
            duration_ms: None,
            title: None,
            next_commit: None,
            initialized: false,
        }
    }

    /// Use `clock` for the commit clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Minimum spacing between throttled sends
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Record metadata once it resolves and announce the session
    ///
    /// The title falls back to the media id. Only the first call has effect.
    pub fn initialize(&mut self, duration_ms: Option<u64>, title: Option<String>) {
        if self.initialized {
            warn!(hmid = %self.heatmap_id, "Tracker already initialized, ignoring");
            return;
        }
        self.initialized = true;
        self.duration_ms = duration_ms;
        self.title = Some(
            title
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| self.media_id.clone()),
        );

        info!(
            rid = %self.media_id,
            hmid = %self.heatmap_id,
            duration_ms = ?self.duration_ms,
            title = ?self.title,
            "Tracker initialized"
        );

        self.arm_commit_clock();
        self.send_update(true);
    }

    /// Report a play or pause transition
    pub fn record_play_pause(&mut self, is_playing: bool) {
        debug!(hmid = %self.heatmap_id, is_playing, "Play/pause");
        self.send_update(true);
        self.arm_commit_clock();
    }

    /// Report the current playback position in seconds
    pub fn record_position(&mut self, seconds: f64) {
        if !seconds.is_finite() {
            return;
        }
        let floored = seconds.floor();
        if floored <= 0.0 {
            return;
        }
        let second = floored as u64;
        if self.last_second == Some(second) {
            return;
        }

        self.heatmap.increment(second);
        self.last_second = Some(second);

        if self.commit_due() {
            self.send_update(false);
            self.arm_commit_clock();
        }
    }

    /// Report that playback reached the end
    pub fn record_ended(&mut self) {
        debug!(hmid = %self.heatmap_id, "Playback ended");
        self.send_update(true);
        self.arm_commit_clock();
    }

    /// Route a player event to the matching handler
    pub fn handle(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::Ready => debug!(hmid = %self.heatmap_id, "Player ready"),
            PlayerEvent::Play => self.record_play_pause(true),
            PlayerEvent::Pause => self.record_play_pause(false),
            PlayerEvent::Position(seconds) => self.record_position(seconds),
            PlayerEvent::Ended => self.record_ended(),
        }
    }

    /// Release the tracker; there is nothing in flight to cancel
    pub fn dispose(self) {
        debug!(hmid = %self.heatmap_id, watched = self.heatmap.len(), "Tracker disposed");
    }

    /// Payload that a send issued now would carry
    pub fn snapshot(&self) -> TelemetryPayload {
        TelemetryPayload::build(
            PayloadContext {
                session_id: self.session.id(),
                heatmap_id: self.heatmap_id,
                media_id: &self.media_id,
                viewer: &self.viewer,
                title: self.title.as_deref().unwrap_or_default(),
                duration_ms: self.duration_ms,
            },
            &self.heatmap,
        )
    }

    pub fn heatmap_id(&self) -> HeatmapId {
        self.heatmap_id
    }

    pub fn session_id(&self) -> &str {
        self.session.id()
    }

    pub fn media_id(&self) -> &str {
        &self.media_id
    }

    pub fn heatmap(&self) -> &Heatmap {
        &self.heatmap
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Next time a throttled send is allowed, if the clock is armed
    pub fn next_commit(&self) -> Option<DateTime<Utc>> {
        self.next_commit
    }

    fn commit_due(&self) -> bool {
        match self.next_commit {
            None => true,
            Some(at) => self.clock.now() >= at,
        }
    }

    fn arm_commit_clock(&mut self) {
        let now = self.clock.now();
        let at = now
            .checked_add_signed(self.update_interval)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.next_commit = Some(at);
    }

    fn send_update(&self, forced: bool) {
        let payload = self.snapshot();
        if let Err(e) = self.dispatcher.dispatch(payload, forced) {
            warn!(
                error = %e,
                code = e.error_code(),
                hmid = %self.heatmap_id,
                forced,
                "Failed to queue telemetry"
            );
        }
    }
}
