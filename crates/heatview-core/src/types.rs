//! Core types for Heatview

use serde::{Deserialize, Serialize};

/// Identifier of one viewing session of one media item
///
/// Rendered on the wire as a decimal 32-bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeatmapId(pub u32);

impl HeatmapId {
    pub fn new() -> Self {
        Self(rand::random())
    }
}

impl Default for HeatmapId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HeatmapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who is watching
///
/// Empty strings are treated the same as absent values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerIdentity {
    /// Viewer id from the hosting account
    pub uid: Option<String>,
    /// Display name
    pub name: Option<String>,
    /// Email address
    pub email: Option<String>,
    /// Account id
    pub account_id: Option<String>,
}

impl ViewerIdentity {
    /// Anonymous viewer
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = non_empty(uid.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = non_empty(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = non_empty(email.into());
        self
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = non_empty(account_id.into());
        self
    }

    /// Drop empty strings so they are never reported
    pub fn normalized(self) -> Self {
        Self {
            uid: self.uid.and_then(non_empty),
            name: self.name.and_then(non_empty),
            email: self.email.and_then(non_empty),
            account_id: self.account_id.and_then(non_empty),
        }
    }

    /// True if any of the detail fields (name, email, account id) is set
    pub fn has_details(&self) -> bool {
        self.name.is_some() || self.email.is_some() || self.account_id.is_some()
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Events reported by the hosting player
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "position", rename_all = "snake_case")]
pub enum PlayerEvent {
    /// Media loaded and ready to play
    Ready,
    /// Playback started or resumed
    Play,
    /// Playback paused
    Pause,
    /// Current playback position in seconds
    Position(f64),
    /// Playback reached the end
    Ended,
}

impl std::fmt::Display for PlayerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerEvent::Ready => write!(f, "ready"),
            PlayerEvent::Play => write!(f, "play"),
            PlayerEvent::Pause => write!(f, "pause"),
            PlayerEvent::Position(s) => write!(f, "position({s})"),
            PlayerEvent::Ended => write!(f, "ended"),
        }
    }
}
