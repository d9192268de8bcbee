//! Telemetry and metadata configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Default analytics endpoint
pub const DEFAULT_ENDPOINT: &str = "https://analytics.cincopa.com/ohm.aspx";

/// Default client tag sent as `setref`
pub const DEFAULT_REFERRER: &str = "react-native-app";

/// Default throttle window between position-driven sends
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 5;

/// Longest accepted throttle window (one day)
pub const MAX_UPDATE_INTERVAL_SECS: u64 = 86_400;

/// Telemetry dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Analytics endpoint receiving the GET beacons
    pub endpoint: String,
    /// Static client tag appended as `setref`
    pub referrer: String,
    /// Minimum seconds between throttled sends
    pub update_interval_secs: u64,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// When false, send decisions are made but nothing is transmitted
    pub enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            referrer: DEFAULT_REFERRER.to_string(),
            update_interval_secs: DEFAULT_UPDATE_INTERVAL_SECS,
            request_timeout_ms: 10000,
            enabled: true,
        }
    }
}

impl TelemetryConfig {
    /// Parsed endpoint URL
    pub fn endpoint_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.endpoint)?)
    }

    /// Throttle window as a chrono duration, clamped to
    /// [`MAX_UPDATE_INTERVAL_SECS`]
    pub fn update_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.update_interval_secs.min(MAX_UPDATE_INTERVAL_SECS) as i64)
    }

    pub fn validate(&self) -> Result<()> {
        self.endpoint_url()?;
        if self.update_interval_secs == 0 {
            return Err(Error::InvalidConfig(
                "update_interval_secs must be greater than zero".into(),
            ));
        }
        if self.update_interval_secs > MAX_UPDATE_INTERVAL_SECS {
            return Err(Error::InvalidConfig(format!(
                "update_interval_secs must be at most {MAX_UPDATE_INTERVAL_SECS}"
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "request_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Metadata resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Metadata JSON endpoint
    pub metadata_url: String,
    /// Prefix prepended to the media id in the `fid` parameter
    pub fid_prefix: String,
    /// Base URL of HLS streams, `<stream_base>/<rid>.m3u8`
    pub stream_base: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            metadata_url: "https://rtcdn.cincopa.com/meta_json.aspx".to_string(),
            fid_prefix: "A4HAcLOLOO68!".to_string(),
            stream_base: "https://rt.cincopa.com".to_string(),
            request_timeout_ms: 10000,
        }
    }
}

impl MetadataConfig {
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.metadata_url)?;
        Url::parse(&self.stream_base)?;
        Ok(())
    }
}

/// Full configuration, as loaded by hosts from a file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatviewConfig {
    pub telemetry: TelemetryConfig,
    pub metadata: MetadataConfig,
}

impl HeatviewConfig {
    pub fn validate(&self) -> Result<()> {
        self.telemetry.validate()?;
        self.metadata.validate()
    }
}
