//! Media metadata resolution
//!
//! Resolves a media id into its stream URL and the descriptive fields the
//! tracker is initialized with (title, duration) plus poster, aspect ratio,
//! owner uid and subtitle tracks.

use crate::{config::MetadataConfig, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

/// Subtitle file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubtitleFormat {
    WebVtt,
    SubRip,
}

impl SubtitleFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            SubtitleFormat::WebVtt => "text/vtt",
            SubtitleFormat::SubRip => "application/x-subrip",
        }
    }
}

/// A sidecar subtitle track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub title: String,
    pub language: String,
    pub format: SubtitleFormat,
    pub uri: String,
}

/// Descriptive fields of one media item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Owner account's viewer id, empty if unknown
    pub uid: String,
    /// Display title
    pub title: String,
    /// Poster image URL, empty if none
    pub poster: String,
    /// Duration in milliseconds, 0 if unknown
    pub duration_ms: u64,
    /// Width / height, if reported
    pub aspect_ratio: Option<f64>,
    pub subtitles: Vec<SubtitleTrack>,
}

impl MediaMetadata {
    /// Extract metadata from a `meta_json` response document
    ///
    /// Missing fields fall back to empty values.
    pub fn from_json(doc: &Value) -> Self {
        let media = &doc["media"]["items"][0];

        let title = media["title"]
            .as_str()
            .or_else(|| media["filename"].as_str())
            .unwrap_or_default()
            .to_string();

        let aspect_ratio = match &media["aspect_ratio"] {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|r| r.is_finite() && *r > 0.0);

        let subtitles = media["extra_files"]
            .as_array()
            .map(|files| files.iter().filter_map(subtitle_track).collect())
            .unwrap_or_default();

        Self {
            uid: str_at(&doc["acc"]["user"]["uid"]),
            title,
            poster: str_at(&media["versions"]["jpg_600x450"]["url"]),
            duration_ms: media["duration"].as_str().map(parse_duration).unwrap_or(0),
            aspect_ratio,
            subtitles,
        }
    }

    /// Duration if known
    pub fn duration(&self) -> Option<Duration> {
        (self.duration_ms > 0).then(|| Duration::from_millis(self.duration_ms))
    }

    /// Title, or `None` when the response had none
    pub fn title(&self) -> Option<&str> {
        (!self.title.is_empty()).then_some(self.title.as_str())
    }
}

fn str_at(v: &Value) -> String {
    v.as_str().unwrap_or_default().to_string()
}

fn subtitle_track(file: &Value) -> Option<SubtitleTrack> {
    let kind = file["type"].as_str()?;
    let language = kind.strip_prefix("subtitle-")?;
    Some(SubtitleTrack {
        title: str_at(&file["filename"]),
        language: if language.is_empty() { "en" } else { language }.to_string(),
        format: SubtitleFormat::SubRip,
        uri: str_at(&file["url"]),
    })
}

/// Parse `H:M:S`, `M:S` or `S` into milliseconds
///
/// Unparsable components count as zero; more than three components yield 0.
pub fn parse_duration(s: &str) -> u64 {
    let s = s.trim();
    if s.is_empty() {
        return 0;
    }

    let parts: Vec<f64> = s
        .split(':')
        .map(|p| p.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0))
        .collect();

    let secs = match parts.as_slice() {
        [h, m, s] => h * 3600.0 + m * 60.0 + s,
        [m, s] => m * 60.0 + s,
        [s] => *s,
        _ => 0.0,
    };

    if secs <= 0.0 {
        0
    } else {
        (secs * 1000.0).round() as u64
    }
}

/// HLS stream URL for a media id
pub fn stream_url(config: &MetadataConfig, media_id: &str) -> Result<Url> {
    let base = config.stream_base.trim_end_matches('/');
    Ok(Url::parse(&format!("{base}/{media_id}.m3u8"))?)
}

/// Fetches media metadata over HTTP
pub struct MetadataClient {
    client: reqwest::Client,
    config: MetadataConfig,
}

impl MetadataClient {
    pub fn new(config: MetadataConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self { client, config })
    }

    /// Use a preconfigured HTTP client
    pub fn with_client(config: MetadataConfig, client: reqwest::Client) -> Result<Self> {
        config.validate()?;
        Ok(Self { client, config })
    }

    /// Metadata request URL for a media id
    pub fn request_url(&self, media_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.config.metadata_url)?;
        url.query_pairs_mut()
            .append_pair("fid", &format!("{}{}", self.config.fid_prefix, media_id))
            .append_pair("ver", "app");
        Ok(url)
    }

    /// Stream URL for a media id
    pub fn stream_url(&self, media_id: &str) -> Result<Url> {
        stream_url(&self.config, media_id)
    }

    /// Resolve metadata for a media id
    #[instrument(skip(self))]
    pub async fn fetch(&self, media_id: &str) -> Result<MediaMetadata> {
        let url = self.request_url(media_id)?;
        debug!(url = %url, "Fetching metadata");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::MetadataFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::MetadataFetch(format!("HTTP {}", status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::MetadataFetch(e.to_string()))?;
        let doc: Value =
            serde_json::from_str(&body).map_err(|e| Error::MetadataParse(e.to_string()))?;

        let metadata = MediaMetadata::from_json(&doc);
        info!(
            title = %metadata.title,
            duration_ms = metadata.duration_ms,
            subtitles = metadata.subtitles.len(),
            "Metadata resolved"
        );
        Ok(metadata)
    }
}
