//! CLI command implementations

use crate::output;
use anyhow::Context;
use chrono::Duration;
use heatview_core::{
    encode_ranges, Clock, EncodedHeatmap, Heatmap, HeatviewConfig, ManualClock, MediaMetadata,
    MetadataClient, PlayerEvent, SessionContext, SystemClock, TelemetryDispatcher,
    TelemetryPayload, ViewerIdentity, ViewingTracker,
};
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Load configuration from a TOML file, or defaults when no file is given
pub fn load_config(path: Option<&Path>) -> anyhow::Result<HeatviewConfig> {
    let config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str::<HeatviewConfig>(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => HeatviewConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Read a heatmap JSON object from a file or stdin
fn read_heatmap(input: &str) -> anyhow::Result<Heatmap> {
    let raw = if input == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(input).with_context(|| format!("reading {input}"))?
    };
    parse_heatmap(&raw)
}

fn parse_heatmap(raw: &str) -> anyhow::Result<Heatmap> {
    serde_json::from_str(raw).context("expected a JSON object of second -> count")
}

/// Range-encode a heatmap file
pub fn encode(input: &str, duration: u64, format: &str) -> anyhow::Result<()> {
    let heatmap = read_heatmap(input)?;
    let encoded = encode_ranges(&heatmap, duration);

    output::emit(&encoded, format, |e: &EncodedHeatmap| {
        println!("Ranges: {}", if e.ranges.is_empty() { "(empty)" } else { e.ranges.as_str() });
        println!("Unique seconds: {}", e.unique_seconds);
    });
    Ok(())
}

/// Resolve and print metadata
pub async fn metadata(config: &HeatviewConfig, rid: &str, format: &str) -> anyhow::Result<()> {
    let client = MetadataClient::new(config.metadata.clone())?;
    let stream = client.stream_url(rid)?;
    let meta = client.fetch(rid).await?;

    #[derive(Serialize)]
    struct Report<'a> {
        rid: &'a str,
        stream_url: String,
        #[serde(flatten)]
        metadata: &'a MediaMetadata,
    }

    let report = Report {
        rid,
        stream_url: stream.to_string(),
        metadata: &meta,
    };

    output::emit(&report, format, |r| {
        println!("Media: {}", r.rid);
        println!("  Stream:   {}", r.stream_url);
        println!("  Title:    {}", r.metadata.title);
        println!("  Duration: {} ms", r.metadata.duration_ms);
        println!("  Owner:    {}", r.metadata.uid);
        if let Some(ratio) = r.metadata.aspect_ratio {
            println!("  Aspect:   {ratio:.3}");
        }
        if !r.metadata.poster.is_empty() {
            println!("  Poster:   {}", r.metadata.poster);
        }
        for sub in &r.metadata.subtitles {
            println!("  Subtitle: {} [{}] {}", sub.title, sub.language, sub.uri);
        }
    });
    Ok(())
}

/// Options for a simulated session
#[derive(Debug, Clone, Copy)]
pub struct SimulateOptions {
    pub seconds: u64,
    pub rewatch: u64,
    pub realtime: bool,
    pub dry_run: bool,
    pub grace_ms: u64,
}

/// Player events for linear playback of `seconds`, then a rewatch of the
/// last `rewatch` seconds
pub fn session_script(seconds: u64, rewatch: u64) -> Vec<PlayerEvent> {
    let mut events = vec![PlayerEvent::Ready, PlayerEvent::Play];
    events.extend((1..=seconds).map(|s| PlayerEvent::Position(s as f64)));

    let rewatch = rewatch.min(seconds);
    if rewatch > 0 {
        events.push(PlayerEvent::Pause);
        events.push(PlayerEvent::Play);
        let from = seconds - rewatch + 1;
        events.extend((from..=seconds).map(|s| PlayerEvent::Position(s as f64)));
    }

    events.push(PlayerEvent::Pause);
    events.push(PlayerEvent::Ended);
    events
}

/// Viewer for a session: the owner uid from metadata stands in when no
/// viewer id was given
fn resolve_viewer(viewer: ViewerIdentity, meta: Option<&MediaMetadata>) -> ViewerIdentity {
    let viewer = viewer.normalized();
    match meta {
        Some(meta) if viewer.uid.is_none() => viewer.with_uid(meta.uid.as_str()),
        _ => viewer,
    }
}

/// Replay a synthetic viewing session
pub async fn simulate(
    config: &HeatviewConfig,
    rid: &str,
    viewer: ViewerIdentity,
    options: SimulateOptions,
    format: &str,
) -> anyhow::Result<()> {
    let meta = match MetadataClient::new(config.metadata.clone())?.fetch(rid).await {
        Ok(meta) => Some(meta),
        Err(e) => {
            warn!(error = %e, "Metadata unavailable, continuing with defaults");
            None
        }
    };
    let viewer = resolve_viewer(viewer, meta.as_ref());
    let duration_ms = meta.as_ref().and_then(|m| m.duration()).map(|d| d.as_millis() as u64);
    let title = meta.as_ref().and_then(|m| m.title()).map(str::to_string);

    let (dispatcher, outbox) = if options.dry_run {
        let (dispatcher, rx) = TelemetryDispatcher::channel(&config.telemetry)?;
        (dispatcher, Some(rx))
    } else {
        (TelemetryDispatcher::http(&config.telemetry)?, None)
    };

    let manual = ManualClock::default();
    let clock: Arc<dyn Clock> = if options.realtime {
        Arc::new(SystemClock)
    } else {
        Arc::new(manual.clone())
    };

    let session = Arc::new(SessionContext::with_clock(clock.clone()));
    let mut tracker = ViewingTracker::new(rid, viewer, session, dispatcher).with_clock(clock);

    info!(rid, hmid = %tracker.heatmap_id(), ckid = tracker.session_id(), "Simulating session");
    tracker.initialize(duration_ms, title);

    for event in session_script(options.seconds, options.rewatch) {
        if let PlayerEvent::Position(_) = event {
            if options.realtime {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            } else {
                manual.advance(Duration::seconds(1));
            }
        }
        tracker.handle(event);
    }

    let final_payload = tracker.snapshot();
    tracker.dispose();

    let text = output::OutputFormat::from(format) == output::OutputFormat::Text;
    let mut sent: Vec<TelemetryPayload> = Vec::new();
    if let Some(mut rx) = outbox {
        while let Ok(request) = rx.try_recv() {
            if text {
                println!("{} {}", if request.forced { "forced   " } else { "throttled" }, request.url);
            }
            sent.push(request.payload);
        }
    } else {
        tokio::time::sleep(std::time::Duration::from_millis(options.grace_ms)).await;
    }

    #[derive(Serialize)]
    struct Summary<'a> {
        requests: &'a [TelemetryPayload],
        last: &'a TelemetryPayload,
    }

    output::emit(
        &Summary {
            requests: &sent,
            last: &final_payload,
        },
        format,
        |s| {
            println!("Heatmap:        {}", s.last.hm);
            println!("Unique seconds: {}", s.last.prg);
            println!("Duration:       {} s", s.last.dur);
            if options.dry_run {
                println!("Requests:       {}", s.requests.len());
            }
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_heatmap() {
        let heatmap = parse_heatmap(r#"{"5": 1, "6": 1, "7": 1}"#).unwrap();
        assert_eq!(encode_ranges(&heatmap, 0).ranges, "5-7");
        assert!(parse_heatmap("[1, 2]").is_err());
    }

    #[test]
    fn test_session_script_linear() {
        let events = session_script(3, 0);
        assert_eq!(
            events,
            vec![
                PlayerEvent::Ready,
                PlayerEvent::Play,
                PlayerEvent::Position(1.0),
                PlayerEvent::Position(2.0),
                PlayerEvent::Position(3.0),
                PlayerEvent::Pause,
                PlayerEvent::Ended,
            ]
        );
    }

    #[test]
    fn test_session_script_rewatch_is_clamped() {
        let events = session_script(2, 10);
        let positions: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                PlayerEvent::Position(s) => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(positions, vec![1.0, 2.0, 1.0, 2.0]);
    }

    fn owned_by(uid: &str) -> MediaMetadata {
        MediaMetadata {
            uid: uid.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_metadata_uid_fills_missing_viewer_id() {
        let (dispatcher, mut rx) =
            TelemetryDispatcher::channel(&HeatviewConfig::default().telemetry).unwrap();
        let viewer = resolve_viewer(ViewerIdentity::anonymous(), Some(&owned_by("owner-7")));
        let session = Arc::new(SessionContext::with_id("ck-cli"));
        let mut tracker = ViewingTracker::new("rid-cli", viewer, session, dispatcher);

        tracker.initialize(None, None);
        let request = rx.try_recv().unwrap();
        assert_eq!(request.payload.uid, "owner-7");
        assert!(request.payload.ud.is_none());
    }

    #[test]
    fn test_explicit_viewer_id_wins_over_metadata() {
        let viewer = ViewerIdentity::anonymous().with_uid("viewer-1");
        let resolved = resolve_viewer(viewer, Some(&owned_by("owner-7")));
        assert_eq!(resolved.uid.as_deref(), Some("viewer-1"));

        let resolved = resolve_viewer(ViewerIdentity::anonymous(), None);
        assert_eq!(resolved.uid, None);

        let resolved = resolve_viewer(ViewerIdentity::anonymous(), Some(&owned_by("")));
        assert_eq!(resolved.uid, None);

        let blank = ViewerIdentity {
            uid: Some(String::new()),
            ..Default::default()
        };
        let resolved = resolve_viewer(blank, Some(&owned_by("owner-7")));
        assert_eq!(resolved.uid.as_deref(), Some("owner-7"));
    }

    #[test]
    fn test_load_config_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[telemetry]\nreferrer = \"cli-test\"\nupdate_interval_secs = 10\n"
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.telemetry.referrer, "cli-test");
        assert_eq!(config.telemetry.update_interval_secs, 10);
        assert!(config.telemetry.enabled);
    }

    #[test]
    fn test_load_config_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[telemetry]\nupdate_interval_secs = 0\n").unwrap();
        assert!(load_config(Some(file.path())).is_err());
    }

    #[test]
    fn test_load_config_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.telemetry.update_interval_secs, 5);
    }

    #[test]
    fn test_load_config_rejects_oversized_interval() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[telemetry]\nupdate_interval_secs = 100000000000000000\n").unwrap();
        assert!(load_config(Some(file.path())).is_err());
    }
}
