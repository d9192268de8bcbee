//! Telemetry dispatch
//!
//! Turns tracker state into the analytics beacon and ships it:
//! - Payload assembly (heatmap range encoding included)
//! - Send gating for empty, non-forced updates
//! - Fire-and-forget delivery through a background worker
//!
//! Requests are queued synchronously on an unbounded outbox. The worker spawned
//! by [`TelemetryDispatcher::spawn`] starts one task per request, so several
//! sends may be in flight at once and complete in any order. Each payload is a
//! full snapshot, so ordering does not matter to the receiver. Transport
//! failures end up in the log and nowhere else.

use crate::{
    config::TelemetryConfig,
    heatmap::{encode_ranges, Heatmap},
    types::{HeatmapId, ViewerIdentity},
    Error, Result,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};
use url::Url;

/// Analytics beacon body, serialized as the `j` query parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    /// Process session id
    pub ckid: String,
    /// Viewer id, empty if unknown
    pub uid: String,
    /// Heatmap id of this viewing session
    pub hmid: String,
    /// Media id
    pub rid: String,
    /// Range-encoded heatmap
    pub hm: String,
    /// Unique watched seconds
    pub prg: u64,
    /// Display title
    pub name: String,
    /// Duration in whole seconds, 0 if unknown
    pub dur: u64,
    /// Viewer details, omitted when none are known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ud: Option<ViewerDetails>,
}

/// Optional viewer details block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acc_id: Option<String>,
}

impl ViewerDetails {
    /// Details for `viewer`, or `None` if it carries none
    pub fn from_identity(viewer: &ViewerIdentity) -> Option<Self> {
        if !viewer.has_details() {
            return None;
        }
        Some(Self {
            email: viewer.email.clone(),
            name: viewer.name.clone(),
            acc_id: viewer.account_id.clone(),
        })
    }
}

/// Inputs to one payload snapshot
#[derive(Debug, Clone, Copy)]
pub struct PayloadContext<'a> {
    pub session_id: &'a str,
    pub heatmap_id: HeatmapId,
    pub media_id: &'a str,
    pub viewer: &'a ViewerIdentity,
    pub title: &'a str,
    pub duration_ms: Option<u64>,
}

impl TelemetryPayload {
    /// Snapshot the current heatmap into a payload
    pub fn build(ctx: PayloadContext<'_>, heatmap: &Heatmap) -> Self {
        let dur = ctx.duration_ms.unwrap_or(0) / 1000;
        let encoded = encode_ranges(heatmap, dur);

        Self {
            ckid: ctx.session_id.to_string(),
            uid: ctx.viewer.uid.clone().unwrap_or_default(),
            hmid: ctx.heatmap_id.to_string(),
            rid: ctx.media_id.to_string(),
            hm: encoded.ranges,
            prg: encoded.unique_seconds,
            name: ctx.title.to_string(),
            dur,
            ud: ViewerDetails::from_identity(ctx.viewer),
        }
    }
}

/// A fully built beacon waiting to be sent
#[derive(Debug, Clone)]
pub struct TelemetryRequest {
    /// Complete GET URL
    pub url: Url,
    /// Payload carried in the URL
    pub payload: TelemetryPayload,
    /// Whether the send bypassed throttling
    pub forced: bool,
}

/// Delivers beacon URLs
#[async_trait]
pub trait TelemetryTransport: Send + Sync {
    /// Issue the request; the response body is not interpreted
    async fn send(&self, url: &Url) -> Result<()>;
}

/// HTTP GET transport backed by reqwest
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TelemetryTransport for HttpTransport {
    #[instrument(skip_all)]
    async fn send(&self, url: &Url) -> Result<()> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
            });
        }
        debug!(status = status.as_u16(), "Telemetry delivered");
        Ok(())
    }
}

/// Builds beacon URLs and queues them for delivery
#[derive(Debug, Clone)]
pub struct TelemetryDispatcher {
    endpoint: Url,
    referrer: String,
    enabled: bool,
    update_interval: chrono::Duration,
    outbox: mpsc::UnboundedSender<TelemetryRequest>,
}

impl TelemetryDispatcher {
    /// Create a dispatcher and hand back the receiving end of its outbox
    ///
    /// Nothing is sent until the caller drains the receiver.
    pub fn channel(
        config: &TelemetryConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TelemetryRequest>)> {
        config.validate()?;
        let (outbox, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            endpoint: config.endpoint_url()?,
            referrer: config.referrer.clone(),
            enabled: config.enabled,
            update_interval: config.update_interval(),
            outbox,
        };
        Ok((dispatcher, rx))
    }

    /// Create a dispatcher whose requests are delivered by `transport`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: &TelemetryConfig, transport: Arc<dyn TelemetryTransport>) -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let (dispatcher, rx) = Self::channel(config)?;
        handle.spawn(run_worker(rx, transport));
        Ok(dispatcher)
    }

    /// Create a dispatcher delivering over HTTP
    pub fn http(config: &TelemetryConfig) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        Self::spawn(config, Arc::new(transport))
    }

    /// Endpoint URL with the encoded payload and referrer tag attached
    pub fn build_url(&self, payload: &TelemetryPayload) -> Result<Url> {
        let json = serde_json::to_string(payload)?;
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("j", &json)
            .append_pair("setref", &self.referrer);
        Ok(url)
    }

    /// Queue `payload` for delivery
    ///
    /// Returns `Ok(false)` when the send was gated: a non-forced payload with
    /// an empty heatmap, or telemetry disabled.
    pub fn dispatch(&self, payload: TelemetryPayload, forced: bool) -> Result<bool> {
        if !forced && payload.hm.is_empty() {
            debug!(hmid = %payload.hmid, "Nothing watched yet, skipping throttled send");
            return Ok(false);
        }
        if !self.enabled {
            debug!(hmid = %payload.hmid, forced, "Telemetry disabled, skipping send");
            return Ok(false);
        }

        let url = self.build_url(&payload)?;
        debug!(
            hmid = %payload.hmid,
            hm = %payload.hm,
            prg = payload.prg,
            forced,
            "Queueing telemetry"
        );

        self.outbox
            .send(TelemetryRequest {
                url,
                payload,
                forced,
            })
            .map_err(|_| Error::OutboxClosed)?;
        Ok(true)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Configured throttle window, adopted by trackers built on this dispatcher
    pub fn update_interval(&self) -> chrono::Duration {
        self.update_interval
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<TelemetryRequest>,
    transport: Arc<dyn TelemetryTransport>,
) {
    while let Some(request) = rx.recv().await {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move {
            if let Err(e) = transport.send(&request.url).await {
                warn!(
                    error = %e,
                    code = e.error_code(),
                    hmid = %request.payload.hmid,
                    "Telemetry send failed"
                );
            }
        });
    }
    debug!("Telemetry worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn payload(hm: &str) -> TelemetryPayload {
        TelemetryPayload {
            ckid: "1700000000000".into(),
            uid: String::new(),
            hmid: "42".into(),
            rid: "media-1".into(),
            hm: hm.into(),
            prg: 3,
            name: "Intro".into(),
            dur: 60,
            ud: None,
        }
    }

    fn context<'a>(viewer: &'a ViewerIdentity, duration_ms: Option<u64>) -> PayloadContext<'a> {
        PayloadContext {
            session_id: "ck",
            heatmap_id: HeatmapId(7),
            media_id: "rid-1",
            viewer,
            title: "Clip",
            duration_ms,
        }
    }

    #[test]
    fn test_payload_json_field_order_without_details() {
        let viewer = ViewerIdentity::anonymous();
        let heatmap: Heatmap = [(5, 1), (6, 1), (7, 1)].into_iter().collect();
        let payload = TelemetryPayload::build(context(&viewer, Some(10_900)), &heatmap);

        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"ckid":"ck","uid":"","hmid":"7","rid":"rid-1","hm":"5-7","prg":3,"name":"Clip","dur":10}"#
        );
    }

    #[test]
    fn test_payload_includes_only_present_details() {
        let viewer = ViewerIdentity::anonymous()
            .with_uid("u-9")
            .with_email("ada@example.com")
            .with_account_id("acc-3");
        let payload = TelemetryPayload::build(context(&viewer, None), &Heatmap::new());

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["uid"], "u-9");
        assert_eq!(json["dur"], 0);
        assert_eq!(json["hm"], "");
        assert_eq!(json["ud"]["email"], "ada@example.com");
        assert_eq!(json["ud"]["acc_id"], "acc-3");
        assert!(json["ud"].get("name").is_none());
    }

    #[test]
    fn test_unique_seconds_capped_by_payload_duration() {
        let viewer = ViewerIdentity::anonymous();
        let heatmap: Heatmap = (1..=5).map(|s| (s, 1)).collect();
        let payload = TelemetryPayload::build(context(&viewer, Some(3_000)), &heatmap);
        assert_eq!(payload.prg, 3);
        assert_eq!(payload.dur, 3);
    }

    #[test]
    fn test_build_url_carries_payload_and_referrer() {
        let config = TelemetryConfig {
            referrer: "tests".into(),
            ..Default::default()
        };
        let (dispatcher, _rx) = TelemetryDispatcher::channel(&config).unwrap();
        let url = dispatcher.build_url(&payload("1-3")).unwrap();

        assert_eq!(url.host_str(), Some("analytics.cincopa.com"));
        assert_eq!(url.path(), "/ohm.aspx");

        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["setref"], "tests");
        let decoded: TelemetryPayload = serde_json::from_str(&params["j"]).unwrap();
        assert_eq!(decoded, payload("1-3"));
    }

    #[test]
    fn test_forced_send_with_empty_heatmap_is_queued() {
        let (dispatcher, mut rx) = TelemetryDispatcher::channel(&TelemetryConfig::default()).unwrap();

        assert!(dispatcher.dispatch(payload(""), true).unwrap());
        let request = rx.try_recv().unwrap();
        assert!(request.forced);
        assert_eq!(request.payload.hm, "");
    }

    #[test]
    fn test_throttled_send_with_empty_heatmap_is_gated() {
        let (dispatcher, mut rx) = TelemetryDispatcher::channel(&TelemetryConfig::default()).unwrap();

        assert!(!dispatcher.dispatch(payload(""), false).unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disabled_dispatcher_sends_nothing() {
        let config = TelemetryConfig {
            enabled: false,
            ..Default::default()
        };
        let (dispatcher, mut rx) = TelemetryDispatcher::channel(&config).unwrap();

        assert!(!dispatcher.dispatch(payload("1"), true).unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_outbox_reports_error() {
        let (dispatcher, rx) = TelemetryDispatcher::channel(&TelemetryConfig::default()).unwrap();
        drop(rx);
        assert!(matches!(
            dispatcher.dispatch(payload("1"), true),
            Err(Error::OutboxClosed)
        ));
    }

    #[test]
    fn test_spawn_outside_runtime_fails() {
        struct Noop;
        #[async_trait]
        impl TelemetryTransport for Noop {
            async fn send(&self, _url: &Url) -> Result<()> {
                Ok(())
            }
        }

        let result = TelemetryDispatcher::spawn(&TelemetryConfig::default(), Arc::new(Noop));
        assert!(matches!(result, Err(Error::NoRuntime)));
    }

    struct FailingTransport {
        attempts: AtomicUsize,
        seen: mpsc::UnboundedSender<Url>,
    }

    #[async_trait]
    impl TelemetryTransport for FailingTransport {
        async fn send(&self, url: &Url) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let _ = self.seen.send(url.clone());
            Err(Error::HttpStatus { status: 503 })
        }
    }

    #[tokio::test]
    async fn test_worker_survives_transport_failures() {
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(FailingTransport {
            attempts: AtomicUsize::new(0),
            seen: seen_tx,
        });
        let dispatcher =
            TelemetryDispatcher::spawn(&TelemetryConfig::default(), transport.clone()).unwrap();

        dispatcher.dispatch(payload("1"), true).unwrap();
        dispatcher.dispatch(payload("1-2"), false).unwrap();

        for _ in 0..2 {
            tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
                .await
                .unwrap()
                .unwrap();
        }
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 2);
    }
}
