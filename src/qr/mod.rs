//! QR image rendering, delegated to external HTTP renderers. The settlement core
//! only produces the payload string; this module turns it into an image URL.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tracing::{info, warn};

use crate::api::health::HealthState;
use crate::config::QR_HEALTH_CHECK_INTERVAL_SECS;
use crate::error::{AppError, Result};

/// Printed QR codes are rendered at this edge length.
pub const QR_SIZE_PX: u32 = 200;

const HEALTH_CHECK_PAYLOAD: &str = "healthcheck";

pub trait QrRenderer: Send + Sync {
    fn name(&self) -> &'static str;

    /// URL of a PNG encoding `payload`.
    fn image_url(&self, payload: &str, size_px: u32) -> Result<Url>;
}

fn parse_base(base_url: &str) -> Result<Url> {
    Url::parse(base_url).map_err(|e| AppError::Config(format!("invalid QR renderer URL {base_url}: {e}")))
}

pub struct QuickChartRenderer {
    base: Url,
}

impl QuickChartRenderer {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base: parse_base(base_url)?,
        })
    }
}

impl QrRenderer for QuickChartRenderer {
    fn name(&self) -> &'static str {
        "quickchart"
    }

    fn image_url(&self, payload: &str, size_px: u32) -> Result<Url> {
        let mut url = self.base.clone();
        url.query_pairs_mut()
            .append_pair("text", payload)
            .append_pair("size", &size_px.to_string())
            .append_pair("margin", "1");
        Ok(url)
    }
}

pub struct QrServerRenderer {
    base: Url,
}

impl QrServerRenderer {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base: parse_base(base_url)?,
        })
    }
}

impl QrRenderer for QrServerRenderer {
    fn name(&self) -> &'static str {
        "qrserver"
    }

    fn image_url(&self, payload: &str, size_px: u32) -> Result<Url> {
        let mut url = self.base.clone();
        url.query_pairs_mut()
            .append_pair("data", payload)
            .append_pair("size", &format!("{size_px}x{size_px}"));
        Ok(url)
    }
}

/// Serves the primary renderer while its health check succeeds, the fallback otherwise.
/// Selection state lives in `HealthState::qr_fallback_active` so /health reports it.
pub struct QrRendererSelector {
    primary: Box<dyn QrRenderer>,
    fallback: Box<dyn QrRenderer>,
    client: reqwest::Client,
    health: Arc<HealthState>,
}

impl QrRendererSelector {
    pub fn new(
        primary: Box<dyn QrRenderer>,
        fallback: Box<dyn QrRenderer>,
        health: Arc<HealthState>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            primary,
            fallback,
            client,
            health,
        })
    }

    pub fn current(&self) -> &dyn QrRenderer {
        if self.health.qr_fallback_active() {
            self.fallback.as_ref()
        } else {
            self.primary.as_ref()
        }
    }

    pub fn image_url(&self, payload: &str) -> Result<String> {
        Ok(self.current().image_url(payload, QR_SIZE_PX)?.to_string())
    }

    /// HEAD request against the primary renderer.
    pub async fn check_primary(&self) -> bool {
        let url = match self.primary.image_url(HEALTH_CHECK_PAYLOAD, QR_SIZE_PX) {
            Ok(u) => u,
            Err(e) => {
                warn!("QR health-check URL error: {e}");
                return false;
            }
        };
        match self.client.head(url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!("QR primary health check failed: {e}");
                false
            }
        }
    }

    pub fn apply_health_check(&self, primary_ok: bool) {
        let was_fallback = self.health.qr_fallback_active();
        self.health.set_qr_fallback_active(!primary_ok);
        if was_fallback == primary_ok {
            info!(
                event = "QR_RENDERER",
                renderer = self.current().name(),
                "QR renderer switched"
            );
        }
    }

    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(QR_HEALTH_CHECK_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let ok = self.check_primary().await;
            self.apply_health_check(ok);
        }
    }
}
