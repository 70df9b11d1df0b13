//! Shared health state for the /health endpoint.
//! Updated by the settlement pass, the notification writer and the QR selector.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Default)]
pub struct HealthState {
    /// True while QR images are served by the fallback renderer.
    pub qr_fallback_active: AtomicBool,
    /// Millisecond timestamp of the last completed settlement pass (0 = none).
    pub last_settlement_at_ms: AtomicU64,
    /// Approximate count of events queued for the notification writer.
    pub notifications_pending: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_qr_fallback_active(&self, v: bool) {
        self.qr_fallback_active.store(v, Ordering::Relaxed);
    }

    pub fn set_last_settlement_at_ms(&self, ms: u64) {
        self.last_settlement_at_ms.store(ms, Ordering::Relaxed);
    }

    pub fn inc_notifications_pending(&self) {
        self.notifications_pending.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_notifications_pending(&self) {
        let _ = self
            .notifications_pending
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn qr_fallback_active(&self) -> bool {
        self.qr_fallback_active.load(Ordering::Relaxed)
    }

    pub fn last_settlement_at_ms(&self) -> u64 {
        self.last_settlement_at_ms.load(Ordering::Relaxed)
    }

    pub fn notifications_pending(&self) -> u64 {
        self.notifications_pending.load(Ordering::Relaxed)
    }
}
