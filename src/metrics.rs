use std::sync::atomic::{AtomicU64, Ordering};

use crate::signature::Rejection;

/// Counters for every way a verification request can end.
pub struct Metrics {
    pub verified: AtomicU64,
    pub payload_missing: AtomicU64,
    pub malformed: AtomicU64,
    pub missing_signature: AtomicU64,
    pub mismatch: AtomicU64,
    pub stale: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            verified: AtomicU64::new(0),
            payload_missing: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            missing_signature: AtomicU64::new(0),
            mismatch: AtomicU64::new(0),
            stale: AtomicU64::new(0),
        }
    }

    pub fn record_rejection(&self, rejection: Rejection) {
        let counter = match rejection {
            Rejection::MalformedPayload => &self.malformed,
            Rejection::MissingSignature => &self.missing_signature,
            Rejection::SignatureMismatch => &self.mismatch,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale(&self) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    /// Prometheus text exposition format.
    pub fn render(&self) -> String {
        let rejected = [
            ("payload_missing", &self.payload_missing),
            ("malformed_payload", &self.malformed),
            ("missing_signature", &self.missing_signature),
            ("signature_mismatch", &self.mismatch),
            ("stale", &self.stale),
        ];

        let mut out = format!(
            "# HELP initdata_verified_total Init data payloads that passed verification\n\
             # TYPE initdata_verified_total counter\n\
             initdata_verified_total {}\n\
             # HELP initdata_rejected_total Init data requests rejected, by reason\n\
             # TYPE initdata_rejected_total counter\n",
            self.verified.load(Ordering::Relaxed)
        );
        for (reason, counter) in rejected {
            out.push_str(&format!(
                "initdata_rejected_total{{reason=\"{}\"}} {}\n",
                reason,
                counter.load(Ordering::Relaxed)
            ));
        }
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static::lazy_static! {
    pub static ref METRICS: Metrics = Metrics::new();
}
