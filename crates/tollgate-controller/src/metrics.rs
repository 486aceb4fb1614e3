//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::state::ControllerState;
use crate::workerauth::AuthErrorKind;

/// Handshake outcome counters.
#[derive(Debug, Default)]
pub struct AuthMetrics {
    admitted: AtomicU64,
    handshake_failed: AtomicU64,
    rejected: [AtomicU64; AuthErrorKind::ALL.len()],
}

impl AuthMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handshake_failed(&self) {
        self.handshake_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self, kind: AuthErrorKind) {
        self.rejected[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    pub fn handshake_failed(&self) -> u64 {
        self.handshake_failed.load(Ordering::Relaxed)
    }

    pub fn rejected(&self, kind: AuthErrorKind) -> u64 {
        self.rejected[kind.index()].load(Ordering::Relaxed)
    }
}

/// Collect all metrics from ControllerState and format as Prometheus text.
pub fn collect_metrics(state: &ControllerState) -> String {
    let mut output = String::new();

    collect_handshake_metrics(&state.metrics, &mut output);
    collect_worker_metrics(state, &mut output);

    output
}

/// Collect handshake outcome counters.
fn collect_handshake_metrics(metrics: &AuthMetrics, output: &mut String) {
    writeln!(
        output,
        "# HELP tollgate_worker_auth_admitted_total Worker handshakes admitted"
    )
    .ok();
    writeln!(output, "# TYPE tollgate_worker_auth_admitted_total counter").ok();
    writeln!(
        output,
        "tollgate_worker_auth_admitted_total {}",
        metrics.admitted()
    )
    .ok();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP tollgate_worker_auth_handshake_failed_total \
         Authenticated workers whose TLS handshake did not complete"
    )
    .ok();
    writeln!(
        output,
        "# TYPE tollgate_worker_auth_handshake_failed_total counter"
    )
    .ok();
    writeln!(
        output,
        "tollgate_worker_auth_handshake_failed_total {}",
        metrics.handshake_failed()
    )
    .ok();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP tollgate_worker_auth_rejected_total Worker handshakes rejected by reason"
    )
    .ok();
    writeln!(output, "# TYPE tollgate_worker_auth_rejected_total counter").ok();
    for kind in AuthErrorKind::ALL {
        writeln!(
            output,
            "tollgate_worker_auth_rejected_total{{kind=\"{kind}\"}} {}",
            metrics.rejected(kind)
        )
        .ok();
    }
}

/// Collect the number of authenticated connections still open.
fn collect_worker_metrics(state: &ControllerState, output: &mut String) {
    writeln!(output).ok();
    writeln!(
        output,
        "# HELP tollgate_workers_connected Authenticated worker connections currently open"
    )
    .ok();
    writeln!(output, "# TYPE tollgate_workers_connected gauge").ok();
    writeln!(output, "tollgate_workers_connected {}", state.cache.len()).ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_metrics_empty_state() {
        let state = ControllerState::new();
        let output = collect_metrics(&state);

        assert!(output.contains("tollgate_worker_auth_admitted_total 0"));
        assert!(output.contains("tollgate_worker_auth_handshake_failed_total 0"));
        assert!(output.contains("tollgate_workers_connected 0"));
        for kind in AuthErrorKind::ALL {
            assert!(output.contains(&format!(
                "tollgate_worker_auth_rejected_total{{kind=\"{kind}\"}} 0"
            )));
        }
    }

    #[test]
    fn test_rejections_counted_per_kind() {
        let state = ControllerState::new();
        state.metrics.record_admitted();
        state.metrics.record_rejected(AuthErrorKind::ReplayDetected);
        state.metrics.record_rejected(AuthErrorKind::ReplayDetected);

        state.metrics.record_handshake_failed();

        let output = collect_metrics(&state);
        assert!(output.contains("tollgate_worker_auth_admitted_total 1"));
        assert!(output.contains("tollgate_worker_auth_handshake_failed_total 1"));
        assert!(output
            .contains("tollgate_worker_auth_rejected_total{kind=\"replay_detected\"} 2"));
        assert!(output
            .contains("tollgate_worker_auth_rejected_total{kind=\"decryption_failed\"} 0"));
    }
}
