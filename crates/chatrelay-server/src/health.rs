//! `GET /health`: process liveness. Never consults the hub, so a stalled or
//! stopped hub still reports `ok` while the listener is up.

use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::server::AppState;

/// Health probe body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: &'static str,
    /// Whole seconds since the server was created.
    pub uptime_secs: u64,
}

/// Start instant of the running server.
#[derive(Debug, Clone, Copy)]
pub struct Liveness {
    started: Instant,
}

impl Liveness {
    /// Start counting from now.
    pub fn now() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Time since [`Liveness::now`].
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Current probe body.
    pub fn report(&self) -> HealthResponse {
        HealthResponse {
            status: "ok",
            uptime_secs: self.uptime().as_secs(),
        }
    }
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(state.liveness.report())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_report_is_ok_with_zero_uptime() {
        let report = Liveness::now().report();
        assert_eq!(report.status, "ok");
        assert!(report.uptime_secs < 2);
    }

    #[test]
    fn uptime_counts_from_start() {
        let liveness = Liveness {
            started: Instant::now()
                .checked_sub(Duration::from_secs(90))
                .unwrap(),
        };
        assert!(liveness.report().uptime_secs >= 89);
    }

    #[test]
    fn body_shape() {
        let json = serde_json::to_value(Liveness::now().report()).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(obj["status"], "ok");
        assert!(obj["uptime_secs"].is_u64());
    }
}
