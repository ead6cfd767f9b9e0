//! Store-level health probe (§4.1): a trivial query, timed, classified by
//! latency and success. This is deliberately the cheap check — the richer
//! corruption/fragmentation scoring for the full-text index lives in
//! [`crate::search::index`] (§4.5).

use std::time::Instant;

use super::connection::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthProbe {
    pub status: HealthStatus,
    pub latency_ms: u64,
    pub error: Option<String>,
}

const DEGRADED_THRESHOLD_MS: u64 = 50;
const UNHEALTHY_THRESHOLD_MS: u64 = 500;

/// Run a `SELECT 1` against the store and classify the round trip.
pub fn probe(storage: &Storage) -> HealthProbe {
    let start = Instant::now();
    let result = storage.with_connection(|conn| {
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(crate::error::MemoryError::from)
    });
    let latency_ms = start.elapsed().as_millis() as u64;

    match result {
        Err(e) => HealthProbe {
            status: HealthStatus::Unhealthy,
            latency_ms,
            error: Some(e.to_string()),
        },
        Ok(_) if latency_ms >= UNHEALTHY_THRESHOLD_MS => HealthProbe {
            status: HealthStatus::Unhealthy,
            latency_ms,
            error: None,
        },
        Ok(_) if latency_ms >= DEGRADED_THRESHOLD_MS => HealthProbe {
            status: HealthStatus::Degraded,
            latency_ms,
            error: None,
        },
        Ok(_) => HealthProbe {
            status: HealthStatus::Healthy,
            latency_ms,
            error: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_store_probes_ok() {
        let storage = Storage::open_in_memory().unwrap();
        let probe = probe(&storage);
        assert_eq!(probe.status, HealthStatus::Healthy);
        assert!(probe.error.is_none());
    }
}
