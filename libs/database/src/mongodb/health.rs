use mongodb::Client;
use std::time::Instant;

/// Outcome of a store liveness probe.
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub message: Option<String>,
    pub response_time_ms: u64,
}

/// Probe the deployment with a `listDatabases` round trip and time it.
pub async fn check_health(client: &Client) -> HealthStatus {
    let start = Instant::now();
    let outcome = client.list_database_names().await;
    let response_time_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(_) => HealthStatus {
            healthy: true,
            message: None,
            response_time_ms,
        },
        Err(e) => HealthStatus {
            healthy: false,
            message: Some(e.to_string()),
            response_time_ms,
        },
    }
}
