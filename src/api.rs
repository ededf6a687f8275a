// External service boundary: the `MetricsService` contract consumed by the
// recording workflow, its wire types, and the production HTTP client.
//
// All durable state lives behind these five calls; the workflow itself keeps
// nothing on disk.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metric::{derive_lower_is_better, MetricDefinition, MetricEntry};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("server returned status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

// ---------------------------------------------------------------------------
// Domain types crossing the service boundary
// ---------------------------------------------------------------------------

/// One player in the session roster, in recording order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub player_id: String,
    pub name: String,
    #[serde(default)]
    pub position: Option<String>,
    /// Whether this player already has at least one valid persisted metric
    /// record. Used by the completion gate for non-active players.
    #[serde(default)]
    pub has_recorded_metrics: bool,
}

/// Metric definitions plus baseline values/notes for one player.
#[derive(Debug, Clone, Default)]
pub struct PlayerMetrics {
    pub definitions: Vec<MetricDefinition>,
    pub baseline: HashMap<String, MetricEntry>,
}

/// A previous recorded value with its improvement comparison, as reported by
/// the lookup service for a candidate value.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviousValue {
    pub value: f64,
    pub raw_delta: f64,
    pub percentage: f64,
    pub session_date: Option<NaiveDate>,
}

/// One metric's draft serialized for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricWrite {
    pub metric_id: String,
    /// `None` when the field was left empty (or held an unparseable value).
    pub value: Option<f64>,
    pub note: String,
    /// Existing record id, when updating rather than creating.
    pub existing_record_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Service contract
// ---------------------------------------------------------------------------

/// The external collaborators of the recording workflow. Kept behind a trait
/// so tests can substitute an in-memory backend; the production
/// implementation is `HttpMetricsService`.
#[async_trait]
pub trait MetricsService: Send + Sync {
    /// Ordered roster for a session, with per-player recorded-state flags.
    async fn fetch_roster(&self, session_id: &str) -> Result<Vec<RosterEntry>, ApiError>;

    /// Metric definitions and baseline values for one player.
    async fn fetch_player_metrics(&self, player_id: &str) -> Result<PlayerMetrics, ApiError>;

    /// Previous recorded value and improvement comparison for a candidate.
    /// `Ok(None)` means the player has no prior record for this metric.
    async fn fetch_previous_value(
        &self,
        player_id: &str,
        metric_id: &str,
        candidate: f64,
    ) -> Result<Option<PreviousValue>, ApiError>;

    /// Persist all of one player's metric drafts for the session.
    async fn persist_metrics(
        &self,
        player_id: &str,
        session_id: &str,
        entries: &[MetricWrite],
    ) -> Result<(), ApiError>;

    /// Mark the session completed.
    async fn complete_session(&self, session_id: &str) -> Result<(), ApiError>;
}

// ---------------------------------------------------------------------------
// Wire payloads (JSON shapes of the REST backend)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetricDefinitionPayload {
    id: String,
    name: String,
    #[serde(default)]
    unit: String,
    /// Older backends omit this; the name heuristic fills the gap.
    #[serde(default)]
    lower_is_better: Option<bool>,
    #[serde(default)]
    record_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BaselinePayload {
    #[serde(default)]
    value: Option<f64>,
    #[serde(default)]
    note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerMetricsPayload {
    metrics: Vec<MetricDefinitionPayload>,
    #[serde(default)]
    baseline: HashMap<String, BaselinePayload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImprovementPayload {
    raw_delta: f64,
    percentage: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreviousValuePayload {
    value: f64,
    improvement: ImprovementPayload,
    #[serde(default)]
    session_date: Option<NaiveDate>,
}

/// Convert a player-metrics payload into domain types, stringifying baseline
/// values and resolving the `lower_is_better` flag (explicit field when the
/// backend provides it, name heuristic otherwise).
fn convert_player_metrics(payload: PlayerMetricsPayload) -> PlayerMetrics {
    let definitions = payload
        .metrics
        .into_iter()
        .map(|m| {
            let lower_is_better = m
                .lower_is_better
                .unwrap_or_else(|| derive_lower_is_better(&m.name));
            MetricDefinition {
                id: m.id,
                name: m.name,
                unit: m.unit,
                lower_is_better,
                record_id: m.record_id,
            }
        })
        .collect();
    let baseline = payload
        .baseline
        .into_iter()
        .map(|(id, b)| {
            let value = b.value.map(format_number).unwrap_or_default();
            (id, MetricEntry::new(value, b.note.unwrap_or_default()))
        })
        .collect();
    PlayerMetrics {
        definitions,
        baseline,
    }
}

/// Stringify a baseline number the way a user would have typed it: no
/// trailing ".0" on whole values.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// REST client for the metrics backend.
pub struct HttpMetricsService {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpMetricsService {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        HttpMetricsService {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        let resp = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(|e| ApiError::Transport {
                url: url.clone(),
                message: e.to_string(),
            })?;
        Self::decode(url, resp).await
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        let resp = self
            .authorize(self.http.post(&url))
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Transport {
                url: url.clone(),
                message: e.to_string(),
            })?;
        Self::decode(url, resp).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        url: String,
        resp: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                url,
                status: status.as_u16(),
            });
        }
        resp.json::<T>().await.map_err(|e| ApiError::Decode {
            url,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl MetricsService for HttpMetricsService {
    async fn fetch_roster(&self, session_id: &str) -> Result<Vec<RosterEntry>, ApiError> {
        self.get_json(&format!("sessions/{session_id}/roster")).await
    }

    async fn fetch_player_metrics(&self, player_id: &str) -> Result<PlayerMetrics, ApiError> {
        let payload: PlayerMetricsPayload =
            self.get_json(&format!("players/{player_id}/metrics")).await?;
        Ok(convert_player_metrics(payload))
    }

    async fn fetch_previous_value(
        &self,
        player_id: &str,
        metric_id: &str,
        candidate: f64,
    ) -> Result<Option<PreviousValue>, ApiError> {
        let payload: Option<PreviousValuePayload> = self
            .get_json(&format!(
                "players/{player_id}/metrics/{metric_id}/previous?candidate={candidate}"
            ))
            .await?;
        Ok(payload.map(|p| PreviousValue {
            value: p.value,
            raw_delta: p.improvement.raw_delta,
            percentage: p.improvement.percentage,
            session_date: p.session_date,
        }))
    }

    async fn persist_metrics(
        &self,
        player_id: &str,
        session_id: &str,
        entries: &[MetricWrite],
    ) -> Result<(), ApiError> {
        #[derive(Serialize)]
        struct Body<'a> {
            entries: &'a [MetricWrite],
        }
        let _: serde_json::Value = self
            .post_json(
                &format!("sessions/{session_id}/players/{player_id}/metrics"),
                &Body { entries },
            )
            .await?;
        Ok(())
    }

    async fn complete_session(&self, session_id: &str) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .post_json(&format!("sessions/{session_id}/complete"), &serde_json::json!({}))
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_entry_parses_with_defaults() {
        let json = r#"[
            { "playerId": "p1", "name": "Ada", "position": "GK", "hasRecordedMetrics": true },
            { "playerId": "p2", "name": "Bea" }
        ]"#;
        let roster: Vec<RosterEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(roster.len(), 2);
        assert!(roster[0].has_recorded_metrics);
        assert_eq!(roster[0].position.as_deref(), Some("GK"));
        assert!(!roster[1].has_recorded_metrics);
        assert!(roster[1].position.is_none());
    }

    #[test]
    fn player_metrics_payload_converts_to_domain() {
        let json = r#"{
            "metrics": [
                { "id": "m1", "name": "Sprint time 30m", "unit": "s", "recordId": "r9" },
                { "id": "m2", "name": "Vertical jump", "unit": "cm", "lowerIsBetter": false }
            ],
            "baseline": {
                "m1": { "value": 4.3, "note": "windy" },
                "m2": { "value": 48 }
            }
        }"#;
        let payload: PlayerMetricsPayload = serde_json::from_str(json).unwrap();
        let metrics = convert_player_metrics(payload);

        assert_eq!(metrics.definitions.len(), 2);
        // Explicit flag missing -> name heuristic.
        assert!(metrics.definitions[0].lower_is_better);
        assert!(!metrics.definitions[1].lower_is_better);
        assert_eq!(metrics.definitions[0].record_id.as_deref(), Some("r9"));

        // Baseline values are stringified; whole numbers lose the ".0".
        assert_eq!(metrics.baseline["m1"], MetricEntry::new("4.3", "windy"));
        assert_eq!(metrics.baseline["m2"], MetricEntry::new("48", ""));
    }

    #[test]
    fn explicit_flag_beats_heuristic() {
        let json = r#"{
            "metrics": [
                { "id": "m1", "name": "Recovery time", "unit": "s", "lowerIsBetter": false }
            ]
        }"#;
        let payload: PlayerMetricsPayload = serde_json::from_str(json).unwrap();
        let metrics = convert_player_metrics(payload);
        assert!(!metrics.definitions[0].lower_is_better);
    }

    #[test]
    fn previous_value_payload_flattens_improvement() {
        let json = r#"{
            "value": 4.5,
            "improvement": { "rawDelta": -0.2, "percentage": -4.4, "isPositive": false },
            "sessionDate": "2026-08-12"
        }"#;
        let payload: PreviousValuePayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.value, 4.5);
        assert_eq!(payload.improvement.raw_delta, -0.2);
        assert_eq!(
            payload.session_date,
            Some(NaiveDate::from_ymd_opt(2026, 8, 12).unwrap())
        );
    }

    #[test]
    fn previous_value_null_means_no_record() {
        let payload: Option<PreviousValuePayload> = serde_json::from_str("null").unwrap();
        assert!(payload.is_none());
    }

    #[test]
    fn metric_write_serializes_camel_case_with_nulls() {
        let write = MetricWrite {
            metric_id: "m1".into(),
            value: None,
            note: "skipped".into(),
            existing_record_id: None,
        };
        let json = serde_json::to_value(&write).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "metricId": "m1",
                "value": null,
                "note": "skipped",
                "existingRecordId": null
            })
        );
    }

    // -- Integration-style test with a mock HTTP server --

    #[tokio::test]
    async fn mock_server_roster_fetch() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();

            let body = r#"[{"playerId":"p1","name":"Ada","hasRecordedMetrics":true}]"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            request
        });

        let service =
            HttpMetricsService::new(format!("http://{addr}"), Some("tok-123".to_string()));
        let roster = service.fetch_roster("s1").await.unwrap();

        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].player_id, "p1");
        assert!(roster[0].has_recorded_metrics);

        let request = server_task.await.unwrap();
        assert!(request.starts_with("GET /sessions/s1/roster"));
        assert!(request.contains("authorization: Bearer tok-123")
            || request.contains("Authorization: Bearer tok-123"));
    }

    #[tokio::test]
    async fn mock_server_error_status_maps_to_api_error() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response =
                "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\n\r\n";
            socket.write_all(response.as_bytes()).await.unwrap();
        });

        let service = HttpMetricsService::new(format!("http://{addr}"), None);
        let err = service.fetch_roster("s1").await.unwrap_err();
        match err {
            ApiError::Status { status, .. } => assert_eq!(status, 500),
            other => panic!("expected ApiError::Status, got: {other}"),
        }
    }
}
