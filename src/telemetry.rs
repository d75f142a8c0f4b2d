//! Optional LangSmith run reporting.
//!
//! When `LANGSMITH_API_KEY` is set, each answered (or failed) question is
//! posted to `{endpoint}/runs` as a `chain` run in the configured project.
//! Reporting happens on a spawned task and never affects the request.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::config::TelemetryConfig;

/// One question/answer exchange.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub question: String,
    pub answer: Option<String>,
    pub error: Option<String>,
    pub sources: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Serialize)]
struct RunPayload<'a> {
    id: String,
    name: &'static str,
    run_type: &'static str,
    session_name: &'a str,
    start_time: String,
    end_time: String,
    inputs: serde_json::Value,
    outputs: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// Fire-and-forget run reporter. A disabled reporter does nothing.
#[derive(Clone)]
pub struct Telemetry {
    inner: Option<Reporter>,
}

#[derive(Clone)]
struct Reporter {
    client: reqwest::Client,
    runs_url: String,
    project: String,
    api_key: String,
}

impl Telemetry {
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn from_config(config: &TelemetryConfig) -> Self {
        let Some(api_key) = config.api_key.clone() else {
            return Self::disabled();
        };
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, "telemetry disabled: cannot build HTTP client");
                return Self::disabled();
            }
        };
        tracing::info!(project = %config.project, "LangSmith tracing enabled");
        Self {
            inner: Some(Reporter {
                client,
                runs_url: format!("{}/runs", config.endpoint.trim_end_matches('/')),
                project: config.project.clone(),
                api_key,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Queue `record` for upload. Must be called within a Tokio runtime.
    pub fn report(&self, record: RunRecord) {
        let Some(reporter) = self.inner.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = reporter.send(&record).await {
                tracing::warn!(error = %e, "failed to report run to LangSmith");
            }
        });
    }
}

impl Reporter {
    async fn send(&self, record: &RunRecord) -> Result<(), reqwest::Error> {
        let payload = build_payload(&self.project, record);
        self.client
            .post(&self.runs_url)
            .header("x-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

fn build_payload<'a>(project: &'a str, record: &'a RunRecord) -> RunPayload<'a> {
    RunPayload {
        id: uuid::Uuid::new_v4().to_string(),
        name: "docqa.ask",
        run_type: "chain",
        session_name: project,
        start_time: record.start_time.to_rfc3339(),
        end_time: record.end_time.to_rfc3339(),
        inputs: serde_json::json!({ "question": record.question }),
        outputs: serde_json::json!({
            "answer": record.answer,
            "sources": record.sources,
        }),
        error: record.error.as_deref(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RunRecord {
        let now = Utc::now();
        RunRecord {
            question: "What is the capital of X?".into(),
            answer: Some("A.".into()),
            error: None,
            sources: vec!["a.pdf".into()],
            start_time: now,
            end_time: now,
        }
    }

    #[test]
    fn disabled_without_api_key() {
        let telemetry = Telemetry::from_config(&TelemetryConfig::default());
        assert!(!telemetry.is_enabled());
        telemetry.report(record());
    }

    #[test]
    fn payload_carries_project_and_io() {
        let rec = record();
        let payload = serde_json::to_value(build_payload("campus-bot", &rec)).unwrap();
        assert_eq!(payload["session_name"], "campus-bot");
        assert_eq!(payload["run_type"], "chain");
        assert_eq!(payload["inputs"]["question"], "What is the capital of X?");
        assert_eq!(payload["outputs"]["sources"][0], "a.pdf");
        assert!(payload.get("error").is_none());
    }
}
