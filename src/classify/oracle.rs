//! Classification oracle: provider abstraction, strict response schema,
//! and a per-day call budget.
//!
//! Providers only move text. Whatever they return is untrusted until
//! [`validate_response`] accepts it; the classifier falls back to the rule
//! cascade on any error from either step.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::oracle::OracleConfig;
use crate::error::{PipelineError, Result};
use crate::model::{EvidenceKind, EvidenceLevel};

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// A response that passed schema validation.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleVerdict {
    pub extract: String,
    pub level: EvidenceLevel,
    pub reliability: f64,
    pub kind: EvidenceKind,
}

pub type OracleFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// Sends a document to an external classifier and returns its raw reply.
pub trait Oracle: Send + Sync {
    fn classify<'a>(&'a self, document: &'a str) -> OracleFuture<'a>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynOracle = Arc<dyn Oracle>;

/// Factory: build an oracle according to config and environment variables.
///
/// * If `ORACLE_TEST_MODE=mock`, returns a mock with a fixed level-3 reply.
/// * Else if `config.enabled==false`, returns `None` (rules only).
/// * Else builds the configured provider wrapped with the daily budget.
pub fn build_oracle_from_config(config: &OracleConfig) -> Option<DynOracle> {
    if std::env::var("ORACLE_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        let mock = MockOracle::fixed(
            r#"{"extract":"mock extract","level":3,"reliability":0.6,"kind":"fact"}"#,
        );
        return Some(Arc::new(BudgetedOracle::new(mock, config.daily_limit)));
    }

    if !config.enabled {
        return None;
    }

    match config.provider.as_str() {
        "openai" => match OpenAiOracle::new(config) {
            Ok(p) => Some(Arc::new(BudgetedOracle::new(p, config.daily_limit))),
            Err(e) => {
                tracing::warn!(target: "pipeline", error = %e, "oracle disabled: client build failed");
                None
            }
        },
        other => {
            tracing::warn!(target: "pipeline", provider = other, "oracle disabled: unknown provider");
            None
        }
    }
}

// ------------------------------------------------------------
// Schema validation
// ------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireVerdict {
    extract: String,
    level: i64,
    reliability: f64,
    kind: String,
}

/// Parse and validate an oracle reply. Exactly the four fields
/// `extract`, `level`, `reliability`, `kind` are accepted.
pub fn validate_response(raw: &str) -> Result<OracleVerdict> {
    let body = strip_code_fence(raw.trim());
    let wire: WireVerdict = serde_json::from_str(body)
        .map_err(|e| PipelineError::Oracle(format!("malformed response: {e}")))?;

    let extract = wire.extract.trim().to_string();
    if extract.is_empty() {
        return Err(PipelineError::Oracle("empty extract".into()));
    }
    let level = EvidenceLevel::new(wire.level)
        .map_err(|e| PipelineError::Oracle(format!("schema violation: {e}")))?;
    if !wire.reliability.is_finite() || !(0.0..=1.0).contains(&wire.reliability) {
        return Err(PipelineError::Oracle(format!(
            "reliability {} outside [0,1]",
            wire.reliability
        )));
    }
    let kind = EvidenceKind::parse(wire.kind.trim())
        .ok_or_else(|| PipelineError::Oracle(format!("unknown kind {:?}", wire.kind)))?;

    Ok(OracleVerdict {
        extract,
        level,
        reliability: wire.reliability,
        kind,
    })
}

/// Models like to wrap JSON in ``` fences; the content inside is still validated.
fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

// ------------------------------------------------------------
// Providers
// ------------------------------------------------------------

const SYSTEM_PROMPT: &str = "You classify news documents into one evidence statement. \
Reply with ONLY a JSON object with exactly these fields: \
\"extract\" (the single most important factual statement, verbatim), \
\"level\" (integer 1-5: 1 speculation, 2 social/noise, 3 weak secondary, 4 document/data/quote, 5 official), \
\"reliability\" (number 0-1), \
\"kind\" (one of fact, quote, data, inference, hazard).";

/// OpenAI-compatible chat completions provider in JSON mode.
pub struct OpenAiOracle {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiOracle {
    pub fn new(config: &OracleConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("evidence-pipeline/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| PipelineError::Oracle(format!("http client: {e}")))?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            endpoint: config.endpoint.clone(),
        })
    }

    async fn call(&self, document: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(PipelineError::Oracle("missing api key".into()));
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct ResponseFormat {
            #[serde(rename = "type")]
            kind: &'static str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            response_format: ResponseFormat,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: document,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| PipelineError::Oracle(format!("transport: {e}")))?;
        if !resp.status().is_success() {
            return Err(PipelineError::Oracle(format!("status {}", resp.status())));
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| PipelineError::Oracle(format!("envelope: {e}")))?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PipelineError::Oracle("no choices".into()))
    }
}

impl Oracle for OpenAiOracle {
    fn classify<'a>(&'a self, document: &'a str) -> OracleFuture<'a> {
        Box::pin(self.call(document))
    }
    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Replies with a fixed string, or fails, without any I/O.
#[derive(Clone, Debug)]
pub struct MockOracle {
    reply: std::result::Result<String, String>,
}

impl MockOracle {
    pub fn fixed(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            reply: Err(reason.to_string()),
        }
    }
}

impl Oracle for MockOracle {
    fn classify<'a>(&'a self, _document: &'a str) -> OracleFuture<'a> {
        let out = self.reply.clone().map_err(PipelineError::Oracle);
        Box::pin(async move { out })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Daily budget wrapper
// ------------------------------------------------------------

#[derive(Debug)]
struct DailyCounter {
    date: NaiveDate,
    count: u32,
}

/// Caps real calls per UTC day; an exhausted budget is an oracle error.
pub struct BudgetedOracle<O: Oracle> {
    inner: O,
    daily_limit: u32,
    counter: Mutex<DailyCounter>,
}

impl<O: Oracle> BudgetedOracle<O> {
    pub fn new(inner: O, daily_limit: u32) -> Self {
        Self {
            inner,
            daily_limit,
            counter: Mutex::new(DailyCounter {
                date: Utc::now().date_naive(),
                count: 0,
            }),
        }
    }

    fn take_slot(&self) -> Result<()> {
        let mut g = self.counter.lock().expect("poisoned counter");
        let today = Utc::now().date_naive();
        if g.date != today {
            g.date = today;
            g.count = 0;
        }
        if g.count >= self.daily_limit {
            return Err(PipelineError::Oracle(format!(
                "daily limit {} reached",
                self.daily_limit
            )));
        }
        g.count += 1;
        Ok(())
    }
}

impl<O: Oracle> Oracle for BudgetedOracle<O> {
    fn classify<'a>(&'a self, document: &'a str) -> OracleFuture<'a> {
        Box::pin(async move {
            self.take_slot()?;
            self.inner.classify(document).await
        })
    }
    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
