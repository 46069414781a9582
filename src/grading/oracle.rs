// src/grading/oracle.rs

//! Client for the external grading oracle: an OpenAI-compatible chat-completions
//! endpoint, plus the [`OracleGrader`] that turns its free-text replies into grades.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::OracleConfig,
    grading::{
        Grade, GradeRequest, GradeSource, Grader,
        fallback::{EMPTY_RATIONALE, fallback_grade},
        prompt::{build_grading_prompt, finalize, parse_reply},
    },
};

const SYSTEM_PROMPT: &str =
    "You are a fair and consistent teaching assistant who grades short answers against a rubric.";

/// Failures talking to the oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("grading oracle unavailable: {0}")]
    Unavailable(String),

    #[error("grading oracle timed out")]
    Timeout,

    #[error("grading oracle rejected credentials (HTTP {0})")]
    Auth(u16),

    #[error("grading oracle returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("grading oracle reply could not be used: {0}")]
    Malformed(String),
}

impl OracleError {
    /// Credential failures and unusable replies will not improve on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            OracleError::Unavailable(_) | OracleError::Timeout => true,
            OracleError::Http { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            OracleError::Auth(_) | OracleError::Malformed(_) => false,
        }
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OracleError::Timeout
        } else if err.is_decode() {
            OracleError::Malformed(err.to_string())
        } else {
            OracleError::Unavailable(err.to_string())
        }
    }
}

/// A text-completion service: prompt in, free text out.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct ChatCompletionClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatCompletionClient {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl CompletionModel for ChatCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.2,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(OracleError::Auth(status.as_u16()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Http {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let reply: ChatResponse = response.json().await?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| OracleError::Malformed("no choices in completion".to_string()))
    }
}

/// Stand-in used when no oracle credentials are configured.
pub struct DisabledCompletion;

#[async_trait]
impl CompletionModel for DisabledCompletion {
    async fn complete(&self, _prompt: &str) -> Result<String, OracleError> {
        Err(OracleError::Unavailable("no API key configured".to_string()))
    }
}

/// Grades free-text answers through a [`CompletionModel`].
///
/// * Empty answers are scored 0 without contacting the model.
/// * Transient failures are retried with linear backoff.
/// * When the model stays unreachable or its reply has no usable labels, the
///   local fallback scorer decides, unless `fallback_on_failure` is off, in which
///   case the error is returned to the caller.
pub struct OracleGrader {
    model: Arc<dyn CompletionModel>,
    max_retries: u32,
    retry_backoff: Duration,
    fallback_on_failure: bool,
}

impl OracleGrader {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self {
            model,
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
            fallback_on_failure: true,
        }
    }

    /// Builds the grader described by the configuration.
    pub fn from_config(config: &OracleConfig) -> Result<Self, OracleError> {
        let model: Arc<dyn CompletionModel> = match &config.api_key {
            Some(key) => Arc::new(ChatCompletionClient::new(
                config.base_url.as_str(),
                key.clone(),
                config.model.clone(),
                config.timeout,
            )?),
            None => {
                tracing::warn!("ORACLE_API_KEY not set, free-text answers use the fallback scorer");
                Arc::new(DisabledCompletion)
            }
        };

        Ok(Self::new(model)
            .with_retries(config.max_retries, config.retry_backoff)
            .with_fallback(config.fallback_on_failure))
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }

    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_on_failure = enabled;
        self
    }

    async fn complete_with_retry(&self, prompt: &str) -> Result<String, OracleError> {
        let mut attempt = 0;
        loop {
            match self.model.complete(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!("Oracle call failed ({}), retry {}/{}", e, attempt, self.max_retries);
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn ask_oracle(&self, request: &GradeRequest<'_>) -> Result<Grade, OracleError> {
        let prompt = build_grading_prompt(request);
        let text = self.complete_with_retry(&prompt).await?;

        let parsed = parse_reply(&text).ok_or_else(|| {
            OracleError::Malformed(format!(
                "no labeled fields in reply: {}",
                text.chars().take(120).collect::<String>()
            ))
        })?;

        let (grade, corrected) = finalize(parsed, request.max_points);
        if corrected {
            tracing::warn!(
                "Oracle reply needed correction (score {}, confidence {}): {}",
                grade.score,
                grade.confidence,
                text.chars().take(200).collect::<String>()
            );
        }
        Ok(grade)
    }
}

#[async_trait]
impl Grader for OracleGrader {
    async fn grade(&self, request: GradeRequest<'_>) -> Result<Grade, OracleError> {
        if request.answer.trim().is_empty() {
            return Ok(Grade::local(0, EMPTY_RATIONALE, 100, GradeSource::ShortCircuit));
        }

        match self.ask_oracle(&request).await {
            Ok(grade) => Ok(grade),
            Err(e) if self.fallback_on_failure => {
                tracing::warn!("Falling back to local scorer: {}", e);
                Ok(fallback_grade(request.answer, request.max_points))
            }
            Err(e) => Err(e),
        }
    }
}
