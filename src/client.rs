//! Client for an OpenAI-compatible chat completions endpoint that asks for
//! a [`GeneratedPost`] through a strict `json_schema` response format.
//!
//! One call to [`GenerationClient::generate`] is one HTTP request. Nothing is
//! retried here; callers decide what to do with a retryable error.

use std::env;
use std::fmt;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::constants::{
    API_KEY_ENV, COMPATIBLE_MODELS, DEFAULT_TIMEOUT_SECS, MAX_TOKENS, OPENAI_BASE_URL,
    PING_MAX_TOKENS, RESPONSE_FORMAT, SYSTEM_PROMPT, TEMPERATURE,
};
use crate::error::GenerationError;
use crate::post::{GeneratedPost, ValidationReport};

// Request/response shapes of POST {base}/chat/completions
#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'a Value>,
}

#[derive(Deserialize, Debug)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Deserialize, Debug)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    // Usually a string, but some compatible gateways send numbers.
    #[serde(default)]
    code: Option<Value>,
}

/// Provider- or transport-level failure class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportErrorKind {
    RateLimited,
    QuotaExceeded,
    InvalidCredential,
    Other { status: Option<u16> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {err}")
        } else {
            err.to_string()
        };
        TransportError {
            kind: TransportErrorKind::Other {
                status: err.status().map(|s| s.as_u16()),
            },
            message,
        }
    }
}

impl From<TransportError> for GenerationError {
    fn from(failure: TransportError) -> Self {
        match failure.kind {
            TransportErrorKind::RateLimited => GenerationError::RateLimited(failure.message),
            TransportErrorKind::QuotaExceeded => GenerationError::QuotaExceeded(failure.message),
            TransportErrorKind::InvalidCredential => {
                GenerationError::InvalidCredential(failure.message)
            }
            TransportErrorKind::Other { status } => GenerationError::Provider {
                status,
                message: failure.message,
            },
        }
    }
}

/// What a single generation request produced.
#[derive(Debug)]
pub enum GenerationOutcome {
    Post(GeneratedPost),
    /// The model refused on policy grounds; carries the refusal text.
    Declined(String),
    EmptyResult,
    ValidationFailed(ValidationReport),
    TransportError(TransportError),
}

impl GenerationOutcome {
    pub fn into_result(self) -> Result<GeneratedPost, GenerationError> {
        match self {
            GenerationOutcome::Post(post) => Ok(post),
            GenerationOutcome::Declined(refusal) => Err(GenerationError::Declined(refusal)),
            GenerationOutcome::EmptyResult => Err(GenerationError::EmptyResult),
            GenerationOutcome::ValidationFailed(report) => {
                Err(GenerationError::ValidationFailed(report))
            }
            GenerationOutcome::TransportError(failure) => Err(failure.into()),
        }
    }
}

/// Classifies a failed provider response.
///
/// Structured signals win: the `code`/`type` of the JSON error body, then the
/// HTTP status. Matching on the message text is the last resort.
pub fn classify_failure(status: Option<u16>, body: &str) -> TransportError {
    let api_error = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error);

    let message = api_error
        .as_ref()
        .map(|e| e.message.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string());
    let message = if message.is_empty() {
        match status {
            Some(status) => format!("HTTP {status} with an empty body"),
            None => "no error details".to_string(),
        }
    } else {
        message
    };

    let codes: Vec<String> = api_error
        .iter()
        .flat_map(|e| {
            let code = e.code.as_ref().and_then(|c| match c {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
            code.into_iter().chain(e.kind.clone())
        })
        .collect();

    let kind = kind_from_codes(&codes)
        .or_else(|| kind_from_status(status, &message))
        .or_else(|| kind_from_message(&message))
        .unwrap_or(TransportErrorKind::Other { status });

    TransportError { kind, message }
}

fn kind_from_codes(codes: &[String]) -> Option<TransportErrorKind> {
    codes.iter().find_map(|code| match code.as_str() {
        "insufficient_quota" => Some(TransportErrorKind::QuotaExceeded),
        "rate_limit_exceeded" | "rate_limit_error" => Some(TransportErrorKind::RateLimited),
        "invalid_api_key" | "authentication_error" => Some(TransportErrorKind::InvalidCredential),
        _ => None,
    })
}

fn kind_from_status(status: Option<u16>, message: &str) -> Option<TransportErrorKind> {
    match status? {
        401 => Some(TransportErrorKind::InvalidCredential),
        // 429 covers both throttling and an exhausted balance.
        429 if message.to_lowercase().contains("quota") => Some(TransportErrorKind::QuotaExceeded),
        429 => Some(TransportErrorKind::RateLimited),
        _ => None,
    }
}

fn kind_from_message(message: &str) -> Option<TransportErrorKind> {
    let lower = message.to_lowercase();
    if lower.contains("insufficient_quota") {
        Some(TransportErrorKind::QuotaExceeded)
    } else if lower.contains("rate_limit") || lower.contains("rate limit") {
        Some(TransportErrorKind::RateLimited)
    } else if lower.contains("invalid_api_key") || lower.contains("incorrect api key") {
        Some(TransportErrorKind::InvalidCredential)
    } else {
        None
    }
}

fn resolve_credential(
    explicit: Option<&str>,
    from_env: Option<String>,
) -> Result<String, GenerationError> {
    explicit
        .map(str::to_string)
        .into_iter()
        .chain(from_env)
        .map(|key| key.trim().to_string())
        .find(|key| !key.is_empty())
        .ok_or_else(|| {
            GenerationError::Configuration(format!(
                "no API key found; pass one explicitly or set {API_KEY_ENV}"
            ))
        })
}

pub fn is_compatible_model(model: &str) -> bool {
    COMPATIBLE_MODELS.contains(&model)
}

fn build_http(timeout: Duration) -> Result<Client, GenerationError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| GenerationError::Configuration(format!("failed to build HTTP client: {e}")))
}

fn user_prompt(idea: &str) -> String {
    format!(
        "Write a professional social-media post about the following topic:\n\n\"{idea}\"\n\n\
         Make sure the content is valuable, relevant and engaging."
    )
}

/// Turns a decoded completion into an outcome.
fn interpret(response: CompletionResponse) -> GenerationOutcome {
    let Some(choice) = response.choices.into_iter().next() else {
        warn!("completion contained no choices");
        return GenerationOutcome::EmptyResult;
    };
    let message = choice.message;

    if let Some(refusal) = message.refusal.filter(|r| !r.trim().is_empty()) {
        info!("provider declined the request");
        return GenerationOutcome::Declined(refusal);
    }

    let Some(content) = message.content.filter(|c| !c.trim().is_empty()) else {
        warn!("completion had no content");
        return GenerationOutcome::EmptyResult;
    };

    let value: Value = match serde_json::from_str(&content) {
        Ok(Value::Null) => return GenerationOutcome::EmptyResult,
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "completion content is not JSON");
            return GenerationOutcome::EmptyResult;
        }
    };

    match GeneratedPost::from_value(&value) {
        Ok(post) => {
            info!(
                category = post.category(),
                tags = post.tags().len(),
                "post generated"
            );
            GenerationOutcome::Post(post)
        }
        Err(report) => {
            warn!(violations = report.len(), "post failed validation");
            GenerationOutcome::ValidationFailed(report)
        }
    }
}

/// Generates posts through one provider account.
#[derive(Clone)]
pub struct GenerationClient {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl fmt::Debug for GenerationClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationClient")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl GenerationClient {
    /// Builds a client. The credential falls back to `OPENAI_API_KEY` when
    /// not given; a model outside [`COMPATIBLE_MODELS`] only logs a warning.
    pub fn configure(credential: Option<&str>, model: &str) -> Result<Self, GenerationError> {
        let api_key = resolve_credential(credential, env::var(API_KEY_ENV).ok())?;

        if !is_compatible_model(model) {
            warn!(
                model,
                recommended = %COMPATIBLE_MODELS.join(", "),
                "model may not support structured outputs"
            );
        }

        Ok(Self {
            http: build_http(Duration::from_secs(DEFAULT_TIMEOUT_SECS))?,
            api_key,
            model: model.to_string(),
            base_url: OPENAI_BASE_URL.trim_end_matches('/').to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, GenerationError> {
        self.http = build_http(timeout)?;
        Ok(self)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Minimal round trip to prove the credential and network path work.
    #[instrument(skip(self), fields(model = %self.model))]
    pub async fn check_availability(&self) -> Result<(), GenerationError> {
        let request = CompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: "test",
            }],
            temperature: None,
            max_tokens: PING_MAX_TOKENS,
            response_format: None,
        };

        match self.send(&request).await {
            Ok(_) => {
                info!("provider reachable");
                Ok(())
            }
            Err(failure) => Err(GenerationError::Connectivity(failure.message)),
        }
    }

    /// Generates one post from `idea`.
    pub async fn generate(&self, idea: &str) -> Result<GeneratedPost, GenerationError> {
        self.generate_outcome(idea).await?.into_result()
    }

    /// Like [`generate`](Self::generate) but hands back the tagged outcome.
    /// Only invalid input and undecodable responses are returned as `Err`.
    #[instrument(skip(self, idea), fields(model = %self.model))]
    pub async fn generate_outcome(&self, idea: &str) -> Result<GenerationOutcome, GenerationError> {
        let idea = idea.trim();
        if idea.is_empty() {
            return Err(GenerationError::InvalidInput(
                "the idea for the post must not be empty".to_string(),
            ));
        }

        let prompt = user_prompt(idea);
        let request = CompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.as_str(),
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: Some(TEMPERATURE),
            max_tokens: MAX_TOKENS,
            response_format: Some(&*RESPONSE_FORMAT),
        };

        let body = match self.send(&request).await {
            Ok(body) => body,
            Err(failure) => return Ok(GenerationOutcome::TransportError(failure)),
        };

        let response: CompletionResponse = serde_json::from_str(&body).map_err(|e| {
            error!(error = %e, "undecodable completion response");
            GenerationError::Unexpected(format!("could not decode the provider response: {e}"))
        })?;

        Ok(interpret(response))
    }

    async fn send(&self, request: &CompletionRequest<'_>) -> Result<String, TransportError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, max_tokens = request.max_tokens, "sending completion request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "completion request failed to send");
                TransportError::from_reqwest(e)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(TransportError::from_reqwest)?;

        // Some compatible gateways report failures in a 2xx reply.
        if !status.is_success() || serde_json::from_str::<ErrorEnvelope>(&body).is_ok() {
            let failure = classify_failure(Some(status.as_u16()), &body);
            error!(%status, kind = ?failure.kind, "provider rejected the request");
            return Err(failure);
        }

        debug!(%status, bytes = body.len(), "completion received");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn completion(message: Value) -> CompletionResponse {
        serde_json::from_value(json!({ "choices": [{ "index": 0, "message": message }] }))
            .unwrap()
    }

    fn valid_post_json() -> String {
        json!({
            "title": "Why async standups beat daily calls",
            "body": "Written updates give every timezone a voice and leave a trail of decisions.",
            "tags": ["remotework", "productivity", "teams"],
            "category": "business",
        })
        .to_string()
    }

    #[test]
    fn test_classify_by_error_code() {
        let body = json!({
            "error": {
                "message": "You exceeded your current quota",
                "type": "insufficient_quota",
                "code": "insufficient_quota"
            }
        })
        .to_string();
        let failure = classify_failure(Some(429), &body);
        assert_eq!(failure.kind, TransportErrorKind::QuotaExceeded);
        assert_eq!(failure.message, "You exceeded your current quota");

        let body = json!({
            "error": {
                "message": "Incorrect API key provided",
                "type": "invalid_request_error",
                "code": "invalid_api_key"
            }
        })
        .to_string();
        assert_eq!(
            classify_failure(Some(401), &body).kind,
            TransportErrorKind::InvalidCredential
        );
    }

    #[test]
    fn test_classify_by_status() {
        let body = r#"{"error":{"message":"Slow down","type":"requests","code":null}}"#;
        assert_eq!(
            classify_failure(Some(429), body).kind,
            TransportErrorKind::RateLimited
        );
        assert_eq!(
            classify_failure(Some(401), "unauthorized").kind,
            TransportErrorKind::InvalidCredential
        );
    }

    #[test]
    fn test_classify_falls_back_to_message() {
        let failure = classify_failure(Some(400), "upstream said: rate_limit reached");
        assert_eq!(failure.kind, TransportErrorKind::RateLimited);
        assert_eq!(failure.message, "upstream said: rate_limit reached");
    }

    #[test]
    fn test_classify_unknown_failure_keeps_status() {
        let failure = classify_failure(Some(500), "");
        assert_eq!(
            failure.kind,
            TransportErrorKind::Other { status: Some(500) }
        );
        assert_eq!(failure.message, "HTTP 500 with an empty body");
    }

    #[test]
    fn test_resolve_credential() {
        let env_key = || Some("sk-env".to_string());
        let key = resolve_credential(Some("sk-explicit"), env_key()).unwrap();
        assert_eq!(key, "sk-explicit");
        assert_eq!(resolve_credential(None, env_key()).unwrap(), "sk-env");
        assert_eq!(resolve_credential(Some("  "), env_key()).unwrap(), "sk-env");
        assert!(matches!(
            resolve_credential(None, None),
            Err(GenerationError::Configuration(_))
        ));
        assert!(matches!(
            resolve_credential(Some(""), Some(String::new())),
            Err(GenerationError::Configuration(_))
        ));
    }

    #[test]
    fn test_configure_accepts_unlisted_model() {
        let client = GenerationClient::configure(Some("sk-test"), "my-local-model").unwrap();
        assert_eq!(client.model(), "my-local-model");
        assert!(!is_compatible_model("my-local-model"));
        assert!(is_compatible_model("gpt-4o-mini"));
        assert!(!format!("{client:?}").contains("sk-test"));
    }

    #[test]
    fn test_interpret_refusal() {
        let message = json!({ "content": null, "refusal": "I can't help with that." });
        let outcome = interpret(completion(message));
        assert!(matches!(
            outcome,
            GenerationOutcome::Declined(text) if text == "I can't help with that."
        ));
    }

    #[test]
    fn test_interpret_empty_results() {
        let no_choices: CompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(interpret(no_choices), GenerationOutcome::EmptyResult));
        assert!(matches!(
            interpret(completion(json!({ "content": "" }))),
            GenerationOutcome::EmptyResult
        ));
        assert!(matches!(
            interpret(completion(json!({ "content": "here is your post!" }))),
            GenerationOutcome::EmptyResult
        ));
        assert!(matches!(
            interpret(completion(json!({ "content": "null" }))),
            GenerationOutcome::EmptyResult
        ));
    }

    #[test]
    fn test_interpret_valid_post() {
        let message = json!({ "content": valid_post_json(), "refusal": null });
        let outcome = interpret(completion(message));
        match outcome {
            GenerationOutcome::Post(post) => assert_eq!(post.category(), "Business"),
            other => panic!("expected a post, got {other:?}"),
        }
    }

    #[test]
    fn test_completion_envelope_is_strict() {
        assert!(serde_json::from_str::<CompletionResponse>(r#"{"foo":1}"#).is_err());
        assert!(serde_json::from_str::<CompletionResponse>("{}").is_err());

        let envelope = r#"{"error":{"message":"Slow down","code":"rate_limit_exceeded"}}"#;
        assert!(serde_json::from_str::<ErrorEnvelope>(envelope).is_ok());
        assert!(serde_json::from_str::<ErrorEnvelope>(r#"{"choices":[]}"#).is_err());
    }

    #[test]
    fn test_outcome_into_result_maps_transport_kinds() {
        let outcome = GenerationOutcome::TransportError(TransportError {
            kind: TransportErrorKind::QuotaExceeded,
            message: "no credit".to_string(),
        });
        assert!(matches!(
            outcome.into_result(),
            Err(GenerationError::QuotaExceeded(message)) if message == "no credit"
        ));
    }

    #[test]
    fn test_request_serialization() {
        let request = CompletionRequest {
            model: "gpt-4o",
            messages: vec![ChatMessage {
                role: "user",
                content: "test",
            }],
            temperature: None,
            max_tokens: PING_MAX_TOKENS,
            response_format: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "gpt-4o",
                "messages": [{ "role": "user", "content": "test" }],
                "max_tokens": 5
            })
        );
    }
}
