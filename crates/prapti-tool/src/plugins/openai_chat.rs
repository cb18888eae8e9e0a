//! `openai.chat`: responses from an OpenAI-compatible chat completions API.
//!
//! The API key is read from `PRAPTI_OPENAI_API_KEY`, falling back to
//! `OPENAI_API_KEY`. It is never read from configuration, so it cannot end
//! up in a chat document.

use std::sync::Arc;
use std::time::{Duration, Instant};

use prapti::config::{ConfigScope, FieldSchema, ValueKind};
use prapti::document::Message;
use prapti::error::ResponderError;
use prapti::plugin::{Plugin, PluginRegistrar};
use prapti::responder::{CancelToken, Responder, ResponderContext, ResponderFactory};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Environment variables consulted for the API key, in order.
pub const API_KEY_VARS: [&str; 2] = ["PRAPTI_OPENAI_API_KEY", "OPENAI_API_KEY"];

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct OpenAiChatPlugin;

impl OpenAiChatPlugin {
    pub const NAME: &'static str = "openai.chat";
}

impl Plugin for OpenAiChatPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Generate responses using the OpenAI chat completions API"
    }

    fn register(&self, registrar: &mut PluginRegistrar) {
        registrar.set_responder_factory(OpenAiChatFactory);
    }
}

struct OpenAiChatFactory;

impl ResponderFactory for OpenAiChatFactory {
    fn configuration(&self) -> Vec<(String, FieldSchema)> {
        vec![
            ("model".into(), FieldSchema::string(DEFAULT_MODEL)),
            ("temperature".into(), FieldSchema::float(1.0)),
            ("top_p".into(), FieldSchema::float(1.0)),
            ("n".into(), FieldSchema::int(1).with_doc("number of completions to generate")),
            ("max_tokens".into(), FieldSchema::optional(ValueKind::Int)),
            ("presence_penalty".into(), FieldSchema::float(0.0)),
            ("frequency_penalty".into(), FieldSchema::float(0.0)),
            (
                "stop".into(),
                FieldSchema::optional(ValueKind::list_of(ValueKind::String)),
            ),
            (
                "user".into(),
                FieldSchema::optional(ValueKind::String).with_doc("end-user id for abuse monitoring"),
            ),
            ("api_base".into(), FieldSchema::string(DEFAULT_API_BASE)),
        ]
    }

    fn create(&self, _name: &str) -> Result<Arc<dyn Responder>, ResponderError> {
        Ok(Arc::new(OpenAiChatResponder::new()?))
    }
}

/// Read the API key through `lookup` (normally `std::env::var`).
pub fn api_key_from(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    API_KEY_VARS
        .iter()
        .find_map(|var| lookup(var).filter(|key| !key.is_empty()))
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    top_p: f64,
    n: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<i64>,
    presence_penalty: f64,
    frequency_penalty: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
}

impl ChatRequest {
    fn from_config(config: &ConfigScope<'_>, messages: &[Message]) -> Self {
        Self {
            model: config.get_str("model").unwrap_or(DEFAULT_MODEL).to_string(),
            messages: convert_messages(messages),
            temperature: config.get_f64("temperature").unwrap_or(1.0),
            top_p: config.get_f64("top_p").unwrap_or(1.0),
            n: config.get_i64("n").unwrap_or(1),
            max_tokens: config.get_i64("max_tokens"),
            presence_penalty: config.get_f64("presence_penalty").unwrap_or(0.0),
            frequency_penalty: config.get_f64("frequency_penalty").unwrap_or(0.0),
            stop: config.get_string_list("stop"),
            user: config.get_str("user").map(str::to_string),
        }
    }
}

/// Keep the roles the API understands; forward names.
fn convert_messages(messages: &[Message]) -> Vec<ChatMessage> {
    messages
        .iter()
        .filter(|m| m.enabled && !m.is_hidden())
        .filter(|m| {
            let known = matches!(m.role.as_str(), "system" | "user" | "assistant");
            if !known {
                debug!("openai.chat: skipping message with role '{}'", m.role);
            }
            known
        })
        .map(|m| ChatMessage {
            role: m.role.clone(),
            content: m.text(),
            name: m.name.clone(),
        })
        .collect()
}

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    #[serde(default)]
    choices: Vec<RawChoice>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

#[derive(Deserialize, Debug)]
struct UsageInfo {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

/// Turn a response body into assistant messages. Several choices are
/// numbered `assistant/1`, `assistant/2`, ...
fn parse_completion(text: &str) -> Result<Vec<Message>, ResponderError> {
    let parsed: RawChatResponse = serde_json::from_str(text)
        .map_err(|e| ResponderError::Backend(format!("failed to parse response: {e}")))?;

    if let Some(err) = parsed.error {
        return Err(ResponderError::Backend(format!("API error: {}", err.message)));
    }
    if let Some(usage) = &parsed.usage {
        debug!(
            "token usage: prompt={}, completion={}, total={}",
            usage.prompt_tokens.unwrap_or(0),
            usage.completion_tokens.unwrap_or(0),
            usage.total_tokens.unwrap_or(0),
        );
    }

    let single = parsed.choices.len() == 1;
    Ok(parsed
        .choices
        .into_iter()
        .enumerate()
        .map(|(i, choice)| {
            let content = choice.message.content.unwrap_or_default();
            let name = (!single).then(|| (i + 1).to_string());
            Message::with_content("assistant", content.trim()).with_name(name)
        })
        .collect())
}

// ── Responder ───────────────────────────────────────────────────────

struct OpenAiChatResponder {
    client: reqwest::Client,
}

impl OpenAiChatResponder {
    fn new() -> Result<Self, ResponderError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("prapti/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ResponderError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn chat(
        &self,
        api_base: &str,
        api_key: &str,
        body: &ChatRequest,
    ) -> Result<Vec<Message>, ResponderError> {
        let url = format!("{}/chat/completions", api_base.trim_end_matches('/'));
        debug!(
            "openai.chat request: model={}, messages={}, n={}, temp={}",
            body.model,
            body.messages.len(),
            body.n,
            body.temperature,
        );
        trace!(
            "request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(body)
            .send()
            .await
            .map_err(|e| ResponderError::Backend(format!("request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ResponderError::Backend(format!("failed to read response: {e}")))?;
        debug!(
            "openai.chat response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(ResponderError::Backend(format!("HTTP {status}: {text}")));
        }
        parse_completion(&text)
    }
}

async fn cancelled(cancel: &CancelToken) {
    while !cancel.is_cancelled() {
        tokio::time::sleep(CANCEL_POLL_INTERVAL).await;
    }
}

fn dry_run_reply(request: &ChatRequest) -> Message {
    let mut params = serde_json::to_value(request).unwrap_or_default();
    params["messages"] = serde_json::json!(["..."]);
    Message::with_content(
        "assistant",
        format!("dry run mode.\nchat_parameters = {params}"),
    )
}

impl Responder for OpenAiChatResponder {
    fn generate(
        &self,
        messages: &[Message],
        ctx: &ResponderContext<'_>,
    ) -> Result<Vec<Message>, ResponderError> {
        let request = ChatRequest::from_config(&ctx.config, messages);
        if ctx.dry_run() {
            info!(
                message_id = "openai.chat-dry-run",
                "openai.chat: dry run: bailing before contacting the API"
            );
            return Ok(vec![dry_run_reply(&request)]);
        }

        let api_key = api_key_from(|var| std::env::var(var).ok()).ok_or_else(|| {
            ResponderError::Config(format!(
                "API key not set; export {} or {}",
                API_KEY_VARS[0], API_KEY_VARS[1]
            ))
        })?;
        let api_base = ctx.config.get_str("api_base").unwrap_or(DEFAULT_API_BASE);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ResponderError::Backend(format!("failed to start runtime: {e}")))?;
        runtime.block_on(async {
            tokio::select! {
                result = self.chat(api_base, &api_key, &request) => result,
                () = cancelled(ctx.cancel) => Err(ResponderError::Cancelled),
                Ok(()) = tokio::signal::ctrl_c() => {
                    ctx.cancel.cancel();
                    Err(ResponderError::Cancelled)
                }
            }
        })
    }
}
