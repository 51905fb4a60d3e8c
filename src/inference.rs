//! Hosted inference client
//!
//! Two call shapes against the inference provider: chat completions and
//! plain text generation. `generate_with_fallback` tries chat first and
//! falls back to text generation once.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::InferenceConfig;
use crate::error::AdvisorError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChatParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompletionParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: Option<f32>,
}

/// Decoding settings for both call shapes of one generator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub chat: ChatParams,
    pub completion: CompletionParams,
}

impl GenerationParams {
    pub const fn new(max_tokens: u32, temperature: f32, top_p: f32, repetition_penalty: Option<f32>) -> Self {
        Self {
            chat: ChatParams {
                max_tokens,
                temperature,
            },
            completion: CompletionParams {
                max_new_tokens: max_tokens,
                temperature,
                top_p,
                repetition_penalty,
            },
        }
    }

    /// Retirement / benefits plan
    pub const fn plan() -> Self {
        Self::new(256, 0.2, 0.9, Some(1.05))
    }

    /// Investment coach
    pub const fn investment() -> Self {
        Self::new(512, 0.3, 0.9, None)
    }

    /// Market insights feed
    pub const fn insights() -> Self {
        Self::new(400, 0.4, 0.9, None)
    }
}

/// Inference collaborator
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    fn model_id(&self) -> &str;

    async fn chat(&self, messages: &[ChatMessage], params: &ChatParams) -> Result<String>;

    async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<String>;
}

/// Chat first; on error or empty text, one text-generation attempt.
///
/// The returned text is trimmed and may be empty when the fallback produced
/// nothing; only a failed fallback is an error.
pub async fn generate_with_fallback(
    backend: &dyn InferenceBackend,
    system_prompt: &str,
    prompt: &str,
    params: &GenerationParams,
) -> Result<String> {
    let messages = [ChatMessage::system(system_prompt), ChatMessage::user(prompt)];

    match backend.chat(&messages, &params.chat).await {
        Ok(text) if !text.trim().is_empty() => return Ok(text.trim().to_string()),
        Ok(_) => warn!(model = backend.model_id(), "Chat call returned empty text, trying text generation"),
        Err(e) => warn!(model = backend.model_id(), "Chat call failed, trying text generation: {}", e),
    }

    let text = backend.complete(prompt, &params.completion).await?;
    Ok(text.trim().to_string())
}

//
// ================= Hosted client =================
//

/// Connection-pooled client for the hosted inference API
pub struct HfInferenceClient {
    client: Client,
    config: InferenceConfig,
}

impl HfInferenceClient {
    pub fn new(config: InferenceConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client, config })
    }

    fn token(&self) -> Result<&str> {
        self.config
            .api_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AdvisorError::Inference("HUGGINGFACEHUB_API_TOKEN not configured".to_string())
            })
    }

    fn text_generation_url(&self) -> String {
        format!(
            "{}/{}",
            self.config.text_url.trim_end_matches('/'),
            self.config.model_id
        )
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<reqwest::Response> {
        let token = self.token()?;

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!("Inference request failed: {}", e);
                AdvisorError::Inference(format!("request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Inference API error response: {}", error_text);
            return Err(AdvisorError::Inference(format!(
                "inference API returned {}: {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct TextGenerationRequest<'a> {
    inputs: &'a str,
    parameters: TextGenerationParameters,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct TextGenerationParameters {
    max_new_tokens: u32,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    repetition_penalty: Option<f32>,
    return_full_text: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextGenerationResponse {
    Batch(Vec<GeneratedText>),
    Single(GeneratedText),
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    #[serde(default)]
    generated_text: String,
}

impl TextGenerationResponse {
    fn into_text(self) -> String {
        match self {
            TextGenerationResponse::Batch(items) => items
                .into_iter()
                .next()
                .map(|g| g.generated_text)
                .unwrap_or_default(),
            TextGenerationResponse::Single(g) => g.generated_text,
        }
    }
}

#[async_trait]
impl InferenceBackend for HfInferenceClient {
    fn model_id(&self) -> &str {
        &self.config.model_id
    }

    async fn chat(&self, messages: &[ChatMessage], params: &ChatParams) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model_id,
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };

        info!(model = %self.config.model_id, "Calling chat completions");
        let response = self.post(&self.config.chat_url, &request).await?;

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            error!("Failed to parse chat response: {}", e);
            AdvisorError::Inference(format!("chat parse error: {}", e))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(content.trim().to_string())
    }

    async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<String> {
        let request = TextGenerationRequest {
            inputs: prompt,
            parameters: TextGenerationParameters {
                max_new_tokens: params.max_new_tokens,
                temperature: params.temperature,
                top_p: params.top_p,
                repetition_penalty: params.repetition_penalty,
                return_full_text: false,
            },
            stream: false,
        };

        info!(model = %self.config.model_id, "Calling text generation");
        let url = self.text_generation_url();
        let response = self.post(&url, &request).await?;

        let parsed: TextGenerationResponse = response.json().await.map_err(|e| {
            error!("Failed to parse text generation response: {}", e);
            AdvisorError::Inference(format!("text generation parse error: {}", e))
        })?;

        Ok(parsed.into_text())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Backend replaying scripted results in call order
    pub(crate) struct ScriptedBackend {
        chat: Mutex<VecDeque<Result<String>>>,
        completion: Mutex<VecDeque<Result<String>>>,
        pub(crate) prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        pub(crate) fn new(chat: Vec<Result<String>>, completion: Vec<Result<String>>) -> Self {
            Self {
                chat: Mutex::new(chat.into()),
                completion: Mutex::new(completion.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn chat_ok(text: &str) -> Self {
            Self::new(vec![Ok(text.to_string())], vec![])
        }

        pub(crate) fn failing() -> Self {
            Self::new(
                vec![Err(AdvisorError::Inference("rate limited".to_string()))],
                vec![Err(AdvisorError::Inference("model loading".to_string()))],
            )
        }

        pub(crate) fn remaining_completions(&self) -> usize {
            self.completion.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl InferenceBackend for ScriptedBackend {
        fn model_id(&self) -> &str {
            "test/model"
        }

        async fn chat(&self, messages: &[ChatMessage], _params: &ChatParams) -> Result<String> {
            if let Some(last) = messages.last() {
                self.prompts.lock().unwrap().push(last.content.clone());
            }
            self.chat
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AdvisorError::Inference("no scripted chat".to_string())))
        }

        async fn complete(&self, prompt: &str, _params: &CompletionParams) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.completion
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AdvisorError::Inference("no scripted completion".to_string())))
        }
    }

    #[tokio::test]
    async fn test_chat_success_skips_completion() {
        let backend = ScriptedBackend::new(
            vec![Ok("  {\"ok\": true}  ".to_string())],
            vec![Ok("unused".to_string())],
        );
        let text = generate_with_fallback(&backend, "sys", "prompt", &GenerationParams::plan())
            .await
            .unwrap();
        assert_eq!(text, "{\"ok\": true}");
        assert_eq!(backend.remaining_completions(), 1);
    }

    #[tokio::test]
    async fn test_empty_chat_falls_back() {
        let backend = ScriptedBackend::new(
            vec![Ok("   ".to_string())],
            vec![Ok(" from text ".to_string())],
        );
        let text = generate_with_fallback(&backend, "sys", "prompt", &GenerationParams::plan())
            .await
            .unwrap();
        assert_eq!(text, "from text");
    }

    #[tokio::test]
    async fn test_chat_error_falls_back() {
        let backend = ScriptedBackend::new(
            vec![Err(AdvisorError::Inference("503".to_string()))],
            vec![Ok("recovered".to_string())],
        );
        let text = generate_with_fallback(&backend, "sys", "prompt", &GenerationParams::plan())
            .await
            .unwrap();
        assert_eq!(text, "recovered");
    }

    #[tokio::test]
    async fn test_both_failing_surfaces_fallback_error() {
        let backend = ScriptedBackend::failing();
        let err = generate_with_fallback(&backend, "sys", "prompt", &GenerationParams::plan())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model loading"));
    }

    #[test]
    fn test_request_serialization() {
        let messages = [ChatMessage::system("Follow the prompt."), ChatMessage::user("Hi")];
        let request = ChatRequest {
            model: "m",
            messages: &messages,
            max_tokens: 256,
            temperature: 0.2,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["max_tokens"], 256);

        let request = TextGenerationRequest {
            inputs: "Hi",
            parameters: TextGenerationParameters {
                max_new_tokens: 256,
                temperature: 0.2,
                top_p: 0.9,
                repetition_penalty: None,
                return_full_text: false,
            },
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json["parameters"].get("repetition_penalty").is_none());
        assert_eq!(json["parameters"]["return_full_text"], false);
    }

    #[test]
    fn test_text_generation_response_shapes() {
        let batch: TextGenerationResponse =
            serde_json::from_str(r#"[{"generated_text": "hello"}]"#).unwrap();
        assert_eq!(batch.into_text(), "hello");
        let single: TextGenerationResponse =
            serde_json::from_str(r#"{"generated_text": "world"}"#).unwrap();
        assert_eq!(single.into_text(), "world");
    }

    #[tokio::test]
    async fn test_missing_token_is_inference_error() {
        let client = HfInferenceClient::new(InferenceConfig::default()).unwrap();
        let err = client
            .chat(&[ChatMessage::user("hi")], &GenerationParams::plan().chat)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HUGGINGFACEHUB_API_TOKEN"));
    }

    #[test]
    fn test_text_generation_url() {
        let client = HfInferenceClient::new(InferenceConfig::default()).unwrap();
        assert_eq!(
            client.text_generation_url(),
            "https://api-inference.huggingface.co/models/meta-llama/Llama-3.1-8B-Instruct"
        );
    }
}
