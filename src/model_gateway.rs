use anyhow::{Result, anyhow};
use futures::stream::BoxStream;
use reqwest::Client;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

use crate::config::Config;
use crate::messages::{AiMessage, AiMessageChunk, Message};
use crate::providers;
use crate::tools::ToolSpec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    Required,
    Function(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    JsonObject,
}

/// Provider-neutral description of one chat-completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub tool_choice: Option<ToolChoice>,
    pub response_format: Option<ResponseFormat>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub include_usage: bool,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            tool_choice: None,
            response_format: None,
            temperature: None,
            max_tokens: None,
            include_usage: false,
        }
    }
}

pub type ChunkStream = BoxStream<'static, Result<AiMessageChunk>>;
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

pub trait ModelGateway: Send + Sync {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> GatewayFuture<'a, AiMessage>;

    fn stream<'a>(&'a self, request: &'a ChatRequest) -> GatewayFuture<'a, ChunkStream>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    OpenAi,
}

impl Provider {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            other => {
                warn!(provider = %other, "unsupported model provider configured");
                Err(anyhow!(
                    "Unsupported MODEL_PROVIDER='{}'. Supported providers: openai.",
                    other
                ))
            }
        }
    }
}

/// Gateway that talks to the configured remote endpoint over HTTP.
pub struct HttpGateway {
    client: Client,
    cfg: Config,
    provider: Provider,
}

impl HttpGateway {
    pub fn new(client: Client, cfg: &Config) -> Result<Self> {
        let provider = Provider::parse(&cfg.model_provider)?;
        Ok(Self {
            client,
            cfg: cfg.clone(),
            provider,
        })
    }
}

impl ModelGateway for HttpGateway {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> GatewayFuture<'a, AiMessage> {
        Box::pin(async move {
            match self.provider {
                Provider::OpenAi => {
                    debug!(
                        provider = "openai",
                        model = %request.model,
                        message_count = request.messages.len(),
                        tool_count = request.tools.len(),
                        "dispatching model chat request"
                    );
                    providers::openai::complete(&self.client, &self.cfg, request).await
                }
            }
        })
    }

    fn stream<'a>(&'a self, request: &'a ChatRequest) -> GatewayFuture<'a, ChunkStream> {
        Box::pin(async move {
            match self.provider {
                Provider::OpenAi => {
                    debug!(
                        provider = "openai",
                        model = %request.model,
                        message_count = request.messages.len(),
                        include_usage = request.include_usage,
                        "dispatching streaming model chat request"
                    );
                    providers::openai::stream(&self.client, &self.cfg, request).await
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{HttpGateway, Provider};
    use crate::config::Config;

    #[test]
    fn provider_parse_is_case_insensitive() {
        assert_eq!(
            Provider::parse(" OpenAI ").expect("openai should parse"),
            Provider::OpenAi
        );
    }

    #[test]
    fn http_gateway_rejects_unknown_provider() {
        let cfg = Config {
            model_provider: "invalid".to_string(),
            ..Config::default()
        };
        let err = HttpGateway::new(reqwest::Client::new(), &cfg)
            .err()
            .expect("unknown provider should fail");
        let msg = format!("{err:#}");
        assert!(
            msg.contains("Unsupported MODEL_PROVIDER='invalid'"),
            "unexpected error message: {msg}"
        );
    }
}
