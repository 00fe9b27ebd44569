use anyhow::{Result, anyhow};
use std::env;
use std::fmt;

const DEFAULT_MODEL_PROVIDER: &str = "openai";
const DEFAULT_MODEL: &str = "qwen-plus";
const DEFAULT_MODEL_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 60;
const DEFAULT_STREAM_INCLUDE_USAGE: bool = true;
const DEFAULT_BATCH_MAX_CONCURRENCY: usize = 4;
const MAX_TEMPERATURE: f32 = 2.0;

/// Variables consulted for the API key, in priority order.
pub const API_KEY_VARS: [&str; 3] = ["MODEL_API_KEY", "DASHSCOPE_API_KEY", "OPENAI_API_KEY"];

/// Providers that may appear as a `provider:` prefix on `MODEL`.
pub const KNOWN_PROVIDERS: [&str; 1] = ["openai"];

#[derive(Clone)]
pub struct Config {
    pub model_provider: String,
    pub model: String,
    pub model_base_url: String,
    pub api_key: Option<String>,
    pub system_prompt: String,
    pub model_timeout_secs: u64,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stream_include_usage: bool,
    pub batch_max_concurrency: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Self {
        let raw_model = get_var("MODEL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let (prefixed_provider, model) = split_model_spec(&raw_model);
        let model_provider = match prefixed_provider {
            Some(provider) => provider.to_string(),
            None => get_var("MODEL_PROVIDER")
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL_PROVIDER.to_string()),
        };
        let api_key = API_KEY_VARS
            .iter()
            .filter_map(|key| get_var(key))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty());

        Self {
            model_provider,
            model: model.to_string(),
            model_base_url: get_var("MODEL_BASE_URL")
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL_BASE_URL.to_string()),
            api_key,
            system_prompt: get_var("SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            model_timeout_secs: parse_model_timeout_secs(get_var("MODEL_TIMEOUT_SECS").as_deref()),
            temperature: parse_temperature(get_var("MODEL_TEMPERATURE").as_deref()),
            max_tokens: parse_max_tokens(get_var("MODEL_MAX_TOKENS").as_deref()),
            stream_include_usage: parse_bool(
                get_var("STREAM_INCLUDE_USAGE").as_deref(),
                DEFAULT_STREAM_INCLUDE_USAGE,
            ),
            batch_max_concurrency: parse_batch_max_concurrency(
                get_var("BATCH_MAX_CONCURRENCY").as_deref(),
            ),
        }
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            anyhow!(
                "Missing API key. Set one of {} in the environment or a .env file.",
                API_KEY_VARS.join(", ")
            )
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env_with(|_| None)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("model_provider", &self.model_provider)
            .field("model", &self.model)
            .field("model_base_url", &self.model_base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("system_prompt", &self.system_prompt)
            .field("model_timeout_secs", &self.model_timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("stream_include_usage", &self.stream_include_usage)
            .field("batch_max_concurrency", &self.batch_max_concurrency)
            .finish()
    }
}

/// Splits `openai:qwen-plus` into its provider and model parts. Only known
/// providers count as a prefix, so tags like `qwen2.5:3b` stay intact.
pub fn split_model_spec(raw: &str) -> (Option<&'static str>, &str) {
    let raw = raw.trim();
    if let Some((prefix, rest)) = raw.split_once(':') {
        let prefix = prefix.trim().to_ascii_lowercase();
        if let Some(known) = KNOWN_PROVIDERS.iter().find(|known| **known == prefix)
            && !rest.trim().is_empty()
        {
            return (Some(*known), rest.trim());
        }
    }
    (None, raw)
}

fn parse_positive_u64(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn parse_model_timeout_secs(raw: Option<&str>) -> u64 {
    parse_positive_u64(raw, DEFAULT_MODEL_TIMEOUT_SECS)
}

fn parse_batch_max_concurrency(raw: Option<&str>) -> usize {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_BATCH_MAX_CONCURRENCY)
}

fn parse_max_tokens(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|value| *value > 0)
}

fn parse_temperature(raw: Option<&str>) -> Option<f32> {
    raw.and_then(|value| value.trim().parse::<f32>().ok())
        .filter(|value| value.is_finite() && (0.0..=MAX_TEMPERATURE).contains(value))
}

fn parse_bool(raw: Option<&str>, default: bool) -> bool {
    match raw.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}
