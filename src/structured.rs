use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use tracing::warn;

use crate::messages::{AiMessage, ModelInput};
use crate::model::ChatModel;
use crate::model_gateway::{ResponseFormat, ToolChoice};
use crate::tools::ToolSpec;

/// A type the model can be asked to produce.
pub trait OutputSchema: DeserializeOwned {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    /// JSON schema of the type's fields.
    fn json_schema() -> Value;

    fn tool_spec() -> ToolSpec {
        ToolSpec::new(Self::NAME, Self::DESCRIPTION, Self::json_schema())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StructuredMethod {
    /// Bind the schema as a tool and force the model to call it.
    #[default]
    FunctionCalling,
    /// Ask for a JSON object reply. Some providers require the prompt to
    /// mention JSON in this mode.
    JsonMode,
}

#[derive(Debug, Clone)]
pub struct StructuredResponse<T> {
    pub raw: AiMessage,
    pub parsed: Option<T>,
    pub parsing_error: Option<String>,
}

pub struct StructuredModel<T> {
    model: ChatModel,
    method: StructuredMethod,
    _output: PhantomData<fn() -> T>,
}

impl<T: OutputSchema> StructuredModel<T> {
    pub(crate) fn new(base: &ChatModel, method: StructuredMethod) -> Self {
        let model = match method {
            StructuredMethod::FunctionCalling => base.with_output_constraint(
                vec![T::tool_spec()],
                Some(ToolChoice::Function(T::NAME.to_string())),
                None,
            ),
            StructuredMethod::JsonMode => {
                base.with_output_constraint(Vec::new(), None, Some(ResponseFormat::JsonObject))
            }
        };
        Self {
            model,
            method,
            _output: PhantomData,
        }
    }

    pub fn method(&self) -> StructuredMethod {
        self.method
    }

    pub async fn invoke(&self, input: impl Into<ModelInput>) -> Result<T> {
        let raw = self.model.invoke(input).await?;
        parse_structured(self.method, &raw)
    }

    /// Returns the raw reply alongside the parse outcome; never fails on a
    /// parse error.
    pub async fn invoke_with_raw(
        &self,
        input: impl Into<ModelInput>,
    ) -> Result<StructuredResponse<T>> {
        let raw = self.model.invoke(input).await?;
        match parse_structured::<T>(self.method, &raw) {
            Ok(parsed) => Ok(StructuredResponse {
                raw,
                parsed: Some(parsed),
                parsing_error: None,
            }),
            Err(err) => {
                warn!(schema = T::NAME, error = %err, "structured output did not parse");
                Ok(StructuredResponse {
                    raw,
                    parsed: None,
                    parsing_error: Some(format!("{err:#}")),
                })
            }
        }
    }
}

fn parse_structured<T: OutputSchema>(method: StructuredMethod, message: &AiMessage) -> Result<T> {
    match method {
        StructuredMethod::FunctionCalling => {
            let call = message
                .tool_calls
                .iter()
                .find(|call| call.name == T::NAME)
                .ok_or_else(|| anyhow!("Model did not call the '{}' output tool", T::NAME))?;
            serde_json::from_value(Value::Object(call.args.clone()))
                .with_context(|| format!("Output tool arguments do not match '{}'", T::NAME))
        }
        StructuredMethod::JsonMode => serde_json::from_str(strip_code_fence(&message.content))
            .with_context(|| format!("Model reply is not valid '{}' JSON", T::NAME)),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
