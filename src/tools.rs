use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::messages::{Message, ToolCall};

pub const GET_WEATHER: &str = "get_weather";
pub const CURRENT_TIME: &str = "current_time";

const WEATHER_TABLE: [(&str, &str); 4] = [
    ("beijing", "Sunny, 22°C"),
    ("shanghai", "Cloudy, 25°C"),
    ("guangzhou", "Rainy, 28°C"),
    ("paris", "Overcast, 18°C"),
];

/// A function the model may call, described by a JSON schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
}

impl ToolOutput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolExecutionError {
    message: String,
}

impl ToolExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ToolExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ToolExecutionError {}

pub type ToolExecutionResult = std::result::Result<ToolOutput, ToolExecutionError>;
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = ToolExecutionResult> + 'a>>;

pub trait ToolRunner {
    fn execute<'a>(&'a self, call: &'a ToolCall) -> ToolFuture<'a>;
}

/// Runs the demo tools shipped with the walkthroughs.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinRunner;

pub fn get_weather_spec() -> ToolSpec {
    ToolSpec::new(
        GET_WEATHER,
        "Get the current weather for a location.",
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "City name, for example Beijing or Paris."
                }
            },
            "required": ["location"]
        }),
    )
}

pub fn current_time_spec() -> ToolSpec {
    ToolSpec::new(
        CURRENT_TIME,
        "Get the current UTC time and unix time in seconds.",
        json!({"type": "object", "properties": {}}),
    )
}

pub fn builtin_specs() -> Vec<ToolSpec> {
    vec![get_weather_spec(), current_time_spec()]
}

pub fn get_weather(location: &str) -> String {
    let key = location.trim().to_lowercase();
    WEATHER_TABLE
        .iter()
        .find(|(city, _)| *city == key)
        .map(|(_, report)| report.to_string())
        .unwrap_or_else(|| format!("Weather for {} is unknown.", location.trim()))
}

fn current_time() -> ToolExecutionResult {
    let now = SystemTime::now();
    let secs = now
        .duration_since(UNIX_EPOCH)
        .map_err(|err| ToolExecutionError::new(format!("{CURRENT_TIME} failed: {err}")))?
        .as_secs();
    let timestamp = DateTime::<Utc>::from(now).to_rfc3339_opts(SecondsFormat::Secs, true);
    Ok(ToolOutput::new(format!("{timestamp} (unix: {secs})")))
}

impl ToolRunner for BuiltinRunner {
    fn execute<'a>(&'a self, call: &'a ToolCall) -> ToolFuture<'a> {
        Box::pin(async move {
            debug!(tool_name = %call.name, tool_call_id = %call.id, "running built-in tool");

            match call.name.as_str() {
                GET_WEATHER => {
                    let location = call.arg_str("location").ok_or_else(|| {
                        ToolExecutionError::new(format!(
                            "{GET_WEATHER} requires a string 'location' argument"
                        ))
                    })?;
                    Ok(ToolOutput::new(get_weather(location)))
                }
                CURRENT_TIME => current_time(),
                _ => {
                    warn!(tool_name = %call.name, "unknown built-in tool");
                    Err(ToolExecutionError::new(format!(
                        "unknown tool '{}'",
                        call.name
                    )))
                }
            }
        })
    }
}

/// Wraps a tool outcome in the tool message that answers `call`.
pub fn tool_result_message(call: &ToolCall, result: ToolExecutionResult) -> Message {
    let content = match result {
        Ok(output) => output.content,
        Err(err) => format!("ERROR: {err}"),
    };
    Message::tool(content, call.id.clone()).with_name(call.name.clone())
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use super::{
        BuiltinRunner, CURRENT_TIME, GET_WEATHER, ToolExecutionError, ToolOutput, ToolRunner,
        builtin_specs, get_weather, tool_result_message,
    };
    use crate::messages::{Role, ToolCall};

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        let args = match args {
            serde_json::Value::Object(map) => map,
            _ => Map::new(),
        };
        ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            args,
        }
    }

    #[test]
    fn get_weather_looks_up_known_cities_case_insensitively() {
        assert_eq!(get_weather("Beijing"), "Sunny, 22°C");
        assert_eq!(get_weather("  PARIS "), "Overcast, 18°C");
        assert_eq!(get_weather("Oslo"), "Weather for Oslo is unknown.");
    }

    #[test]
    fn builtin_specs_describe_object_parameters() {
        let specs = builtin_specs();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, GET_WEATHER);
        assert_eq!(specs[0].parameters["required"], json!(["location"]));
        assert_eq!(specs[1].parameters["type"], json!("object"));
    }

    #[tokio::test]
    async fn execute_get_weather_reads_location_argument() {
        let output = BuiltinRunner
            .execute(&call(GET_WEATHER, json!({"location": "Shanghai"})))
            .await
            .expect("get_weather should work");
        assert_eq!(output.content, "Cloudy, 25°C");
    }

    #[tokio::test]
    async fn execute_get_weather_without_location_is_an_error() {
        let err = BuiltinRunner
            .execute(&call(GET_WEATHER, json!({"city": "Shanghai"})))
            .await
            .expect_err("missing location should fail");
        assert!(err.to_string().contains("location"));
    }

    #[tokio::test]
    async fn execute_current_time_returns_readable_and_unix() {
        let output = BuiltinRunner
            .execute(&call(CURRENT_TIME, json!({})))
            .await
            .expect("current_time should work")
            .content;
        assert!(output.contains('T'));
        assert!(output.contains('Z'));
        assert!(output.contains("(unix: "));
        assert!(output.ends_with(')'));
    }

    #[tokio::test]
    async fn execute_unknown_tool_returns_error() {
        let result = BuiltinRunner.execute(&call("missing.tool", json!({}))).await;
        assert!(result.is_err());
    }

    #[test]
    fn tool_result_message_is_keyed_by_call_id() {
        let call = call(GET_WEATHER, json!({"location": "Paris"}));
        let ok = tool_result_message(&call, Ok(ToolOutput::new("Overcast, 18°C")));
        assert_eq!(ok.role, Role::Tool);
        assert_eq!(ok.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(ok.name.as_deref(), Some(GET_WEATHER));
        assert_eq!(ok.text(), "Overcast, 18°C");

        let failed = tool_result_message(&call, Err(ToolExecutionError::new("boom")));
        assert_eq!(failed.text(), "ERROR: boom");
    }
}
