use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::ops::{Add, AddAssign};

use super::{AiMessage, ToolCall};
use crate::usage::UsageMetadata;

/// Fragment of a tool call; fragments sharing an `index` belong together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallChunk {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub args: String,
}

/// One streamed piece of a model reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AiMessageChunk {
    pub id: Option<String>,
    pub content: String,
    pub tool_call_chunks: Vec<ToolCallChunk>,
    pub usage: Option<UsageMetadata>,
    pub finish_reason: Option<String>,
    pub model: Option<String>,
}

impl AiMessageChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Finalizes accumulated fragments into a complete reply.
    pub fn into_message(self) -> Result<AiMessage> {
        let tool_calls = self
            .tool_call_chunks
            .into_iter()
            .map(|chunk| {
                let name = chunk.name.unwrap_or_default();
                let args = parse_tool_args(&chunk.args).with_context(|| {
                    format!("Model streamed malformed arguments for tool '{name}'")
                })?;
                Ok(ToolCall {
                    id: chunk.id.unwrap_or_default(),
                    name,
                    args,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(AiMessage {
            id: self.id,
            content: self.content,
            tool_calls,
            usage: self.usage,
            finish_reason: self.finish_reason,
            model: self.model,
        })
    }
}

impl AddAssign for AiMessageChunk {
    fn add_assign(&mut self, rhs: Self) {
        if self.id.is_none() {
            self.id = rhs.id;
        }
        if self.model.is_none() {
            self.model = rhs.model;
        }
        self.content.push_str(&rhs.content);

        for incoming in rhs.tool_call_chunks {
            match self
                .tool_call_chunks
                .iter_mut()
                .find(|existing| existing.index == incoming.index)
            {
                Some(existing) => {
                    if existing.id.is_none() {
                        existing.id = incoming.id;
                    }
                    if existing.name.is_none() {
                        existing.name = incoming.name;
                    }
                    existing.args.push_str(&incoming.args);
                }
                None => self.tool_call_chunks.push(incoming),
            }
        }

        self.usage = match (self.usage.take(), rhs.usage) {
            (Some(left), Some(right)) => Some(left + right),
            (left, right) => left.or(right),
        };
        if rhs.finish_reason.is_some() {
            self.finish_reason = rhs.finish_reason;
        }
    }
}

impl Add for AiMessageChunk {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

pub(crate) fn parse_tool_args(raw: &str) -> Result<Map<String, Value>> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    Ok(serde_json::from_str(raw)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{AiMessageChunk, ToolCallChunk};
    use crate::usage::UsageMetadata;

    #[test]
    fn adding_chunks_concatenates_content_and_keeps_first_id() {
        let first = AiMessageChunk {
            id: Some("chatcmpl-1".to_string()),
            ..AiMessageChunk::text("Neural ")
        };
        let second = AiMessageChunk {
            id: Some("chatcmpl-other".to_string()),
            ..AiMessageChunk::text("networks")
        };
        let last = AiMessageChunk {
            finish_reason: Some("stop".to_string()),
            ..AiMessageChunk::default()
        };

        let full = first + second + last;
        assert_eq!(full.content, "Neural networks");
        assert_eq!(full.id.as_deref(), Some("chatcmpl-1"));
        assert_eq!(full.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn tool_call_fragments_merge_by_index() {
        let mut full = AiMessageChunk {
            tool_call_chunks: vec![ToolCallChunk {
                index: 0,
                id: Some("call_1".to_string()),
                name: Some("get_weather".to_string()),
                args: "{\"loca".to_string(),
            }],
            ..AiMessageChunk::default()
        };
        full += AiMessageChunk {
            tool_call_chunks: vec![
                ToolCallChunk {
                    index: 0,
                    args: "tion\": \"Paris\"}".to_string(),
                    ..ToolCallChunk::default()
                },
                ToolCallChunk {
                    index: 1,
                    id: Some("call_2".to_string()),
                    name: Some("current_time".to_string()),
                    args: String::new(),
                },
            ],
            ..AiMessageChunk::default()
        };

        let message = full.into_message().expect("fragments should parse");
        assert_eq!(message.tool_calls.len(), 2);
        assert_eq!(message.tool_calls[0].id, "call_1");
        assert_eq!(message.tool_calls[0].args["location"], json!("Paris"));
        assert_eq!(message.tool_calls[1].name, "current_time");
        assert!(message.tool_calls[1].args.is_empty());
    }

    #[test]
    fn usage_is_summed_across_chunks() {
        let usage = UsageMetadata::new(10, 2);
        let full = AiMessageChunk::text("a")
            + AiMessageChunk {
                usage: Some(usage.clone()),
                ..AiMessageChunk::default()
            }
            + AiMessageChunk {
                usage: Some(UsageMetadata::new(0, 3)),
                ..AiMessageChunk::default()
            };
        let total = full.usage.expect("usage should be present");
        assert_eq!(total.input_tokens, 10);
        assert_eq!(total.output_tokens, 5);
        assert_eq!(total.total_tokens, 15);
    }

    #[test]
    fn malformed_tool_arguments_fail_finalization() {
        let chunk = AiMessageChunk {
            tool_call_chunks: vec![ToolCallChunk {
                index: 0,
                id: Some("call_1".to_string()),
                name: Some("get_weather".to_string()),
                args: "{\"location\":".to_string(),
            }],
            ..AiMessageChunk::default()
        };
        let err = chunk.into_message().expect_err("truncated JSON should fail");
        assert!(format!("{err:#}").contains("get_weather"));
    }
}
