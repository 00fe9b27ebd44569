//! In-process gateways for exercising model-level code without a network.

use anyhow::{Result, anyhow, bail};
use futures::{StreamExt, stream};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::messages::{AiMessage, AiMessageChunk, ToolCall, ToolCallChunk};
use crate::model_gateway::{ChatRequest, ChunkStream, GatewayFuture, ModelGateway};
use crate::usage::UsageMetadata;

pub(crate) fn text_reply(content: &str) -> AiMessage {
    AiMessage {
        id: Some("chatcmpl-test".to_string()),
        content: content.to_string(),
        usage: Some(UsageMetadata::new(10, 5)),
        finish_reason: Some("stop".to_string()),
        ..AiMessage::default()
    }
}

pub(crate) fn tool_reply(id: &str, name: &str, args: Value) -> AiMessage {
    let args = match args {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    AiMessage {
        tool_calls: vec![ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            args,
        }],
        finish_reason: Some("tool_calls".to_string()),
        ..text_reply("")
    }
}

/// Splits a reply into the fragments a streaming endpoint would send.
fn into_chunks(reply: AiMessage) -> Vec<AiMessageChunk> {
    let mut chunks: Vec<AiMessageChunk> = reply
        .content
        .split_inclusive(' ')
        .map(|piece| AiMessageChunk {
            id: reply.id.clone(),
            ..AiMessageChunk::text(piece)
        })
        .collect();

    for (index, call) in reply.tool_calls.iter().enumerate() {
        let args = call.args_json();
        let mid = (0..=args.len() / 2)
            .rev()
            .find(|at| args.is_char_boundary(*at))
            .unwrap_or(0);
        let (head, tail) = args.split_at(mid);
        chunks.push(AiMessageChunk {
            tool_call_chunks: vec![ToolCallChunk {
                index,
                id: Some(call.id.clone()),
                name: Some(call.name.clone()),
                args: head.to_string(),
            }],
            ..AiMessageChunk::default()
        });
        chunks.push(AiMessageChunk {
            tool_call_chunks: vec![ToolCallChunk {
                index,
                args: tail.to_string(),
                ..ToolCallChunk::default()
            }],
            ..AiMessageChunk::default()
        });
    }

    chunks.push(AiMessageChunk {
        finish_reason: reply.finish_reason,
        ..AiMessageChunk::default()
    });
    chunks.push(AiMessageChunk {
        usage: reply.usage,
        ..AiMessageChunk::default()
    });
    chunks
}

/// Answers each call with the next scripted reply and records the request.
#[derive(Debug, Default)]
pub(crate) struct ScriptedGateway {
    replies: Mutex<VecDeque<AiMessage>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedGateway {
    pub(crate) fn new(replies: impl IntoIterator<Item = AiMessage>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .expect("requests lock should not be poisoned")
            .clone()
    }

    fn next_reply(&self, request: &ChatRequest) -> Result<AiMessage> {
        self.requests
            .lock()
            .expect("requests lock should not be poisoned")
            .push(request.clone());
        self.replies
            .lock()
            .expect("replies lock should not be poisoned")
            .pop_front()
            .ok_or_else(|| anyhow!("scripted gateway has no replies left"))
    }
}

impl ModelGateway for ScriptedGateway {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> GatewayFuture<'a, AiMessage> {
        let reply = self.next_reply(request);
        Box::pin(async move { reply })
    }

    fn stream<'a>(&'a self, request: &'a ChatRequest) -> GatewayFuture<'a, ChunkStream> {
        let reply = self.next_reply(request);
        Box::pin(async move {
            let chunks = into_chunks(reply?);
            Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
        })
    }
}

/// Replies `echo: <last message text>`; refuses inputs mentioning "fail".
#[derive(Debug, Default)]
pub(crate) struct EchoGateway;

impl EchoGateway {
    fn reply(request: &ChatRequest) -> Result<AiMessage> {
        let last = request
            .messages
            .last()
            .map(|message| message.text())
            .unwrap_or_default();
        if last.contains("fail") {
            bail!("echo gateway refused '{last}'");
        }
        Ok(text_reply(&format!("echo: {last}")))
    }
}

impl ModelGateway for EchoGateway {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> GatewayFuture<'a, AiMessage> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            Self::reply(request)
        })
    }

    fn stream<'a>(&'a self, request: &'a ChatRequest) -> GatewayFuture<'a, ChunkStream> {
        Box::pin(async move {
            let chunks = into_chunks(Self::reply(request)?);
            Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
        })
    }
}
