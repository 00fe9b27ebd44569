//! Tutorial walkthroughs, one per chat-model feature.
//!
//! Each walkthrough writes human-readable output to the given writer and
//! calls the model sequentially.

mod batch;
mod chunks;
mod history;
mod invoke;
mod messages;
mod multimodal;
mod raw_stream;
mod stream;
mod structured;
mod tools;
mod usage;

use anyhow::{Result, anyhow, bail};
use futures::TryStreamExt;
use std::io::Write;

use crate::messages::{AiMessageChunk, ModelInput};
use crate::model::ChatModel;

pub use structured::Movie;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Walkthrough {
    pub name: &'static str,
    pub summary: &'static str,
}

pub static CATALOGUE: [Walkthrough; 11] = [
    Walkthrough {
        name: "invoke",
        summary: "single prompt and a multi-turn translation conversation",
    },
    Walkthrough {
        name: "stream",
        summary: "print a reply as it streams, then accumulate chunks",
    },
    Walkthrough {
        name: "chunks",
        summary: "collect, merge and count streamed chunks",
    },
    Walkthrough {
        name: "raw-stream",
        summary: "stream deltas and the trailing usage report",
    },
    Walkthrough {
        name: "batch",
        summary: "answer three questions concurrently, in order",
    },
    Walkthrough {
        name: "messages",
        summary: "system, human and AI messages and their metadata",
    },
    Walkthrough {
        name: "tools",
        summary: "bind get_weather, run the call and feed the result back",
    },
    Walkthrough {
        name: "structured",
        summary: "decode a Movie from the model's reply",
    },
    Walkthrough {
        name: "usage",
        summary: "per-response token usage and tracked totals",
    },
    Walkthrough {
        name: "multimodal",
        summary: "build image, document, audio and video messages (offline)",
    },
    Walkthrough {
        name: "history",
        summary: "three-turn conversation and its message history",
    },
];

pub fn print_catalogue(out: &mut impl Write) -> Result<()> {
    writeln!(out, "usage: chatwalk <walkthrough> | ask <prompt> | chat")?;
    writeln!(out)?;
    writeln!(out, "walkthroughs:")?;
    for walkthrough in &CATALOGUE {
        writeln!(out, "  {:<12} {}", walkthrough.name, walkthrough.summary)?;
    }
    Ok(())
}

/// Looks a walkthrough up by name; unknown names list the valid ones.
pub fn find(name: &str) -> Result<&'static Walkthrough> {
    CATALOGUE
        .iter()
        .find(|walkthrough| walkthrough.name == name)
        .ok_or_else(|| {
            let names: Vec<&str> = CATALOGUE.iter().map(|walkthrough| walkthrough.name).collect();
            anyhow!("Unknown walkthrough '{name}'. Available: {}", names.join(", "))
        })
}

pub async fn run(name: &str, model: &ChatModel, out: &mut impl Write) -> Result<()> {
    match name {
        "invoke" => invoke::run(model, out).await,
        "stream" => stream::run(model, out).await,
        "chunks" => chunks::run(model, out).await,
        "raw-stream" => raw_stream::run(model, out).await,
        "batch" => batch::run(model, out).await,
        "messages" => messages::run(model, out).await,
        "tools" => tools::run(model, out).await,
        "structured" => structured::run(model, out).await,
        "usage" => usage::run(model, out).await,
        "multimodal" => multimodal::run(out),
        "history" => history::run(model, out).await,
        other => {
            let walkthrough = find(other)?;
            bail!("Walkthrough '{}' has no runner", walkthrough.name)
        }
    }
}

/// First `max_chars` characters of `text`, with `...` when cut.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Streams a reply, writing each fragment as it arrives. Returns the merged
/// chunks and how many chunks arrived.
pub(crate) async fn print_stream(
    model: &ChatModel,
    input: impl Into<ModelInput>,
    out: &mut impl Write,
) -> Result<(AiMessageChunk, usize)> {
    let mut chunks = model.stream(input).await?;
    let mut full = AiMessageChunk::default();
    let mut count = 0;
    while let Some(chunk) = chunks.try_next().await? {
        write!(out, "{}", chunk.content)?;
        out.flush()?;
        count += 1;
        full += chunk;
    }
    Ok((full, count))
}

#[cfg(test)]
pub(crate) fn output_of(buf: Vec<u8>) -> String {
    String::from_utf8(buf).expect("walkthrough output should be UTF-8")
}
