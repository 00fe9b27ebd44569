use anyhow::{Context, Result};
use std::io::Write;

use crate::messages::{ContentBlock, MediaSource, Message, MessageContent};
use crate::providers::openai::wire_message_json;

fn block_json(block: &ContentBlock) -> Result<String> {
    serde_json::to_string(block).context("Failed to encode content block")
}

pub(super) fn run(out: &mut impl Write) -> Result<()> {
    writeln!(out, "Multimodal message structures (no request is sent)")?;
    writeln!(out)?;

    writeln!(out, "1. Image input")?;
    let image_url = Message::user(vec![
        ContentBlock::text("Describe the content of this image."),
        ContentBlock::Image(MediaSource::url("https://example.com/path/to/image.jpg")),
    ]);
    writeln!(out, "from URL:")?;
    writeln!(
        out,
        "  {}",
        serde_json::to_string(&image_url.content).context("Failed to encode message content")?
    )?;
    let image_inline = ContentBlock::Image(MediaSource::base64(
        "iVBORw0KGgoAAAANSUhEUgAAAAUA...",
        "image/jpeg",
    ));
    writeln!(out, "from base64:")?;
    writeln!(out, "  type: {}", image_inline.kind())?;
    writeln!(
        out,
        "  mime: {}",
        image_inline
            .source()
            .and_then(MediaSource::mime_type)
            .unwrap_or("-")
    )?;
    writeln!(out)?;

    writeln!(out, "2. PDF document input")?;
    let pdf = Message::user(vec![
        ContentBlock::text("Summarize the main points of this document."),
        ContentBlock::File(MediaSource::url("https://example.com/document.pdf")),
    ]);
    writeln!(
        out,
        "  {}",
        serde_json::to_string(&pdf).context("Failed to encode message")?
    )?;
    writeln!(out)?;

    writeln!(out, "3. Audio input")?;
    let audio = vec![
        ContentBlock::text("Transcribe this audio."),
        ContentBlock::Audio(MediaSource::base64("//uQxAAAAAAAAAAAAAAASW5mbw...", "audio/wav")),
    ];
    writeln!(out, "  {} content blocks", audio.len())?;
    writeln!(out, "  audio block: {}", block_json(&audio[1])?)?;
    writeln!(out)?;

    writeln!(out, "4. Video input")?;
    let video = ContentBlock::Video(MediaSource::base64("AAAAIGZ0eXBtcDQyAAAAAGlzb2...", "video/mp4"));
    writeln!(
        out,
        "  video type: {}",
        video.source().and_then(MediaSource::mime_type).unwrap_or("-")
    )?;
    writeln!(out)?;

    writeln!(out, "5. Mixed content")?;
    let mixed = Message::user(vec![
        ContentBlock::text("Analyze the following:"),
        ContentBlock::Image(MediaSource::url("https://example.com/chart.png")),
        ContentBlock::text("What trend does this chart show?"),
        ContentBlock::File(MediaSource::url("https://example.com/data.pdf")),
    ]);
    if let MessageContent::Blocks(blocks) = &mixed.content {
        writeln!(out, "  {} content blocks:", blocks.len())?;
        for (i, block) in blocks.iter().enumerate() {
            writeln!(out, "    {}. {}", i + 1, block.kind())?;
        }
    }
    writeln!(out)?;

    writeln!(out, "6. Chat-completion wire form")?;
    let wire = wire_message_json(&image_url)?;
    writeln!(
        out,
        "{}",
        serde_json::to_string_pretty(&wire).context("Failed to encode wire message")?
    )?;
    let video_message = Message::user(vec![ContentBlock::text("Describe this video."), video]);
    if let Err(err) = wire_message_json(&video_message) {
        writeln!(out, "inline video is not sendable: {err}")?;
    }

    writeln!(out)?;
    writeln!(out, "{}", "=".repeat(50))?;
    writeln!(out, "Not every model accepts every content type.")?;
    writeln!(out, "qwen-plus mainly supports text and images; check the model documentation for others.")?;
    Ok(())
}
