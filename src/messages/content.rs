use serde::{Deserialize, Serialize};

/// Where a media block's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaSource {
    Url { url: String },
    Base64 { base64: String, mime_type: String },
}

impl MediaSource {
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url { url: url.into() }
    }

    pub fn base64(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Base64 {
            base64: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn mime_type(&self) -> Option<&str> {
        match self {
            Self::Url { .. } => None,
            Self::Base64 { mime_type, .. } => Some(mime_type),
        }
    }

    /// `data:` URI for inline payloads, the plain URL otherwise.
    pub fn to_uri(&self) -> String {
        match self {
            Self::Url { url } => url.clone(),
            Self::Base64 { base64, mime_type } => format!("data:{mime_type};base64,{base64}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Image(MediaSource),
    File(MediaSource),
    Audio(MediaSource),
    Video(MediaSource),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image(_) => "image",
            Self::File(_) => "file",
            Self::Audio(_) => "audio",
            Self::Video(_) => "video",
        }
    }

    pub fn source(&self) -> Option<&MediaSource> {
        match self {
            Self::Text { .. } => None,
            Self::Image(source) | Self::File(source) | Self::Audio(source) | Self::Video(source) => {
                Some(source)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Plain text, or the text blocks joined in order.
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Blocks(blocks) => blocks.is_empty(),
        }
    }
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<ContentBlock>> for MessageContent {
    fn from(value: Vec<ContentBlock>) -> Self {
        Self::Blocks(value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ContentBlock, MediaSource, MessageContent};

    #[test]
    fn blocks_serialize_with_type_discriminator() {
        let blocks = vec![
            ContentBlock::text("Describe this image."),
            ContentBlock::Image(MediaSource::url("https://example.com/cat.jpg")),
            ContentBlock::Audio(MediaSource::base64("AAAA", "audio/wav")),
        ];

        let value = serde_json::to_value(&blocks).expect("blocks should serialize");
        assert_eq!(
            value,
            json!([
                {"type": "text", "text": "Describe this image."},
                {"type": "image", "url": "https://example.com/cat.jpg"},
                {"type": "audio", "base64": "AAAA", "mime_type": "audio/wav"},
            ])
        );
    }

    #[test]
    fn blocks_deserialize_from_dictionary_form() {
        let block: ContentBlock = serde_json::from_value(json!({
            "type": "video",
            "base64": "AAAAIGZ0eXA",
            "mime_type": "video/mp4",
        }))
        .expect("video block should parse");

        assert_eq!(block.kind(), "video");
        assert_eq!(
            block.source().and_then(MediaSource::mime_type),
            Some("video/mp4")
        );
    }

    #[test]
    fn text_joins_only_text_blocks() {
        let content = MessageContent::Blocks(vec![
            ContentBlock::text("Analyse this: "),
            ContentBlock::File(MediaSource::url("https://example.com/data.pdf")),
            ContentBlock::text("what is the trend?"),
        ]);
        assert_eq!(content.text(), "Analyse this: what is the trend?");
    }

    #[test]
    fn inline_source_renders_data_uri() {
        let source = MediaSource::base64("iVBORw0KGgo", "image/png");
        assert_eq!(source.to_uri(), "data:image/png;base64,iVBORw0KGgo");
        assert_eq!(MediaSource::url("https://x.test/a.png").to_uri(), "https://x.test/a.png");
    }
}
