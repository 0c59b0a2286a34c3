//! Content blocks returned from tool calls.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTextContent {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text(RawTextContent),
}

impl Content {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Content::Text(RawTextContent { text: text.into() })
    }

    /// Pretty-print a JSON payload into a text block.
    pub fn json(value: &serde_json::Value) -> Result<Self, crate::ErrorData> {
        let text = serde_json::to_string_pretty(value).map_err(|e| {
            crate::ErrorData::internal_error(
                "fail to serialize response to json",
                Some(serde_json::json!({ "reason": e.to_string() })),
            )
        })?;
        Ok(Content::text(text))
    }

    /// Get the text content if this is a text block
    pub fn as_text(&self) -> Option<&RawTextContent> {
        match self {
            Content::Text(text) => Some(text),
        }
    }
}
