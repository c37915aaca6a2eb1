use super::request::InlineImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;

/// Modality the caller expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputKind {
    #[default]
    Image,
    Text,
}

/// What a generative model receives for one attempt.
#[derive(Debug, Clone, Default)]
pub struct ModelInput {
    pub prompt: String,
    pub images: Vec<InlineImage>,
    pub output: OutputKind,
}

impl ModelInput {
    pub fn image(prompt: impl Into<String>, images: Vec<InlineImage>) -> Self {
        Self {
            prompt: prompt.into(),
            images,
            output: OutputKind::Image,
        }
    }

    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            images: Vec::new(),
            output: OutputKind::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePart {
    InlineData {
        mime_type: Option<String>,
        data: Vec<u8>,
    },
    Text(String),
}

/// Raw provider output, before any image is located in it.
#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub model: String,
    pub parts: Vec<ResponsePart>,
}

impl ModelResponse {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            parts: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(ResponsePart::Text(text.into()));
        self
    }

    pub fn with_inline_data(mut self, mime_type: Option<&str>, data: Vec<u8>) -> Self {
        self.parts.push(ResponsePart::InlineData {
            mime_type: mime_type.map(String::from),
            data,
        });
        self
    }

    /// All text parts joined in order.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ResponsePart::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// A generated banner. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub mime_type: String,
    pub data: Vec<u8>,
    pub model: String,
}

impl Artifact {
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    pub display_name: Option<String>,
    pub supported_methods: Vec<String>,
}
