use crate::error::{BanneriaError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Social-media canvas presets a banner can be generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizePreset {
    #[default]
    Square,
    Portrait,
    Landscape,
}

impl SizePreset {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "square" => Some(SizePreset::Square),
            "portrait" => Some(SizePreset::Portrait),
            "landscape" => Some(SizePreset::Landscape),
            _ => None,
        }
    }

    /// Unknown or missing names fall back to the square preset.
    pub fn resolve(name: Option<&str>) -> Self {
        name.and_then(Self::from_name).unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SizePreset::Square => "square",
            SizePreset::Portrait => "portrait",
            SizePreset::Landscape => "landscape",
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            SizePreset::Square | SizePreset::Portrait => 1080,
            SizePreset::Landscape => 1280,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            SizePreset::Square => 1080,
            SizePreset::Portrait => 1920,
            SizePreset::Landscape => 720,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SizePreset::Square => "Square (feed post)",
            SizePreset::Portrait => "Vertical (story)",
            SizePreset::Landscape => "Horizontal (video cover)",
        }
    }
}

/// Binary image supplied inline with a request, or sent inline to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl InlineImage {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Parses `data:<mime>;base64,<payload>`. A bare payload is read as PNG.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let (mime_type, payload) = match url.split_once(',') {
            Some((header, payload)) => {
                let mime = header
                    .strip_prefix("data:")
                    .and_then(|rest| rest.split(';').next())
                    .filter(|mime| !mime.is_empty())
                    .unwrap_or("image/png");
                (mime.to_string(), payload)
            }
            None => ("image/png".to_string(), url),
        };

        let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        if cleaned.is_empty() {
            return Err(BanneriaError::RequestError("Empty image payload".into()));
        }

        let data = STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|e| BanneriaError::RequestError(format!("Invalid base64 image: {}", e)))?;

        Ok(Self { mime_type, data })
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

/// Authenticated account making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: String,
    pub email: Option<String>,
    pub is_admin: bool,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            is_admin: false,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }
}

/// Who a generation is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Caller {
    User(UserIdentity),
    Anonymous(String),
    #[default]
    Nobody,
}

impl Caller {
    /// A registered identity wins over an anonymous token when both are sent.
    pub fn from_parts(user: Option<UserIdentity>, anonymous_token: Option<String>) -> Self {
        match (user, anonymous_token) {
            (Some(user), _) => Caller::User(user),
            (None, Some(token)) if !token.trim().is_empty() => Caller::Anonymous(token),
            _ => Caller::Nobody,
        }
    }

    pub fn user(&self) -> Option<&UserIdentity> {
        match self {
            Caller::User(user) => Some(user),
            _ => None,
        }
    }
}

/// One banner generation, built per HTTP call and discarded afterwards.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub briefing: String,
    pub size: SizePreset,
    pub reference_images: Vec<InlineImage>,
    pub logo: Option<InlineImage>,
    pub brand_name: Option<String>,
    pub caller: Caller,
}

impl GenerationRequest {
    pub fn new(briefing: impl Into<String>) -> Self {
        Self {
            briefing: briefing.into(),
            ..Default::default()
        }
    }

    pub fn with_size(mut self, size: SizePreset) -> Self {
        self.size = size;
        self
    }

    pub fn with_reference_image(mut self, image: InlineImage) -> Self {
        self.reference_images.push(image);
        self
    }

    pub fn with_logo(mut self, logo: InlineImage) -> Self {
        self.logo = Some(logo);
        self
    }

    pub fn with_brand_name(mut self, name: impl Into<String>) -> Self {
        self.brand_name = Some(name.into());
        self
    }

    pub fn with_caller(mut self, caller: Caller) -> Self {
        self.caller = caller;
        self
    }

    /// Brand name with surrounding whitespace removed; blank names count as absent.
    pub fn brand_name(&self) -> Option<&str> {
        self.brand_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}
