use foundation::bounds::LngLat;
use serde::{Deserialize, Serialize};

pub type PinoryId = String;
pub type UserId = String;

/// Maximum length of a pinory note, in characters.
pub const MAX_CONTENT_CHARS: usize = 280;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinoryType {
    #[default]
    Own,
    Friend,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Creator {
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            email: None,
            image: None,
        }
    }

    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.image = Some(url.into());
        self
    }

    /// Name if set, otherwise email.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.email.as_deref())
    }
}

/// A location memory as delivered by the location-notes API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pinory {
    pub id: PinoryId,
    #[serde(alias = "longitude")]
    pub lng: f64,
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image_index: Option<usize>,
    #[serde(default)]
    pub pinory_type: PinoryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<Creator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    ContentTooLong { chars: usize },
    InvalidPosition { lng: f64, lat: f64 },
    MissingCreator,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::ContentTooLong { chars } => {
                write!(f, "content is {chars} chars, limit is {MAX_CONTENT_CHARS}")
            }
            ValidationError::InvalidPosition { lng, lat } => {
                write!(f, "invalid position: lng={lng} lat={lat}")
            }
            ValidationError::MissingCreator => write!(f, "friend pinory has no creator"),
        }
    }
}

impl std::error::Error for ValidationError {}

impl Pinory {
    pub fn new(id: impl Into<PinoryId>, lng: f64, lat: f64) -> Self {
        Self {
            id: id.into(),
            lng,
            lat,
            address: String::new(),
            content: None,
            mood: None,
            category: None,
            images: Vec::new(),
            cover_image_index: None,
            pinory_type: PinoryType::Own,
            creator: None,
            timestamp: None,
            created_at: None,
        }
    }

    pub fn friend(id: impl Into<PinoryId>, lng: f64, lat: f64, creator: Creator) -> Self {
        Self {
            pinory_type: PinoryType::Friend,
            creator: Some(creator),
            ..Self::new(id, lng, lat)
        }
    }

    pub fn with_images<I, S>(mut self, images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.images = images.into_iter().map(Into::into).collect();
        self
    }

    pub fn position(&self) -> LngLat {
        LngLat::new(self.lng, self.lat)
    }

    pub fn is_friend(&self) -> bool {
        self.pinory_type == PinoryType::Friend
    }

    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }

    /// `cover_image_index` when it points into `images`, else 0.
    pub fn cover_index(&self) -> usize {
        match self.cover_image_index {
            Some(i) if i < self.images.len() => i,
            _ => 0,
        }
    }

    pub fn primary_image(&self) -> Option<&str> {
        self.images.get(self.cover_index()).map(String::as_str)
    }

    pub fn avatar(&self) -> Option<&str> {
        self.creator.as_ref().and_then(|c| c.image.as_deref())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.position().is_valid() {
            return Err(ValidationError::InvalidPosition {
                lng: self.lng,
                lat: self.lat,
            });
        }
        if let Some(content) = &self.content {
            let chars = content.chars().count();
            if chars > MAX_CONTENT_CHARS {
                return Err(ValidationError::ContentTooLong { chars });
            }
        }
        if self.is_friend() && self.creator.is_none() {
            return Err(ValidationError::MissingCreator);
        }
        Ok(())
    }
}

/// Client-side pinory filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinoryFilter {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub pinory_type: Option<PinoryType>,
}

impl PinoryFilter {
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.mood.is_none() && self.pinory_type.is_none()
    }

    pub fn matches(&self, p: &Pinory) -> bool {
        if let Some(category) = &self.category
            && p.category.as_ref() != Some(category)
        {
            return false;
        }
        if let Some(mood) = &self.mood
            && p.mood.as_ref() != Some(mood)
        {
            return false;
        }
        if let Some(kind) = self.pinory_type
            && p.pinory_type != kind
        {
            return false;
        }
        true
    }

    pub fn apply(&self, pinories: &[Pinory]) -> Vec<Pinory> {
        pinories.iter().filter(|p| self.matches(p)).cloned().collect()
    }
}
