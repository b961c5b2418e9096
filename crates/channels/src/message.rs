use {
    herald_common::{MessageId, UserId},
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

/// Transport-ready description of a single outgoing message.
///
/// Produced by the output normalizer; the transport decides how each field is
/// rendered on the platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub rich_content: Option<RichContent>,
    pub attachment: Option<Attachment>,
    pub components: Vec<Component>,
    /// Send as a reply referencing the trigger message.
    pub use_reply: bool,
    /// Oversized content is moved to a paste before delivery.
    pub safe_send: bool,
    /// The invoking user gets a delete affordance on the message.
    pub deletable: bool,
    /// Message this one replies to. Filled in by the engine when `use_reply`
    /// is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<MessageId>,
    /// Override keys the engine does not interpret, passed through untouched.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl OutgoingMessage {
    /// Plain text message.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// True when there is nothing a transport could render.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.as_deref().is_none_or(str::is_empty)
            && self.rich_content.is_none()
            && self.attachment.is_none()
            && self.components.is_empty()
            && self.extra.is_empty()
    }

    /// The delete affordance owner, if one is attached.
    #[must_use]
    pub fn delete_owner(&self) -> Option<UserId> {
        self.components.iter().find_map(|c| match c {
            Component::DeleteButton { owner } => Some(*owner),
            _ => None,
        })
    }
}

/// Rich content block (title/description/fields). Opaque to the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RichContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<RichField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl RichContent {
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(RichField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// A file uploaded alongside the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Attachment {
    #[must_use]
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
            description: None,
        }
    }
}

/// Interactive component attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Component {
    /// Button that fires an interaction carrying `custom_id`.
    Button { label: String, custom_id: String },
    /// Button that opens a URL.
    Link { label: String, url: String },
    /// Deletes the message it is attached to. Only `owner` may press it.
    DeleteButton { owner: UserId },
}
