//! Handler results and their normalization into [`OutgoingMessage`].

use std::sync::Arc;

use {
    herald_channels::{Attachment, Component, OutgoingMessage, RichContent},
    serde_json::{Map, Value},
    tracing::warn,
};

use crate::{context::Trigger, error::Result, paste::Paste};

/// Default inline length limit for safe sends, in characters.
pub const SAFE_SEND_LIMIT: usize = 2000;

/// One tagged piece of a handler result.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputPart {
    Text(String),
    Rich(RichContent),
    File(Attachment),
    Component(Component),
    /// Raw field overrides, applied after every other part.
    Override(Map<String, Value>),
    Reply,
    SafeSend,
    Deletable,
}

impl From<&str> for OutputPart {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OutputPart {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<RichContent> for OutputPart {
    fn from(value: RichContent) -> Self {
        Self::Rich(value)
    }
}

impl From<Attachment> for OutputPart {
    fn from(value: Attachment) -> Self {
        Self::File(value)
    }
}

impl From<Component> for OutputPart {
    fn from(value: Component) -> Self {
        Self::Component(value)
    }
}

impl From<Map<String, Value>> for OutputPart {
    fn from(value: Map<String, Value>) -> Self {
        Self::Override(value)
    }
}

/// An ordered tuple of parts combined into one outgoing message. Empty means
/// nothing is sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Output(Vec<OutputPart>);

impl Output {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, part: impl Into<OutputPart>) -> Self {
        self.0.push(part.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn parts(&self) -> &[OutputPart] {
        &self.0
    }

    /// True when any part uploads a file. Overrides are not inspected.
    #[must_use]
    pub fn has_attachment(&self) -> bool {
        self.0.iter().any(|p| matches!(p, OutputPart::File(_)))
    }
}

macro_rules! output_from_part {
    ($($ty:ty),+) => {
        $(impl From<$ty> for Output {
            fn from(value: $ty) -> Self {
                Self(vec![value.into()])
            }
        })+
    };
}

output_from_part!(
    OutputPart,
    &str,
    String,
    RichContent,
    Attachment,
    Component
);

impl From<Vec<OutputPart>> for Output {
    fn from(value: Vec<OutputPart>) -> Self {
        Self(value)
    }
}

impl From<Option<Output>> for Output {
    fn from(value: Option<Output>) -> Self {
        value.unwrap_or_default()
    }
}

macro_rules! output_from_tuple {
    ($($name:ident),+) => {
        impl<$($name: Into<OutputPart>),+> From<($($name,)+)> for Output {
            #[allow(non_snake_case)]
            fn from(($($name,)+): ($($name,)+)) -> Self {
                Self(vec![$($name.into()),+])
            }
        }
    };
}

output_from_tuple!(A, B);
output_from_tuple!(A, B, C);
output_from_tuple!(A, B, C, D);
output_from_tuple!(A, B, C, D, E);

/// Turns [`Output`] into transport-ready messages.
#[derive(Clone)]
pub struct Normalizer {
    paste: Option<Arc<dyn Paste>>,
    limit: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(SAFE_SEND_LIMIT)
    }
}

impl Normalizer {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self { paste: None, limit }
    }

    #[must_use]
    pub fn with_paste(mut self, paste: Arc<dyn Paste>) -> Self {
        self.paste = Some(paste);
        self
    }

    /// Fold the parts into a message. Later parts win over earlier ones for
    /// the same field; components accumulate; overrides are applied last.
    ///
    /// Returns `None` when there is nothing to render.
    pub fn collect(output: Output) -> Result<Option<OutgoingMessage>> {
        let mut message = OutgoingMessage::default();
        let mut overrides = Vec::new();

        for part in output.0 {
            match part {
                OutputPart::Text(text) => message.content = Some(text),
                OutputPart::Rich(rich) => message.rich_content = Some(rich),
                OutputPart::File(file) => message.attachment = Some(file),
                OutputPart::Component(component) => message.components.push(component),
                OutputPart::Override(map) => overrides.push(map),
                OutputPart::Reply => message.use_reply = true,
                OutputPart::SafeSend => message.safe_send = true,
                OutputPart::Deletable => message.deletable = true,
            }
        }
        for map in overrides {
            apply_overrides(&mut message, map)?;
        }

        Ok((!message.is_empty()).then_some(message))
    }

    /// [`Normalizer::collect`], then resolve the control flags against the
    /// trigger: reply reference, safe-send paste and the delete affordance.
    pub async fn normalize(
        &self,
        output: Output,
        trigger: &Trigger,
    ) -> Result<Option<OutgoingMessage>> {
        let Some(mut message) = Self::collect(output)? else {
            return Ok(None);
        };

        if message.use_reply {
            message.reference = Some(trigger.message_id);
        }

        if message.safe_send
            && let Some(content) = message.content.take()
        {
            message.content = Some(self.shorten(content).await);
        }

        if message.deletable && message.delete_owner().is_none() {
            message.components.push(Component::DeleteButton {
                owner: trigger.author_id,
            });
        }

        Ok(Some(message))
    }

    async fn shorten(&self, content: String) -> String {
        if content.chars().count() <= self.limit {
            return content;
        }
        if let Some(paste) = &self.paste {
            match paste.paste(&content).await {
                Ok(reference) => return reference,
                Err(e) => warn!(error = %e, "paste failed, truncating content"),
            }
        }
        crate::paste::cutoff(&content, self.limit)
    }
}

fn apply_overrides(message: &mut OutgoingMessage, overrides: Map<String, Value>) -> Result<()> {
    for (key, value) in overrides {
        match key.as_str() {
            "content" => message.content = serde_json::from_value(value)?,
            "rich_content" => message.rich_content = serde_json::from_value(value)?,
            "attachment" => message.attachment = serde_json::from_value(value)?,
            "components" => message.components = serde_json::from_value(value)?,
            "use_reply" => message.use_reply = serde_json::from_value(value)?,
            "safe_send" => message.safe_send = serde_json::from_value(value)?,
            "deletable" => message.deletable = serde_json::from_value(value)?,
            _ => {
                message.extra.insert(key, value);
            },
        }
    }
    Ok(())
}
