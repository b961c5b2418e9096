use herald_common::{ChannelId, GuildId, MessageId, UserId};

/// Inbound message that may start an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    /// Absent for direct messages.
    pub guild_id: Option<GuildId>,
    pub author_id: UserId,
    pub content: String,
    /// This delivery is an edit of a message the bot may already have
    /// answered.
    pub edited: bool,
}

impl Trigger {
    #[must_use]
    pub fn new(
        message_id: impl Into<MessageId>,
        channel_id: impl Into<ChannelId>,
        author_id: impl Into<UserId>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            channel_id: channel_id.into(),
            guild_id: None,
            author_id: author_id.into(),
            content: content.into(),
            edited: false,
        }
    }

    #[must_use]
    pub fn in_guild(mut self, guild_id: impl Into<GuildId>) -> Self {
        self.guild_id = Some(guild_id.into());
        self
    }

    /// Mark the trigger as re-delivered after the author edited it.
    pub fn edit(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.edited = true;
    }
}

/// What a handler sees about the invocation it serves.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub trigger: Trigger,
    /// Canonical name of the resolved command.
    pub command: String,
    /// The name or alias the user typed.
    pub invoked_with: String,
    /// Raw argument text after the command name, trimmed.
    pub args: String,
}

impl InvocationContext {
    #[must_use]
    pub fn author(&self) -> UserId {
        self.trigger.author_id
    }

    #[must_use]
    pub fn channel(&self) -> ChannelId {
        self.trigger.channel_id
    }

    #[must_use]
    pub fn guild(&self) -> Option<GuildId> {
        self.trigger.guild_id
    }

    #[must_use]
    pub fn trigger_id(&self) -> MessageId {
        self.trigger.message_id
    }

    /// Whitespace-separated arguments.
    pub fn arg_list(&self) -> impl Iterator<Item = &str> {
        self.args.split_whitespace()
    }
}
