use std::fmt;

use {
    herald_common::{ChannelId, GuildId, MessageId, UserId},
    serde::{Deserialize, Serialize},
};

use crate::context::Trigger;

/// How invocations are grouped for cooldowns and concurrency gates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketType {
    /// One bucket shared by everybody.
    Global,
    /// Per invoking user.
    #[default]
    User,
    /// Per guild; direct messages fall back to the user.
    Guild,
    /// Per channel.
    Channel,
    /// Per user within a guild.
    Member,
    /// Per trigger message id and content. Repeating the same text in the
    /// same message (edit spam) hits the same bucket.
    Message,
}

impl BucketType {
    #[must_use]
    pub fn key(self, trigger: &Trigger) -> BucketKey {
        match self {
            Self::Global => BucketKey::Global,
            Self::User => BucketKey::User(trigger.author_id),
            Self::Guild => match trigger.guild_id {
                Some(guild) => BucketKey::Guild(guild),
                None => BucketKey::User(trigger.author_id),
            },
            Self::Channel => BucketKey::Channel(trigger.channel_id),
            Self::Member => BucketKey::Member(trigger.guild_id, trigger.author_id),
            Self::Message => BucketKey::Message(trigger.message_id, trigger.content.clone()),
        }
    }
}

impl fmt::Display for BucketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Global => "global",
            Self::User => "user",
            Self::Guild => "guild",
            Self::Channel => "channel",
            Self::Member => "member",
            Self::Message => "message",
        };
        f.write_str(s)
    }
}

/// Concrete bucket a trigger falls into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BucketKey {
    Global,
    User(UserId),
    Guild(GuildId),
    Channel(ChannelId),
    Member(Option<GuildId>, UserId),
    Message(MessageId, String),
}
