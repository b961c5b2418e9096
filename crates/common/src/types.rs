//! Snowflake identifiers for chat-platform entities.
//!
//! Every entity the engine touches (users, channels, guilds, messages) is
//! addressed by a 64-bit snowflake. The newtypes keep them from being mixed
//! up at call sites.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u64>()
                    .map(Self)
                    .map_err(|_| Error::invalid_id($kind, s))
            }
        }
    };
}

snowflake!(
    /// A user account (human or bot).
    UserId,
    "user"
);
snowflake!(
    /// A text channel or DM channel.
    ChannelId,
    "channel"
);
snowflake!(
    /// A guild (server). Absent for direct messages.
    GuildId,
    "guild"
);
snowflake!(
    /// A single message.
    MessageId,
    "message"
);

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_whitespace() {
        assert_eq!(" 42 ".parse::<MessageId>().unwrap(), MessageId(42));
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = "abc".parse::<UserId>().unwrap_err();
        assert_eq!(err.to_string(), "invalid user id: \"abc\"");
    }

    #[test]
    fn serializes_as_bare_number() {
        let json = serde_json::to_string(&ChannelId(7)).unwrap();
        assert_eq!(json, "7");
        let back: ChannelId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ChannelId(7));
    }
}
