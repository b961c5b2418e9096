use std::{collections::BTreeSet, fmt};

use {
    herald_common::{ChannelId, GuildId, UserId},
    serde::{Deserialize, Serialize},
};

/// A single channel-level permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewChannel,
    SendMessages,
    EmbedLinks,
    AttachFiles,
    AddReactions,
    ReadMessageHistory,
    ManageMessages,
    UseExternalEmojis,
}

impl Permission {
    pub const ALL: &'static [Permission] = &[
        Self::ViewChannel,
        Self::SendMessages,
        Self::EmbedLinks,
        Self::AttachFiles,
        Self::AddReactions,
        Self::ReadMessageHistory,
        Self::ManageMessages,
        Self::UseExternalEmojis,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ViewChannel => "view_channel",
            Self::SendMessages => "send_messages",
            Self::EmbedLinks => "embed_links",
            Self::AttachFiles => "attach_files",
            Self::AddReactions => "add_reactions",
            Self::ReadMessageHistory => "read_message_history",
            Self::ManageMessages => "manage_messages",
            Self::UseExternalEmojis => "use_external_emojis",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered set of permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn all() -> Self {
        Permission::ALL.iter().copied().collect()
    }

    #[must_use]
    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    pub fn insert(&mut self, permission: Permission) -> bool {
        self.0.insert(permission)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Permissions in `required` that this set does not grant.
    #[must_use]
    pub fn missing(&self, required: &PermissionSet) -> PermissionSet {
        PermissionSet(required.0.difference(&self.0).copied().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Permission; N]> for PermissionSet {
    fn from(value: [Permission; N]) -> Self {
        value.into_iter().collect()
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|p| p.as_str()).collect();
        f.write_str(&names.join(", "))
    }
}

/// Read-only view of effective permissions in a channel.
///
/// Lookups must not mutate shared state; they are called synchronously from
/// the permission check chain.
pub trait PermissionSource: Send + Sync {
    /// Effective permissions of `user` in `channel`.
    fn user_permissions(
        &self,
        guild: Option<GuildId>,
        channel: ChannelId,
        user: UserId,
    ) -> PermissionSet;

    /// Effective permissions of the bot itself in `channel`.
    fn bot_permissions(&self, guild: Option<GuildId>, channel: ChannelId) -> PermissionSet;
}

/// Fixed permission sets, independent of channel. Useful for local harnesses
/// and tests.
#[derive(Debug, Clone)]
pub struct StaticPermissions {
    pub user: PermissionSet,
    pub bot: PermissionSet,
}

impl StaticPermissions {
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            user: PermissionSet::all(),
            bot: PermissionSet::all(),
        }
    }
}

impl Default for StaticPermissions {
    fn default() -> Self {
        Self::allow_all()
    }
}

impl PermissionSource for StaticPermissions {
    fn user_permissions(
        &self,
        _guild: Option<GuildId>,
        _channel: ChannelId,
        _user: UserId,
    ) -> PermissionSet {
        self.user.clone()
    }

    fn bot_permissions(&self, _guild: Option<GuildId>, _channel: ChannelId) -> PermissionSet {
        self.bot.clone()
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn missing_lists_only_absent_permissions() {
        let granted = PermissionSet::from([Permission::SendMessages]);
        let required = PermissionSet::from([
            Permission::SendMessages,
            Permission::AttachFiles,
            Permission::EmbedLinks,
        ]);
        let missing = granted.missing(&required);
        assert_eq!(
            missing,
            PermissionSet::from([Permission::EmbedLinks, Permission::AttachFiles])
        );
        assert_eq!(missing.to_string(), "embed_links, attach_files");
    }

    #[test]
    fn all_grants_everything() {
        let required = PermissionSet::from([Permission::ManageMessages]);
        assert!(PermissionSet::all().missing(&required).is_empty());
    }

    #[rstest]
    #[case(Permission::SendMessages, "\"send_messages\"")]
    #[case(Permission::ReadMessageHistory, "\"read_message_history\"")]
    fn permission_serde_name_matches_display(#[case] perm: Permission, #[case] json: &str) {
        assert_eq!(serde_json::to_string(&perm).ok().as_deref(), Some(json));
        assert_eq!(format!("\"{perm}\""), json);
    }
}
