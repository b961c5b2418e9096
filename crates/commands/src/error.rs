use std::{fmt, time::Duration};

use {
    herald_channels::PermissionSet,
    herald_common::FromMessage,
    thiserror::Error,
};

use crate::bucket::BucketType;

/// Infrastructure errors: configuration, registration and delivery storage.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Transport(#[from] herald_channels::Error),

    #[error("command name or alias already registered: {name}")]
    DuplicateName { name: String },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName { name: name.into() }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

herald_common::impl_context!();

// ── Dispatch outcome errors ─────────────────────────────────────────────────

/// Whose permissions were insufficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionScope {
    User,
    Bot,
}

impl fmt::Display for PermissionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Bot => f.write_str("bot"),
        }
    }
}

/// Why admission control turned an invocation away.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("on cooldown, retry after {:.2}s", .retry_after.as_secs_f64())]
    Cooldown { retry_after: Duration },

    /// No retry hint: the caller should not retry.
    #[error("too many concurrent invocations (limit {limit} per {bucket})")]
    ConcurrencyLimit { limit: usize, bucket: BucketType },
}

impl Rejection {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cooldown { .. } => "cooldown",
            Self::ConcurrencyLimit { .. } => "concurrency_limit",
        }
    }

    /// Remaining wait in seconds, rounded to two decimals for display.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<f64> {
        match self {
            Self::Cooldown { retry_after } => {
                Some((retry_after.as_secs_f64() * 100.0).round() / 100.0)
            },
            Self::ConcurrencyLimit { .. } => None,
        }
    }
}

/// Terminal failure of a single invocation.
///
/// Permission and admission failures are decided before any handler code
/// runs. Every variant guarantees the concurrency slot was released before
/// the dispatcher returned.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("missing {scope} permissions: {missing}")]
    PermissionDenied {
        scope: PermissionScope,
        missing: PermissionSet,
    },

    #[error(transparent)]
    AdmissionRejected(#[from] Rejection),

    /// The handler, normalization or delivery raised. The original cause is
    /// kept as the error source.
    #[error("command {command} failed: {source}")]
    Execution {
        command: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invocation cancelled")]
    Cancelled,
}

impl DispatchError {
    #[must_use]
    pub fn execution(command: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Execution {
            command: command.into(),
            source: source.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PermissionDenied { .. } => "permission_denied",
            Self::AdmissionRejected(_) => "admission_rejected",
            Self::Execution { .. } => "execution",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, herald_channels::Permission, rstest::rstest};

    #[rstest]
    #[case(Duration::from_millis(1_996), Some(2.0))]
    #[case(Duration::from_millis(1_234), Some(1.23))]
    #[case(Duration::from_millis(5), Some(0.01))]
    fn cooldown_retry_after_rounds_to_two_decimals(
        #[case] retry_after: Duration,
        #[case] expected: Option<f64>,
    ) {
        assert_eq!(
            Rejection::Cooldown { retry_after }.retry_after_secs(),
            expected
        );
    }

    #[test]
    fn concurrency_limit_has_no_retry_hint() {
        let r = Rejection::ConcurrencyLimit {
            limit: 1,
            bucket: BucketType::User,
        };
        assert_eq!(r.retry_after_secs(), None);
        assert_eq!(r.kind(), "concurrency_limit");
    }

    #[test]
    fn permission_denied_lists_missing_names() {
        let err = DispatchError::PermissionDenied {
            scope: PermissionScope::Bot,
            missing: [Permission::AttachFiles, Permission::EmbedLinks].into(),
        };
        assert_eq!(
            err.to_string(),
            "missing bot permissions: embed_links, attach_files"
        );
    }

    #[test]
    fn execution_keeps_original_cause() {
        let cause = std::io::Error::other("disk on fire");
        let err = DispatchError::execution("upload", cause);
        let DispatchError::Execution { source, .. } = &err else {
            panic!("expected execution error");
        };
        assert!(source.downcast_ref::<std::io::Error>().is_some());
        assert_eq!(err.to_string(), "command upload failed: disk on fire");
    }

    #[test]
    fn context_wraps_message() {
        let res: std::result::Result<(), &str> = Err("boom");
        let err = res.context("loading config").unwrap_err();
        assert_eq!(err.to_string(), "loading config: boom");
    }
}
