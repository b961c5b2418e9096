//! Metric name and label definitions.

/// Command dispatch metrics
pub mod commands {
    /// Total number of invocations that resolved to a registered command
    pub const INVOKED_TOTAL: &str = "herald_commands_invoked_total";
    /// Invocations whose handler ran to completion
    pub const COMPLETED_TOTAL: &str = "herald_commands_completed_total";
    /// Invocations that failed (labelled by error kind)
    pub const FAILED_TOTAL: &str = "herald_commands_failed_total";
    /// Invocations turned away by admission control (labelled by kind)
    pub const REJECTED_TOTAL: &str = "herald_commands_rejected_total";
    /// Invocations cancelled while running
    pub const CANCELLED_TOTAL: &str = "herald_commands_cancelled_total";
    /// Wall time from admission to settlement in seconds
    pub const DURATION_SECONDS: &str = "herald_command_duration_seconds";
    /// Number of currently running invocations
    pub const IN_FLIGHT: &str = "herald_commands_in_flight";
}

/// Delivery metrics
pub mod delivery {
    /// Messages sent in response to triggers
    pub const MESSAGES_SENT_TOTAL: &str = "herald_delivery_messages_sent_total";
    /// Prior replies edited in place
    pub const MESSAGES_EDITED_TOTAL: &str = "herald_delivery_messages_edited_total";
    /// Messages removed by cascade deletion
    pub const MESSAGES_DELETED_TOTAL: &str = "herald_delivery_messages_deleted_total";
}

/// Common label keys
pub mod labels {
    pub const COMMAND: &str = "command";
    pub const KIND: &str = "kind";
}
