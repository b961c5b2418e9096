//! User-visible error text for failed invocations.

use {
    async_trait::async_trait,
    herald_commands::{
        CommandEventSink, DispatchError, Invocation, InvocationReport, PermissionScope, Rejection,
        Trigger,
    },
    tracing::debug,
};

/// What the invoking user sees for `error`. `None` for cancellations.
pub fn render_error(error: &DispatchError) -> Option<String> {
    let text = match error {
        DispatchError::PermissionDenied { scope, missing } => {
            let who = match scope {
                PermissionScope::User => "You are",
                PermissionScope::Bot => "I am",
            };
            format!("{who} missing permissions: {missing}")
        },
        DispatchError::AdmissionRejected(rejection @ Rejection::Cooldown { .. }) => {
            let secs = rejection.retry_after_secs().unwrap_or_default();
            format!("This command is on cooldown. Try again in {secs:.2}s.")
        },
        DispatchError::AdmissionRejected(Rejection::ConcurrencyLimit { .. }) => {
            "This command is already running, wait for it to finish.".to_string()
        },
        DispatchError::Execution { command, source } => {
            format!("Command `{command}` failed: {source:#}")
        },
        DispatchError::Cancelled => return None,
    };
    Some(text)
}

/// Prints rendered errors and unknown command names to stdout.
pub struct ConsoleErrors;

#[async_trait]
impl CommandEventSink for ConsoleErrors {
    async fn command_completion(&self, invocation: &Invocation, report: &InvocationReport) {
        debug!(
            command = invocation.command(),
            deliveries = report.deliveries.len(),
            elapsed_ms = invocation.elapsed().as_millis() as u64,
            "completed"
        );
    }

    async fn command_error(&self, _invocation: &Invocation, error: &DispatchError) {
        if let Some(text) = render_error(error) {
            println!("! {text}");
        }
    }

    async fn command_not_found(&self, _trigger: &Trigger, name: &str) {
        println!("! Unknown command `{name}`.");
    }
}
