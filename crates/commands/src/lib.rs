//! Command dispatch engine.
//!
//! Takes a trigger message, resolves it to a registered command, runs the
//! permission checks and admission control (cooldowns, concurrency gates),
//! executes the handler and delivers its outputs through a [`Transport`].
//! Delivery records map each trigger to the replies it produced so edited
//! triggers update their reply in place and deleted triggers take their
//! replies with them.
//!
//! [`Transport`]: herald_channels::Transport

pub mod admission;
pub mod bucket;
pub mod cascade;
pub mod checks;
pub mod command;
pub mod concurrency;
pub mod config;
pub mod context;
pub mod cooldown;
pub mod delivery;
pub mod delivery_memory;
pub mod delivery_sqlite;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod hooks;
pub mod invocation;
pub mod output;
pub mod paste;
pub mod registry;

pub use {
    bucket::BucketType,
    cascade::{CascadeOutcome, DeleteButtonPress, DeletePress},
    command::{Command, CommandBuilder, Handler},
    concurrency::MaxConcurrency,
    config::EngineConfig,
    context::{InvocationContext, Trigger},
    cooldown::Cooldown,
    delivery::DeliveryStore,
    delivery_memory::InMemoryDeliveryStore,
    delivery_sqlite::SqliteDeliveryStore,
    dispatcher::Dispatcher,
    error::{DispatchError, Error, PermissionScope, Rejection, Result},
    events::{CommandEventSink, UsageTracker},
    hooks::AfterInvokeHook,
    invocation::{Delivered, Invocation, InvocationReport, InvocationState},
    output::{Normalizer, Output, OutputPart},
    paste::Paste,
    registry::CommandRegistry,
};

/// Run database migrations for the delivery record table.
///
/// Call at startup before [`SqliteDeliveryStore::with_pool`] on a shared pool;
/// [`SqliteDeliveryStore::new`] runs them itself.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
