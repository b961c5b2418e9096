mod console;
mod demo;
mod input;
mod render;

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use {
    clap::Parser,
    herald_channels::StaticPermissions,
    herald_commands::{
        CommandRegistry, Dispatcher, InMemoryDeliveryStore, Normalizer, Trigger, UsageTracker,
        config::{discover_and_load, load_config},
    },
    herald_common::{ChannelId, MessageId, UserId},
    tokio::{
        io::{AsyncBufReadExt, BufReader},
        task::JoinSet,
    },
    tracing::{debug, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use crate::{
    console::{ConsoleTransport, FilePaste},
    input::{Input, parse_line},
    render::ConsoleErrors,
};

const CHANNEL: ChannelId = ChannelId(1);
const DEFAULT_USER: UserId = UserId(1);

#[derive(Parser)]
#[command(name = "herald", about = "Herald: command engine console harness")]
struct Cli {
    /// Engine config file (TOML, YAML or JSON). Discovered when omitted.
    #[arg(long, env = "HERALD_CONFIG")]
    config: Option<PathBuf>,

    /// Command prefix (overrides config value).
    #[arg(long, env = "HERALD_PREFIX")]
    prefix: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

/// Logs go to stderr so they do not interleave with the console transcript.
fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => discover_and_load(),
    };
    if let Some(prefix) = &cli.prefix {
        config.prefix.clone_from(prefix);
    }
    info!(version = env!("CARGO_PKG_VERSION"), prefix = %config.prefix, "herald starting");

    let mut registry = CommandRegistry::new(&config)?;
    demo::register_all(&mut registry)?;

    let usage = Arc::new(UsageTracker::new());
    let paste = FilePaste::new(std::env::temp_dir().join("herald"));
    let dispatcher = Arc::new(
        Dispatcher::builder(registry, Arc::new(ConsoleTransport::new()))
            .permissions(Arc::new(StaticPermissions::allow_all()))
            .store(Arc::new(InMemoryDeliveryStore::from_config(&config)))
            .normalizer(Normalizer::new(config.safe_send_limit).with_paste(Arc::new(paste)))
            .event_sink(Arc::new(ConsoleErrors))
            .event_sink(usage.clone())
            .build(),
    );

    println!(
        "Type messages as user {DEFAULT_USER}. Directives: :as <user> <text>, :edit <id> <text>, \
         :delete <id>, :quit"
    );

    let mut history: HashMap<MessageId, Trigger> = HashMap::new();
    let mut next_trigger = 1_u64;
    let mut running = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        while running.try_join_next().is_some() {}

        let input = match parse_line(&line) {
            Ok(input) => input,
            Err(e) => {
                println!("? {e}");
                continue;
            },
        };
        match input {
            Input::Blank => {},
            Input::Quit => break,
            Input::Message { author, content } => {
                let id = MessageId(next_trigger);
                next_trigger += 1;
                let trigger = Trigger::new(id, CHANNEL, author.unwrap_or(DEFAULT_USER), content);
                println!("[{id}] posted");
                history.insert(id, trigger.clone());
                spawn_dispatch(&mut running, &dispatcher, trigger);
            },
            Input::Edit { trigger, content } => match history.get_mut(&trigger) {
                Some(existing) => {
                    existing.edit(content);
                    spawn_dispatch(&mut running, &dispatcher, existing.clone());
                },
                None => println!("? no trigger {trigger}"),
            },
            Input::Delete { trigger } => {
                if history.remove(&trigger).is_none() {
                    println!("? no trigger {trigger}");
                    continue;
                }
                let outcome = dispatcher.on_trigger_deleted(CHANNEL, trigger).await;
                debug!(?outcome, trigger_id = %trigger, "trigger deleted");
            },
        }
    }

    dispatcher.shutdown();
    while let Some(joined) = running.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "dispatch task panicked");
        }
    }
    for (command, uses) in usage.top(5) {
        info!(command = %command, uses, "usage");
    }
    Ok(())
}

fn spawn_dispatch(running: &mut JoinSet<()>, dispatcher: &Arc<Dispatcher>, trigger: Trigger) {
    let dispatcher = Arc::clone(dispatcher);
    running.spawn(async move {
        // Errors were already rendered by the event sink.
        if let Err(e) = dispatcher.dispatch(trigger).await {
            debug!(error = %e, kind = e.kind(), "dispatch finished with error");
        }
    });
}
