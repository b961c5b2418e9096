//! Registration table: names, aliases and registry-wide defaults.

use std::{collections::HashMap, sync::Arc};

use tracing::debug;

use crate::{
    admission::Admission,
    checks::{Check, RequirePermissions},
    command::{Command, CommandBuilder},
    concurrency::MaxConcurrency,
    config::EngineConfig,
    cooldown::Cooldown,
    error::{Error, Result},
};

/// Outcome of matching message content against the registry.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The content does not start with the prefix, or names nothing.
    NotCommand,
    /// Prefixed, but no command has that name or alias.
    Unknown { name: String },
    Found {
        command: Arc<Command>,
        invoked_with: String,
        args: String,
    },
}

/// Owns every command and the per-command admission state.
pub struct CommandRegistry {
    prefix: String,
    case_insensitive: bool,
    default_cooldown: Option<Cooldown>,
    default_concurrency: Option<MaxConcurrency>,
    default_checks: Vec<Arc<dyn Check>>,
    commands: Vec<Arc<Command>>,
    index: HashMap<String, usize>,
}

impl CommandRegistry {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let default_cooldown = config
            .default_cooldown
            .as_ref()
            .map(|c| c.to_cooldown())
            .transpose()?;
        let default_checks: Vec<Arc<dyn Check>> = vec![
            Arc::new(RequirePermissions::bot(config.bot_permissions.clone())),
            Arc::new(RequirePermissions::user(config.user_permissions.clone())),
        ];
        Ok(Self {
            prefix: config.prefix.clone(),
            case_insensitive: config.case_insensitive,
            default_cooldown,
            default_concurrency: config.default_concurrency,
            default_checks,
            commands: Vec::new(),
            index: HashMap::new(),
        })
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Finalize `builder`: apply default policies, append the registry-wide
    /// permission checks (bot, then user) and create fresh admission state.
    pub fn register(&mut self, builder: CommandBuilder) -> Result<Arc<Command>> {
        let CommandBuilder {
            name,
            aliases,
            description,
            handler,
            cooldown,
            concurrency,
            checks,
            hooks,
        } = builder;

        let mut keys = Vec::with_capacity(aliases.len() + 1);
        for label in std::iter::once(&name).chain(&aliases) {
            if label.is_empty() || label.chars().any(char::is_whitespace) {
                return Err(Error::message(format!("invalid command name: {label:?}")));
            }
            let key = self.key(label);
            if self.index.contains_key(&key) || keys.contains(&key) {
                return Err(Error::duplicate_name(label.clone()));
            }
            keys.push(key);
        }

        let cooldown = cooldown.resolve(self.default_cooldown);
        let concurrency = concurrency.resolve(self.default_concurrency);
        if concurrency.is_some_and(|c| c.max == 0) {
            return Err(Error::message(format!(
                "command {name}: max concurrency must be at least 1"
            )));
        }

        let command = Arc::new(Command {
            name,
            aliases,
            description,
            handler,
            checks: checks.into_iter().chain(self.default_checks.iter().cloned()).collect(),
            hooks,
            admission: Admission::new(cooldown, concurrency),
        });

        let slot = self.commands.len();
        self.commands.push(Arc::clone(&command));
        for key in keys {
            self.index.insert(key, slot);
        }
        debug!(
            command = command.name(),
            aliases = ?command.aliases(),
            cooldown = ?cooldown,
            concurrency = ?concurrency,
            "command registered"
        );
        Ok(command)
    }

    /// Look a command up by name or alias.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Command>> {
        self.index
            .get(&self.key(name))
            .and_then(|&slot| self.commands.get(slot))
            .cloned()
    }

    /// Split prefixed content into a command and its raw argument text.
    #[must_use]
    pub fn resolve(&self, content: &str) -> Resolution {
        let Some(rest) = content.strip_prefix(self.prefix.as_str()) else {
            return Resolution::NotCommand;
        };
        let rest = rest.trim_start();
        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };
        if name.is_empty() {
            return Resolution::NotCommand;
        }
        match self.get(name) {
            Some(command) => Resolution::Found {
                command,
                invoked_with: name.to_string(),
                args: args.to_string(),
            },
            None => Resolution::Unknown {
                name: name.to_string(),
            },
        }
    }

    /// Commands in registration order.
    pub fn commands(&self) -> impl Iterator<Item = &Arc<Command>> {
        self.commands.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    fn key(&self, name: &str) -> String {
        if self.case_insensitive {
            name.to_lowercase()
        } else {
            name.to_string()
        }
    }
}
