//! Engine configuration and its file loader.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use {
    herald_channels::{Permission, PermissionSet},
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

use crate::{
    bucket::BucketType,
    concurrency::MaxConcurrency,
    cooldown::Cooldown,
    delivery::DEFAULT_RECORD_TTL,
    error::{Context, Error, Result},
    output::SAFE_SEND_LIMIT,
};

/// Config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["herald.toml", "herald.yaml", "herald.yml", "herald.json"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Text a message must start with to be treated as a command.
    pub prefix: String,
    /// Match command names and aliases regardless of case.
    pub case_insensitive: bool,
    /// Applied to commands registered without their own cooldown.
    pub default_cooldown: Option<CooldownConfig>,
    /// Applied to commands registered without their own concurrency limit.
    pub default_concurrency: Option<MaxConcurrency>,
    pub delivery_ttl_secs: u64,
    /// Safe-send content longer than this many characters is pasted.
    pub safe_send_limit: usize,
    /// Required of the bot in the invocation channel for every command.
    pub bot_permissions: PermissionSet,
    /// Required of the invoking user for every command.
    pub user_permissions: PermissionSet,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prefix: "!".into(),
            case_insensitive: true,
            default_cooldown: Some(CooldownConfig::default()),
            default_concurrency: Some(MaxConcurrency::default()),
            delivery_ttl_secs: DEFAULT_RECORD_TTL.as_secs(),
            safe_send_limit: SAFE_SEND_LIMIT,
            bot_permissions: [
                Permission::SendMessages,
                Permission::AttachFiles,
                Permission::EmbedLinks,
            ]
            .into(),
            user_permissions: [Permission::SendMessages].into(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.prefix.trim().is_empty() {
            return Err(Error::message("prefix must not be empty"));
        }
        if let Some(cooldown) = &self.default_cooldown {
            cooldown.to_cooldown()?;
        }
        if self.default_concurrency.is_some_and(|c| c.max == 0) {
            return Err(Error::message("default_concurrency.max must be at least 1"));
        }
        if self.safe_send_limit == 0 {
            return Err(Error::message("safe_send_limit must be at least 1"));
        }
        Ok(())
    }

    #[must_use]
    pub fn delivery_ttl(&self) -> Duration {
        Duration::from_secs(self.delivery_ttl_secs)
    }
}

/// File form of a [`Cooldown`], with the window in (fractional) seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    pub rate: u32,
    pub per_secs: f64,
    pub bucket: BucketType,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            rate: 1,
            per_secs: 3.0,
            bucket: BucketType::User,
        }
    }
}

impl CooldownConfig {
    pub fn to_cooldown(&self) -> Result<Cooldown> {
        let per = Duration::try_from_secs_f64(self.per_secs)
            .with_context(|| format!("invalid cooldown window: {}", self.per_secs))?;
        Ok(Cooldown::new(self.rate, per, self.bucket))
    }
}

/// Load config from `path`. The format follows the file extension.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config = parse_config(&substitute_env(&raw), path)?;
    config.validate()?;
    Ok(config)
}

/// Load the first config file found in the working directory or the user
/// config dir, falling back to defaults.
pub fn discover_and_load() -> EngineConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return EngineConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    load_config(&path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
        EngineConfig::default()
    })
}

/// User-global config directory, e.g. `~/.config/herald`.
#[must_use]
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "herald").map(|d| d.config_dir().to_path_buf())
}

fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

fn parse_config(raw: &str, path: &Path) -> Result<EngineConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::message(format!("unsupported config format: .{ext}"))),
    }
}

/// Replace `${VAR}` placeholders with environment values. Unknown variables
/// and unterminated placeholders are kept verbatim.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&rest[start..start + 2 + end + 1]),
                }
                rest = &after[end + 1..];
            },
            _ => {
                out.push_str("${");
                rest = after;
            },
        }
    }
    out.push_str(rest);
    out
}
