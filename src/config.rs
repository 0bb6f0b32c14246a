//! Configuration loading and management.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Configuration errors. Both map to exit code 2 at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server identity.
    pub server: ServerConfig,
    /// Client listen configuration.
    pub listen: ListenConfig,
    /// Operator blocks.
    #[serde(default)]
    pub oper: Vec<OperBlock>,
    /// Connection classes: allow rules, checked before deny.
    #[serde(default)]
    pub allow: Vec<AllowBlock>,
    /// Connection classes: deny rules.
    #[serde(default)]
    pub deny: Vec<DenyBlock>,
    /// Per-channel ban list limits.
    #[serde(default)]
    pub banlist: Vec<BanlistBlock>,
    /// Server-to-server link blocks.
    #[serde(default)]
    pub link: Vec<LinkBlock>,
    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Module host configuration.
    #[serde(default)]
    pub modules: ModulesConfig,
    /// Settings for the operjoin module.
    #[serde(default)]
    pub operjoin: OperjoinConfig,
}

/// Server identity and banner data.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// This server's name on the network.
    pub name: String,
    /// Network name advertised in the welcome burst.
    pub network: String,
    /// Free-form description shown in LINKS/MAP and peer handshakes.
    pub description: String,
    /// Path to the MOTD file.
    pub motd_file: Option<String>,
    /// Path to the RULES file.
    pub rules_file: Option<String>,
    /// Administrative contact lines for ADMIN.
    pub admin_info: Option<String>,
    pub admin_email: Option<String>,
    /// Password required by DIE, when set.
    pub die_password: Option<String>,
    /// Password required by RESTART, when set.
    pub restart_password: Option<String>,
}

/// Client listener.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Client address, e.g. `0.0.0.0:6667`.
    pub client: SocketAddr,
    /// Optional server-to-server listener address.
    pub peer: Option<SocketAddr>,
}

/// One operator credential block.
#[derive(Debug, Clone, Deserialize)]
pub struct OperBlock {
    pub name: String,
    pub password: String,
    /// Hostmask the oper must connect from (`*@*` to allow any).
    #[serde(default = "default_any_mask")]
    pub host: String,
}

/// CC_ALLOW connection class: matching hosts may connect, optionally
/// gated by a PASS password.
#[derive(Debug, Clone, Deserialize)]
pub struct AllowBlock {
    pub host: String,
    pub password: Option<String>,
}

/// CC_DENY connection class: matching hosts are refused at accept.
#[derive(Debug, Clone, Deserialize)]
pub struct DenyBlock {
    pub host: String,
}

/// Ban-list size override for channels matching a mask.
#[derive(Debug, Clone, Deserialize)]
pub struct BanlistBlock {
    pub chan: String,
    pub limit: usize,
}

/// A server-to-server link.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkBlock {
    pub name: String,
    pub address: SocketAddr,
    #[serde(default)]
    pub autoconnect: bool,
    #[serde(default)]
    pub description: String,
    /// Mesh slot this link belongs to (0..31).
    #[serde(default)]
    pub mesh: usize,
}

/// Resource limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Channels a user may occupy at once.
    #[serde(default = "default_max_chans")]
    pub max_chans: usize,
    /// Outbound queue cap in bytes; beyond it the client is dropped.
    #[serde(default = "default_max_write_queue")]
    pub max_write_queue: usize,
    /// Seconds an unregistered connection may linger.
    #[serde(default = "default_registration_timeout")]
    pub registration_timeout: u64,
    /// Ban list cap used when no `[[banlist]]` block matches.
    #[serde(default = "default_ban_limit")]
    pub default_ban_limit: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_chans: default_max_chans(),
            max_write_queue: default_max_write_queue(),
            registration_timeout: default_registration_timeout(),
            default_ban_limit: default_ban_limit(),
        }
    }
}

/// Module host configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModulesConfig {
    /// Modules loaded at boot, in order.
    #[serde(default)]
    pub boot: Vec<String>,
}

/// Configuration for the operjoin module.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperjoinConfig {
    /// Channel opers are joined to on oper-up; empty disables.
    #[serde(default)]
    pub channel: String,
}

fn default_any_mask() -> String {
    "*@*".to_string()
}

fn default_max_chans() -> usize {
    20
}

fn default_max_write_queue() -> usize {
    256 * 1024
}

fn default_registration_timeout() -> u64 {
    60
}

fn default_ban_limit() -> usize {
    64
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.name.is_empty() || !self.server.name.contains('.') {
            return Err(ConfigError::Invalid(
                "server.name must be a dotted server name".to_string(),
            ));
        }
        if self.server.network.is_empty() {
            return Err(ConfigError::Invalid("server.network must be set".to_string()));
        }
        for link in &self.link {
            if link.mesh >= crate::peers::MAX_MESHES {
                return Err(ConfigError::Invalid(format!(
                    "link {} names mesh {} (max {})",
                    link.name,
                    link.mesh,
                    crate::peers::MAX_MESHES - 1
                )));
            }
        }
        Ok(())
    }

    /// Ban-list cap for a channel name: the first matching `[[banlist]]`
    /// block wins, else the default of 64.
    pub fn ban_limit_for(&self, channel: &str) -> usize {
        for block in &self.banlist {
            if crate::bans::match_mask(&block.chan, channel) {
                return block.limit;
            }
        }
        self.limits.default_ban_limit
    }
}

/// Read a line-oriented display file (MOTD, RULES). Blank lines are
/// rendered as a single space so clients show them.
pub fn read_display_file(path: &str) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => content
            .lines()
            .map(|l| {
                if l.is_empty() {
                    " ".to_string()
                } else {
                    l.to_string()
                }
            })
            .collect(),
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "failed to read display file");
            Vec::new()
        }
    }
}
