//! Configuration for a Stride deployment.
//!
//! # Security
//!
//! - Config file permission validation on Unix systems
//! - Rejects world-readable files containing secrets
//! - Warns about secrets stored in config files

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stride_agents::HarnessConfig;
use stride_llm::ConversationConfig;
use stride_skills::{ContextConfig, DeviceConfig, SyncConfig};
use stride_whiteboard::WhiteboardConfig;
use tracing::warn;

use crate::router::RouterConfig;

/// Top-level configuration, one section per component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrideConfig {
    /// Tool-calling conversation service used by every agent.
    #[serde(default)]
    pub llm: ConversationConfig,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub harness: HarnessConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub whiteboard: WhiteboardConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    /// Fitness device gateway. Without a token the sync stages are skipped.
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/stride.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long a chat session stays resumable.
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,
}

fn default_session_ttl() -> u64 {
    3600
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
        }
    }
}

impl StrideConfig {
    /// Load configuration from a TOML file.
    ///
    /// On Unix systems the file must be a regular file, must not be
    /// world-writable, and must not be world-readable when it holds a
    /// secret. Secrets found in the file are reported with a warning.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();

        #[cfg(unix)]
        validate_config_file_permissions(path)?;

        let config = Self::from_file_unchecked(path)?;

        let secrets = config.secret_fields();
        if !secrets.is_empty() {
            warn!(
                fields = ?secrets,
                "Secrets found in config file '{}'. Prefer environment variables \
                 (ANTHROPIC_API_KEY, OPENAI_API_KEY, STRIDE_DEVICE_TOKEN).",
                path.display()
            );
        }

        Ok(config)
    }

    /// Load configuration from a TOML file without permission checks.
    ///
    /// Use this only for testing or when the file was validated elsewhere.
    pub fn from_file_unchecked(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Names of the secret fields set directly in this config.
    pub fn secret_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.llm.api_key.is_some() {
            fields.push("llm.api_key");
        }
        if self
            .router
            .classifier
            .as_ref()
            .is_some_and(|c| c.api_key.is_some())
        {
            fields.push("router.classifier.api_key");
        }
        if self.device.token.is_some() {
            fields.push("device.token");
        }
        fields
    }
}

/// Validate config file permissions on Unix systems.
///
/// - The path must be a regular file
/// - The file must not be world-writable
/// - A file holding a secret must not be world-readable
#[cfg(unix)]
fn validate_config_file_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::symlink_metadata(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;

    if !metadata.is_file() {
        anyhow::bail!(
            "Config path '{}' is not a regular file. Symlinks and directories are not allowed.",
            path.display()
        );
    }

    let permission_bits = metadata.permissions().mode() & 0o777;

    if permission_bits & 0o002 != 0 {
        anyhow::bail!(
            "Config file '{}' is world-writable (mode {:04o}). Fix with: chmod o-w {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    let content = std::fs::read_to_string(path)?;
    let has_secret = content
        .lines()
        .map(str::trim_start)
        .any(|line| assigns(line, "api_key") || assigns(line, "token"));

    if has_secret && permission_bits & 0o004 != 0 {
        anyhow::bail!(
            "Config file '{}' contains a secret but is world-readable (mode {:04o}). \
             Fix with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    if has_secret && permission_bits & 0o040 != 0 {
        warn!(
            "Config file '{}' contains a secret and is group-readable (mode {:04o}). \
             Consider: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    Ok(())
}

#[cfg(unix)]
fn assigns(line: &str, key: &str) -> bool {
    line.strip_prefix(key)
        .is_some_and(|rest| rest.trim_start().starts_with('='))
}
