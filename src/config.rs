//! Configuration for the taskboard server

use anyhow::{Context, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Namespace prepended to every collection key
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Owner name; also selects the task collection
    pub name: String,
    /// The hashed API token (argon2 hash, or plain text for backwards compat)
    pub token_hash: String,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_db_path() -> PathBuf {
    PathBuf::from("taskboard.sqlite")
}

fn default_prefix() -> String {
    "todos".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind: default_bind(),
                port: default_port(),
            },
            database: DatabaseConfig {
                path: default_db_path(),
            },
            storage: StorageConfig::default(),
            tokens: Vec::new(),
        }
    }
}

impl Config {
    /// Default config path
    pub fn default_path() -> Result<PathBuf> {
        // Check environment variable first
        if let Ok(env_path) = std::env::var("TASKBOARD_CONFIG") {
            return Ok(PathBuf::from(env_path));
        }

        // Check for config in current directory
        let local = PathBuf::from("config.toml");
        if local.exists() {
            return Ok(local);
        }

        // Docker default
        let data_config = PathBuf::from("/data/config.toml");
        if data_config.exists() {
            return Ok(data_config);
        }

        // Then check XDG config
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("taskboard");

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from default path
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save config to specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let with_comments = format!(
            "# taskboard configuration\n\n\
             {}\n\n\
             # Add tokens with: taskboard token --name <owner>\n",
            content
        );

        std::fs::write(path, with_comments).context("Failed to write config file")?;

        Ok(())
    }

    /// Name of the token owner, if `token` matches a configured token
    /// (hashed or legacy plain text)
    pub fn authenticate(&self, token: &str) -> Option<&str> {
        let argon2 = Argon2::default();

        self.tokens
            .iter()
            .find(|t| match PasswordHash::new(&t.token_hash) {
                Ok(parsed_hash) => argon2
                    .verify_password(token.as_bytes(), &parsed_hash)
                    .is_ok(),
                Err(_) => t.token_hash == token,
            })
            .map(|t| t.name.as_str())
    }

    /// Register a hashed token for `owner`; false if the owner already has one
    pub fn add_token(&mut self, owner: &str, token_hash: String) -> bool {
        if self.tokens.iter().any(|t| t.name == owner) {
            return false;
        }
        self.tokens.push(TokenConfig {
            name: owner.to_string(),
            token_hash,
        });
        true
    }

    /// Drop the token issued to `owner`; false if there was none
    pub fn revoke_token(&mut self, owner: &str) -> bool {
        let before = self.tokens.len();
        self.tokens.retain(|t| t.name != owner);
        self.tokens.len() != before
    }
}

/// Hash a token using argon2
pub fn hash_token(token: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(token.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash token: {}", e))?;
    Ok(hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_token_authenticates_its_owner() {
        let mut config = Config::default();
        config.tokens.push(TokenConfig {
            name: "alice".to_string(),
            token_hash: hash_token("tbk_secret").unwrap(),
        });

        assert_eq!(config.authenticate("tbk_secret"), Some("alice"));
        assert_eq!(config.authenticate("tbk_wrong"), None);
    }

    #[test]
    fn plain_token_still_accepted() {
        let mut config = Config::default();
        config.tokens.push(TokenConfig {
            name: "legacy".to_string(),
            token_hash: "plain-token".to_string(),
        });

        assert_eq!(config.authenticate("plain-token"), Some("legacy"));
        assert_eq!(config.authenticate(""), None);
    }

    #[test]
    fn owners_hold_at_most_one_token() {
        let mut config = Config::default();
        assert!(config.add_token("alice", hash_token("tbk_one").unwrap()));
        assert!(!config.add_token("alice", hash_token("tbk_two").unwrap()));
        assert_eq!(config.authenticate("tbk_one"), Some("alice"));
        assert_eq!(config.authenticate("tbk_two"), None);

        assert!(config.revoke_token("alice"));
        assert!(!config.revoke_token("alice"));
        assert_eq!(config.authenticate("tbk_one"), None);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("config.toml");

        let mut config = Config::default();
        config.server.port = 9191;
        config.storage.prefix = "board".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.server.port, 9191);
        assert_eq!(loaded.storage.prefix, "board");
        assert!(loaded.tokens.is_empty());
    }

    #[test]
    fn storage_section_is_optional() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 3000

            [database]
            path = "/tmp/x.sqlite"
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.prefix, "todos");
        assert_eq!(config.server.bind, "0.0.0.0");
    }
}
