use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Sqlite,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Postgres => write!(f, "postgres"),
            StoreBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other => bail!("Unknown store backend '{}' (expected postgres or sqlite)", other),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
}

/// PostgreSQL credentials. Mirrors the `DB_*` environment variables.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            user: String::new(),
            password: String::new(),
            host: String::new(),
            port: default_port(),
        }
    }
}

impl DatabaseConfig {
    /// libpq keyword/value connection string. Every value is single-quoted
    /// with `\` and `'` escaped, so passwords may contain spaces or quotes.
    pub fn conninfo(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            quote_conninfo(&self.host),
            self.port,
            quote_conninfo(&self.name),
            quote_conninfo(&self.user),
            quote_conninfo(&self.password),
        )
    }
}

fn quote_conninfo(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

fn default_port() -> u16 {
    5432
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("greetbot.db")
}

impl Config {
    /// Build the config from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable lookup. Unset variables
    /// become empty strings; `validate` decides whether that is acceptable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).unwrap_or_default();

        let port = match lookup("DB_PORT").filter(|p| !p.trim().is_empty()) {
            Some(p) => p
                .trim()
                .parse::<u16>()
                .with_context(|| format!("DB_PORT is not a valid port: {}", p))?,
            None => default_port(),
        };

        let backend = match lookup("STORE_BACKEND").filter(|b| !b.trim().is_empty()) {
            Some(b) => b.parse()?,
            None => StoreBackend::default(),
        };

        let sqlite_path = lookup("SQLITE_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_sqlite_path);

        Ok(Config {
            telegram: TelegramConfig {
                bot_token: var("TELEGRAM_TOKEN"),
            },
            database: DatabaseConfig {
                name: var("DB_NAME"),
                user: var("DB_USER"),
                password: var("DB_PASSWORD"),
                host: var("DB_HOST"),
                port,
            },
            storage: StorageConfig {
                backend,
                sqlite_path,
            },
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Reject configurations that cannot possibly work. The password may be
    /// empty (trust or peer authentication).
    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            bail!("Telegram bot token is not set (TELEGRAM_TOKEN)");
        }

        if self.storage.backend == StoreBackend::Postgres {
            let required = [
                ("DB_NAME", &self.database.name),
                ("DB_USER", &self.database.user),
                ("DB_HOST", &self.database.host),
            ];
            let missing: Vec<&str> = required
                .iter()
                .filter(|(_, value)| value.trim().is_empty())
                .map(|(key, _)| *key)
                .collect();
            if !missing.is_empty() {
                bail!("Missing database configuration: {}", missing.join(", "));
            }
        }

        Ok(())
    }
}
