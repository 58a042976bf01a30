//! # Key-value configuration management.

use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context as _, Result};
use strum::{EnumProperty, IntoEnumIterator};
use strum_macros::{AsRefStr, Display, EnumIter, EnumProperty, EnumString};

use crate::context::Context;

/// The available configuration keys.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
    EnumProperty,
)]
#[strum(serialize_all = "snake_case")]
pub enum Config {
    /// Address of the account the view belongs to,
    /// used as the sender of invitations.
    ConfiguredAddr,

    /// Directory attachments are saved to.
    #[strum(props(default = "."))]
    DownloadDir,

    /// Whether the read pane starts open.
    #[strum(props(default = "0"))]
    ReadOpen,
}

impl Config {
    /// Default value of the key, if any.
    pub fn default_value(self) -> Option<&'static str> {
        self.get_str("default")
    }
}

impl Context {
    /// Returns the configured value, or the default if it is unset.
    pub async fn get_config(&self, key: Config) -> Result<Option<String>> {
        let value = self.config.read().await.get(&key).cloned();
        Ok(value.or_else(|| key.default_value().map(|s| s.to_string())))
    }

    /// Returns the value interpreted as an integer, `0` if unset.
    pub async fn get_config_int(&self, key: Config) -> Result<i32> {
        self.get_config(key)
            .await?
            .map(|s| s.trim().parse().with_context(|| format!("{key} is not a number")))
            .transpose()
            .map(|v| v.unwrap_or_default())
    }

    /// Returns the value interpreted as a boolean.
    pub async fn get_config_bool(&self, key: Config) -> Result<bool> {
        Ok(self.get_config_int(key).await? != 0)
    }

    /// Sets or unsets a configuration value.
    pub async fn set_config(&self, key: Config, value: Option<&str>) -> Result<()> {
        let mut config = self.config.write().await;
        match value {
            Some(value) => config.insert(key, value.to_string()),
            None => config.remove(&key),
        };
        Ok(())
    }

    /// Loads configuration values from a TOML file.
    ///
    /// The file is a flat table of `snake_case` keys, e.g.
    /// `configured_addr = "alice@example.org"`.
    pub async fn load_config_file(&self, path: &Path) -> Result<()> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        self.load_config_str(&content)
            .await
            .with_context(|| format!("invalid configuration in {}", path.display()))
    }

    async fn load_config_str(&self, content: &str) -> Result<()> {
        let table: toml::Table = content.parse()?;
        let mut values = Vec::with_capacity(table.len());
        for (name, value) in table {
            let Ok(key) = Config::from_str(&name) else {
                bail!("unknown configuration key {name:?}");
            };
            let value = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Boolean(b) => i32::from(b).to_string(),
                other => bail!("unsupported value for {name}: {other}"),
            };
            values.push((key, value));
        }

        let mut config = self.config.write().await;
        for (key, value) in values {
            config.insert(key, value);
        }
        Ok(())
    }

    /// Lists all configuration keys and their current values.
    pub async fn get_config_summary(&self) -> Result<Vec<(Config, Option<String>)>> {
        let mut res = Vec::new();
        for key in Config::iter() {
            res.push((key, self.get_config(key).await?));
        }
        Ok(res)
    }
}
