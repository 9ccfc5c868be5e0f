use crate::error::{DevbootError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Table-name prefixes owned by the framework (authentication, bookkeeping,
/// admin). Tables starting with any of these are never regenerated.
pub const INTERNAL_TABLE_PREFIXES: &[&str] = &["auth_", "django_", "admin_"];

// ---------------------------------------------------------------------------
// CommandsConfig
// ---------------------------------------------------------------------------

/// Per-step command overrides. Unset steps are derived from `manage`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandsConfig {
    #[serde(default)]
    pub makemigrations: Option<String>,
    #[serde(default)]
    pub migrate: Option<String>,
    #[serde(default)]
    pub export_data: Option<String>,
    #[serde(default)]
    pub inspect: Option<String>,
    #[serde(default)]
    pub serve: Option<String>,
}

// ---------------------------------------------------------------------------
// DatabaseConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_dump_utility")]
    pub dump_utility: String,
    #[serde(default = "default_client")]
    pub client: String,
    #[serde(default = "default_internal_prefixes")]
    pub internal_prefixes: Vec<String>,
}

fn default_dump_utility() -> String {
    "mysqldump".to_string()
}

fn default_client() -> String {
    "mysql".to_string()
}

fn default_internal_prefixes() -> Vec<String> {
    INTERNAL_TABLE_PREFIXES
        .iter()
        .map(|p| p.to_string())
        .collect()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dump_utility: default_dump_utility(),
            client: default_client(),
            internal_prefixes: default_internal_prefixes(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_app")]
    pub app: String,
    /// Framework entrypoint that the default step commands are built from.
    #[serde(default = "default_manage")]
    pub manage: String,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default = "default_backup_path")]
    pub backup_path: PathBuf,
    #[serde(default = "default_export_path")]
    pub export_path: PathBuf,
}

fn default_port() -> u16 {
    paths::DEFAULT_PORT
}

fn default_app() -> String {
    "myapp".to_string()
}

fn default_manage() -> String {
    "python manage.py".to_string()
}

fn default_backup_path() -> PathBuf {
    PathBuf::from(paths::BACKUP_FILE)
}

fn default_export_path() -> PathBuf {
    PathBuf::from(paths::DATA_EXPORT_FILE)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            app: default_app(),
            manage: default_manage(),
            commands: CommandsConfig::default(),
            database: DatabaseConfig::default(),
            backup_path: default_backup_path(),
            export_path: default_export_path(),
        }
    }
}

impl Config {
    /// Load `devboot.yaml` from `root`, falling back to defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let config: Config = serde_yaml::from_str(&data)
            .map_err(|e| DevbootError::InvalidConfig(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(DevbootError::InvalidConfig(
                "port must be non-zero".to_string(),
            ));
        }
        if self.app.trim().is_empty()
            || self.app.starts_with('.')
            || self.app.contains(['/', '\\'])
        {
            return Err(DevbootError::InvalidConfig(format!(
                "app '{}' must be a plain directory name",
                self.app
            )));
        }
        if self.manage.trim().is_empty() {
            return Err(DevbootError::InvalidConfig(
                "manage command must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn makemigrations_command(&self) -> String {
        self.step_or(&self.commands.makemigrations, "makemigrations")
    }

    pub fn migrate_command(&self) -> String {
        self.step_or(&self.commands.migrate, "migrate")
    }

    pub fn export_data_command(&self) -> String {
        self.step_or(&self.commands.export_data, "dumpdata --indent 2")
    }

    pub fn inspect_command(&self) -> String {
        self.step_or(&self.commands.inspect, "inspectdb")
    }

    pub fn serve_command(&self) -> String {
        match &self.commands.serve {
            Some(cmd) => cmd.clone(),
            None => format!("{} runserver {}", self.manage, self.port),
        }
    }

    pub fn backup_path(&self, root: &Path) -> PathBuf {
        root.join(&self.backup_path)
    }

    pub fn export_path(&self, root: &Path) -> PathBuf {
        root.join(&self.export_path)
    }

    fn step_or(&self, explicit: &Option<String>, subcommand: &str) -> String {
        match explicit {
            Some(cmd) => cmd.clone(),
            None => format!("{} {subcommand}", self.manage),
        }
    }
}
