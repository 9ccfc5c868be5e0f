//! Schema introspection: list the user tables of the live database and
//! regenerate the app's model source from them.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::Config;
use crate::credentials::Credentials;
use crate::error::{DevbootError, Result};
use crate::paths;
use crate::runner::shell;

/// Sorted, de-duplicated user table names.
pub type SchemaTableSet = BTreeSet<String>;

const LIST_TABLES_SQL: &str = "SHOW TABLES";

/// Drop every name that starts with one of `prefixes`.
pub fn filter_user_tables<I, S>(names: I, prefixes: &[String]) -> SchemaTableSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|n| n.as_ref().trim().to_string())
        .filter(|n| !n.is_empty())
        .filter(|n| !prefixes.iter().any(|p| n.starts_with(p.as_str())))
        .collect()
}

pub struct SchemaIntrospector {
    root: PathBuf,
    client: String,
    inspect_command: String,
    prefixes: Vec<String>,
}

impl SchemaIntrospector {
    pub fn new(
        root: &Path,
        client: impl Into<String>,
        inspect_command: impl Into<String>,
        prefixes: Vec<String>,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            client: client.into(),
            inspect_command: inspect_command.into(),
            prefixes,
        }
    }

    pub fn from_config(root: &Path, config: &Config) -> Self {
        Self::new(
            root,
            config.database.client.clone(),
            config.inspect_command(),
            config.database.internal_prefixes.clone(),
        )
    }

    /// User tables of the database. A failed query is logged and yields an
    /// empty set; introspection never blocks the bootstrap.
    pub fn list_user_tables(&self, creds: &Credentials) -> SchemaTableSet {
        match self.query_tables(creds) {
            Ok(names) => {
                let tables = filter_user_tables(names.lines(), &self.prefixes);
                tracing::info!(count = tables.len(), database = %creds.name, "found user tables");
                tables
            }
            Err(e) => {
                tracing::warn!(error = %e, database = %creds.name, "could not list tables");
                SchemaTableSet::new()
            }
        }
    }

    fn query_tables(&self, creds: &Credentials) -> Result<String> {
        let client = which::which(&self.client)?;
        let mut cmd = Command::new(client);
        cmd.args(["-u", &creds.user, "-N", "-B", "-e", LIST_TABLES_SQL, &creds.name])
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit());
        creds.apply(&mut cmd);
        let output = cmd.output()?;
        if !output.status.success() {
            return Err(DevbootError::ExternalCommandFailure {
                command: format!("{} -e \"{LIST_TABLES_SQL}\" {}", self.client, creds.name),
                code: output.status.code(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Rewrite `<root>/<app>/models.py` for exactly `tables`.
    ///
    /// The file is truncated first; with no tables it is left empty.
    pub fn regenerate_model_source(
        &self,
        app: &str,
        tables: &SchemaTableSet,
        creds: &Credentials,
    ) -> Result<PathBuf> {
        let target = paths::models_path(&self.root, app);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&target)?;

        if tables.is_empty() {
            tracing::info!(path = %target.display(), "no user tables, model source left empty");
            return Ok(target);
        }

        let names: Vec<String> = tables.iter().cloned().collect();
        tracing::info!(
            command = %self.inspect_command,
            tables = %names.join(" "),
            "regenerating model source"
        );
        let mut cmd = shell(&self.inspect_command, &names);
        cmd.current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::from(file))
            .stderr(Stdio::inherit());
        creds.apply(&mut cmd);
        let status = cmd.status()?;
        if !status.success() {
            return Err(DevbootError::ExternalCommandFailure {
                command: format!("{} {}", self.inspect_command, names.join(" ")),
                code: status.code(),
            });
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::INTERNAL_TABLE_PREFIXES;
    use tempfile::TempDir;

    fn prefixes() -> Vec<String> {
        INTERNAL_TABLE_PREFIXES
            .iter()
            .map(|p| p.to_string())
            .collect()
    }

    fn creds() -> Credentials {
        Credentials::new("root", "secret", "myprojectdb")
    }

    #[test]
    fn filters_framework_tables() {
        let tables = filter_user_tables(
            [
                "auth_user",
                "django_migrations",
                "admin_log",
                "shop_order",
                "shop_item",
                "",
                "shop_item",
                "authors",
            ],
            &prefixes(),
        );
        let names: Vec<&str> = tables.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["authors", "shop_item", "shop_order"]);
    }

    #[test]
    fn query_failure_yields_empty_set() {
        let dir = TempDir::new().unwrap();
        let introspector = SchemaIntrospector::new(
            dir.path(),
            "__devboot_no_such_client__",
            "true",
            prefixes(),
        );
        assert!(introspector.list_user_tables(&creds()).is_empty());
    }

    #[test]
    fn empty_table_set_truncates_model_source() {
        let dir = TempDir::new().unwrap();
        let models = dir.path().join("shop/models.py");
        std::fs::create_dir_all(models.parent().unwrap()).unwrap();
        std::fs::write(&models, "class Stale(models.Model):\n    pass\n").unwrap();

        let introspector = SchemaIntrospector::new(dir.path(), "mysql", "true", prefixes());
        let written = introspector
            .regenerate_model_source("shop", &SchemaTableSet::new(), &creds())
            .unwrap();
        assert_eq!(written, models);
        assert_eq!(std::fs::read_to_string(&models).unwrap(), "");
    }

    #[cfg(unix)]
    #[test]
    fn regenerates_for_exact_tables() {
        let dir = TempDir::new().unwrap();
        let introspector =
            SchemaIntrospector::new(dir.path(), "mysql", "echo inspectdb", prefixes());
        let tables = filter_user_tables(["shop_item", "auth_group", "shop_order"], &prefixes());
        let written = introspector
            .regenerate_model_source("shop", &tables, &creds())
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(written).unwrap(),
            "inspectdb shop_item shop_order\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn failed_generation_is_command_failure() {
        let dir = TempDir::new().unwrap();
        let introspector = SchemaIntrospector::new(dir.path(), "mysql", "exit 4;", prefixes());
        let tables = filter_user_tables(["shop_item"], &prefixes());
        let err = introspector
            .regenerate_model_source("shop", &tables, &creds())
            .unwrap_err();
        assert!(matches!(
            err,
            DevbootError::ExternalCommandFailure { code: Some(4), .. }
        ));
    }
}
