use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tempfile::NamedTempFile;

use crate::config::Config;
use crate::credentials::Credentials;
use crate::error::{DevbootError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpOutcome {
    Written(PathBuf),
    /// Dump utility not installed; nothing was written.
    Skipped,
}

/// Full-database dump and restore against a single fixed dump file.
#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
    dump_utility: String,
    client: String,
    backup_path: PathBuf,
}

impl BackupManager {
    pub fn new(
        root: &Path,
        dump_utility: impl Into<String>,
        client: impl Into<String>,
        backup_path: PathBuf,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            dump_utility: dump_utility.into(),
            client: client.into(),
            backup_path,
        }
    }

    pub fn from_config(root: &Path, config: &Config) -> Self {
        Self::new(
            root,
            config.database.dump_utility.clone(),
            config.database.client.clone(),
            config.backup_path(root),
        )
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Dump the whole database to the backup file.
    ///
    /// A missing dump utility is logged and skipped. The previous dump is
    /// only replaced once the utility exits successfully.
    pub fn dump(&self, creds: &Credentials) -> Result<DumpOutcome> {
        let utility = match which::which(&self.dump_utility) {
            Ok(path) => path,
            Err(_) => {
                let unavailable = DevbootError::DumpUtilityUnavailable(self.dump_utility.clone());
                tracing::warn!(error = %unavailable, "skipping database dump");
                return Ok(DumpOutcome::Skipped);
            }
        };

        let dir = self
            .backup_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let tmp = NamedTempFile::new_in(&dir)?;

        tracing::info!(
            utility = %self.dump_utility,
            database = %creds.name,
            path = %self.backup_path.display(),
            "dumping database"
        );
        let mut cmd = Command::new(utility);
        cmd.args(["-u", &creds.user, &creds.name])
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::from(tmp.reopen()?))
            .stderr(Stdio::inherit());
        creds.apply(&mut cmd);
        let status = cmd.status()?;

        if !status.success() {
            return Err(DevbootError::ExternalCommandFailure {
                command: format!("{} -u {} {}", self.dump_utility, creds.user, creds.name),
                code: status.code(),
            });
        }

        tmp.persist(&self.backup_path).map_err(|e| e.error)?;
        Ok(DumpOutcome::Written(self.backup_path.clone()))
    }

    /// Replay `path` into the database, overwriting live tables. Callers are
    /// responsible for confirming with the user first.
    pub fn restore(&self, creds: &Credentials, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(DevbootError::MissingDumpFile(path.to_path_buf()));
        }
        let client = which::which(&self.client)?;
        let input = File::open(path)?;

        tracing::info!(
            client = %self.client,
            database = %creds.name,
            path = %path.display(),
            "restoring database"
        );
        let mut cmd = Command::new(client);
        cmd.args(["-u", &creds.user, &creds.name])
            .current_dir(&self.root)
            .stdin(Stdio::from(input))
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        creds.apply(&mut cmd);
        let status = cmd.status()?;

        if !status.success() {
            return Err(DevbootError::ExternalCommandFailure {
                command: format!(
                    "{} -u {} {} < {}",
                    self.client,
                    creds.user,
                    creds.name,
                    path.display()
                ),
                code: status.code(),
            });
        }
        Ok(())
    }

    /// Copy of the backup taken just before a restore replays it. A restore
    /// that fails halfway is followed by the exit dump, which overwrites the
    /// backup with the half-restored database; this copy survives that.
    pub fn previous_path(&self) -> PathBuf {
        let mut name = self
            .backup_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".prev");
        self.backup_path.with_file_name(name)
    }

    /// Restore from the configured backup file, keeping a copy of it at
    /// [`previous_path`](Self::previous_path) first.
    pub fn restore_latest(&self, creds: &Credentials) -> Result<()> {
        if self.backup_path.is_file() {
            let previous = self.previous_path();
            std::fs::copy(&self.backup_path, &previous)?;
            tracing::debug!(path = %previous.display(), "kept copy of backup before restore");
        }
        self.restore(creds, &self.backup_path)
    }
}
