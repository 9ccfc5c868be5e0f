use crate::prompt::TerminalConfirm;
use devboot_core::{
    backup::BackupManager,
    config::Config,
    confirm::Confirm,
    credentials::{self, ProcessEnv},
    DevbootError,
};
use std::path::Path;

pub fn run(root: &Path, config: &Config, yes: bool, from: Option<&Path>) -> anyhow::Result<()> {
    let creds = credentials::require(&ProcessEnv, credentials::REQUIRED)?;
    let backup = BackupManager::from_config(root, config);
    let source = match from {
        Some(p) => root.join(p),
        None => backup.backup_path().to_path_buf(),
    };

    // Report a missing file before asking anything.
    if !source.is_file() {
        return Err(DevbootError::MissingDumpFile(source).into());
    }

    let question = format!(
        "Restore database '{}' from {}? Existing tables will be overwritten",
        creds.name,
        source.display()
    );
    if !yes && !TerminalConfirm.confirm(&question) {
        println!("Restore skipped.");
        return Ok(());
    }

    backup.restore(&creds, &source)?;
    println!("Restored '{}' from {}", creds.name, source.display());
    Ok(())
}
