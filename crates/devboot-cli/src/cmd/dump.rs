use devboot_core::{
    backup::{BackupManager, DumpOutcome},
    config::Config,
    credentials::{self, ProcessEnv},
};
use std::path::Path;

pub fn run(root: &Path, config: &Config) -> anyhow::Result<()> {
    let creds = credentials::require(&ProcessEnv, credentials::REQUIRED)?;
    let backup = BackupManager::from_config(root, config);

    match backup.dump(&creds)? {
        DumpOutcome::Written(path) => println!("Dumped '{}' to {}", creds.name, path.display()),
        DumpOutcome::Skipped => println!(
            "Dump skipped: '{}' is not installed",
            config.database.dump_utility
        ),
    }
    Ok(())
}
