use crate::prompt::TerminalConfirm;
use anyhow::Context;
use clap::Args;
use devboot_core::{
    config::Config,
    credentials::{self, ProcessEnv},
    orchestrator::{BootOptions, Bootstrap, RestoreMode},
    signal::Interrupt,
};
use std::path::Path;

#[derive(Args, Debug, Default)]
pub struct UpArgs {
    /// Restore the database from the backup without asking
    #[arg(long, conflicts_with = "no_restore")]
    pub restore: bool,

    /// Keep the current database without asking
    #[arg(long)]
    pub no_restore: bool,

    /// Don't regenerate models.py from the live schema
    #[arg(long)]
    pub skip_introspect: bool,
}

impl UpArgs {
    fn restore_mode(&self) -> RestoreMode {
        if self.restore {
            RestoreMode::Always
        } else if self.no_restore {
            RestoreMode::Never
        } else {
            RestoreMode::Prompt
        }
    }
}

pub fn run(root: &Path, config: Config, args: UpArgs) -> anyhow::Result<()> {
    // Checked before the port is touched: nothing happens without credentials.
    let creds = credentials::require(&ProcessEnv, credentials::REQUIRED)?;

    let options = BootOptions {
        restore: args.restore_mode(),
        introspect: !args.skip_introspect,
    };
    let confirm = TerminalConfirm;

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async {
        let mut interrupt = Interrupt::listen().context("failed to install signal handlers")?;
        let report = Bootstrap::new(root, config, creds, options, &confirm)
            .run(&mut interrupt)
            .await?;
        anyhow::Ok(report)
    })?;

    if report.interrupted {
        eprintln!("Interrupted, server stopped.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restore_mode_from_flags() {
        assert_eq!(UpArgs::default().restore_mode(), RestoreMode::Prompt);
        let args = UpArgs {
            restore: true,
            ..UpArgs::default()
        };
        assert_eq!(args.restore_mode(), RestoreMode::Always);
        let args = UpArgs {
            no_restore: true,
            ..UpArgs::default()
        };
        assert_eq!(args.restore_mode(), RestoreMode::Never);
    }
}
