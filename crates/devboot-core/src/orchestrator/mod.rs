//! Bootstrap state machine.
//!
//! Walks [`BootState`] strictly forward: free the port, arm the exit dump,
//! optionally restore, regenerate models, migrate, refresh dumps, then serve
//! in the foreground. The exit dump lives in an [`ExitGuard`] so it runs once
//! however the walk ends.

pub mod guard;
pub mod state;

pub use guard::ExitGuard;
pub use state::BootState;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backup::{BackupManager, DumpOutcome};
use crate::config::Config;
use crate::confirm::Confirm;
use crate::credentials::{Credentials, PASSWORD_CHANNEL};
use crate::error::{DevbootError, Result};
use crate::introspect::SchemaIntrospector;
use crate::port::PortReclaimer;
use crate::runner::{CommandRunner, RunOutcome};
use crate::signal::Interrupt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestoreMode {
    /// Ask through [`Confirm`].
    #[default]
    Prompt,
    Always,
    Never,
}

#[derive(Debug, Clone)]
pub struct BootOptions {
    pub restore: RestoreMode,
    pub introspect: bool,
}

impl Default for BootOptions {
    fn default() -> Self {
        Self {
            restore: RestoreMode::Prompt,
            introspect: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootReport {
    pub visited: Vec<BootState>,
    /// The server was stopped by an interrupt rather than exiting itself.
    pub interrupted: bool,
}

/// Build the exit action: dump with bound credentials, never failing.
pub fn exit_dump_guard(backup: BackupManager, creds: Credentials) -> ExitGuard {
    ExitGuard::new(move || match backup.dump(&creds) {
        Ok(DumpOutcome::Written(path)) => {
            tracing::info!(path = %path.display(), "exit dump written")
        }
        Ok(DumpOutcome::Skipped) => {}
        Err(e) => tracing::warn!(error = %e, "exit dump failed"),
    })
}

pub struct Bootstrap<'a> {
    root: PathBuf,
    config: Config,
    credentials: Credentials,
    options: BootOptions,
    reclaimer: PortReclaimer,
    backup: BackupManager,
    introspector: SchemaIntrospector,
    runner: CommandRunner,
    confirm: &'a dyn Confirm,
}

impl<'a> Bootstrap<'a> {
    /// Credentials are taken already validated, so the gate has run before
    /// any side effect.
    pub fn new(
        root: &Path,
        config: Config,
        credentials: Credentials,
        options: BootOptions,
        confirm: &'a dyn Confirm,
    ) -> Self {
        let runner =
            CommandRunner::new(root).with_env(PASSWORD_CHANNEL, credentials.password());
        Self {
            root: root.to_path_buf(),
            backup: BackupManager::from_config(root, &config),
            introspector: SchemaIntrospector::from_config(root, &config),
            reclaimer: PortReclaimer::for_platform(),
            runner,
            config,
            credentials,
            options,
            confirm,
        }
    }

    pub fn with_reclaimer(mut self, reclaimer: PortReclaimer) -> Self {
        self.reclaimer = reclaimer;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.runner = self.runner.with_grace(grace);
        self
    }

    pub async fn run(mut self, interrupt: &mut Interrupt) -> Result<BootReport> {
        let mut state = BootState::Start;
        let mut visited = vec![state];
        let mut guard: Option<ExitGuard> = None;
        let mut interrupted = false;

        loop {
            let restore = state == BootState::CredentialsValid && self.wants_restore();
            let Some(next) = state.next(restore) else {
                break;
            };
            tracing::debug!(from = %state, to = %next, "transition");
            if self.enter(next, &mut guard, interrupt).await? {
                interrupted = true;
            }
            state = next;
            visited.push(state);
        }

        drop(guard);
        Ok(BootReport {
            visited,
            interrupted,
        })
    }

    /// Perform the work of entering `state`. Returns true if the server was
    /// interrupted.
    async fn enter(
        &mut self,
        state: BootState,
        guard: &mut Option<ExitGuard>,
        interrupt: &mut Interrupt,
    ) -> Result<bool> {
        match state {
            BootState::Start | BootState::Terminated => {}
            BootState::PortFreed => {
                self.reclaimer.reclaim(self.config.port);
            }
            BootState::CredentialsValid => {
                tracing::debug!(
                    user = %self.credentials.user,
                    database = %self.credentials.name,
                    "exit dump armed"
                );
                *guard = Some(exit_dump_guard(
                    self.backup.clone(),
                    self.credentials.clone(),
                ));
            }
            BootState::RestoreRequested => {
                self.backup.restore_latest(&self.credentials)?;
            }
            BootState::SchemaRegenerated => {
                if self.options.introspect {
                    let tables = self.introspector.list_user_tables(&self.credentials);
                    self.introspector.regenerate_model_source(
                        &self.config.app,
                        &tables,
                        &self.credentials,
                    )?;
                } else {
                    tracing::info!("schema introspection disabled, skipping");
                }
            }
            BootState::MigrationsApplied => {
                for line in [
                    self.config.makemigrations_command(),
                    self.config.migrate_command(),
                ] {
                    self.step(state, &line, interrupt).await?;
                }
            }
            BootState::DumpRefreshedPreServe => {
                let export = self.config.export_path(&self.root);
                let line = self.config.export_data_command();
                if self.runner.run_to_file(&line, &export, interrupt).await?
                    == RunOutcome::Interrupted
                {
                    return Err(DevbootError::Interrupted(state.to_string()));
                }
                self.backup.dump(&self.credentials)?;
            }
            BootState::Serving => {
                tracing::info!(
                    port = self.config.port,
                    "starting server in the foreground, press CTRL+C to stop"
                );
                let line = self.config.serve_command();
                if self.runner.serve(&line, interrupt).await? == RunOutcome::Interrupted {
                    tracing::info!("received interrupt, server stopped");
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn step(&self, state: BootState, line: &str, interrupt: &mut Interrupt) -> Result<()> {
        match self.runner.run(line, interrupt).await? {
            RunOutcome::Completed => Ok(()),
            RunOutcome::Interrupted => Err(DevbootError::Interrupted(state.to_string())),
        }
    }

    fn wants_restore(&self) -> bool {
        match self.options.restore {
            RestoreMode::Always => true,
            RestoreMode::Never => false,
            RestoreMode::Prompt => self.confirm.confirm(&format!(
                "Restore database '{}' from {}? Existing tables will be overwritten",
                self.credentials.name,
                self.backup.backup_path().display()
            )),
        }
    }
}
