use std::fmt;

/// Bootstrap states, in the only order they may be visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BootState {
    Start,
    PortFreed,
    CredentialsValid,
    RestoreRequested,
    SchemaRegenerated,
    MigrationsApplied,
    DumpRefreshedPreServe,
    Serving,
    Terminated,
}

impl BootState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BootState::Start => "start",
            BootState::PortFreed => "port_freed",
            BootState::CredentialsValid => "credentials_valid",
            BootState::RestoreRequested => "restore_requested",
            BootState::SchemaRegenerated => "schema_regenerated",
            BootState::MigrationsApplied => "migrations_applied",
            BootState::DumpRefreshedPreServe => "dump_refreshed_pre_serve",
            BootState::Serving => "serving",
            BootState::Terminated => "terminated",
        }
    }

    /// The state after `self`. `restore` decides whether the optional
    /// `RestoreRequested` state is visited. `None` once terminated.
    pub fn next(self, restore: bool) -> Option<BootState> {
        let next = match self {
            BootState::Start => BootState::PortFreed,
            BootState::PortFreed => BootState::CredentialsValid,
            BootState::CredentialsValid if restore => BootState::RestoreRequested,
            BootState::CredentialsValid => BootState::SchemaRegenerated,
            BootState::RestoreRequested => BootState::SchemaRegenerated,
            BootState::SchemaRegenerated => BootState::MigrationsApplied,
            BootState::MigrationsApplied => BootState::DumpRefreshedPreServe,
            BootState::DumpRefreshedPreServe => BootState::Serving,
            BootState::Serving => BootState::Terminated,
            BootState::Terminated => return None,
        };
        Some(next)
    }
}

impl fmt::Display for BootState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
