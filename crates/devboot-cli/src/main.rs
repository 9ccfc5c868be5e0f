mod cmd;
mod prompt;
mod root;

use clap::{Parser, Subcommand};
use cmd::up::UpArgs;
use devboot_core::{config::Config, paths};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "devboot",
    about = "Local dev bootstrapper: free the port, sync the database, run the server",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from devboot.yaml or manage.py)
    #[arg(long, global = true, env = "DEVBOOT_ROOT")]
    root: Option<PathBuf>,

    /// Port to reclaim and serve on (overrides devboot.yaml)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// App whose models.py is regenerated (overrides devboot.yaml)
    #[arg(long, global = true)]
    app: Option<String>,

    /// Only log warnings and errors
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full bootstrap and serve in the foreground (default)
    Up(UpArgs),

    /// Dump the database to the backup file
    Dump,

    /// Restore the database from the backup file
    Restore {
        /// Don't ask for confirmation
        #[arg(long, short = 'y')]
        yes: bool,
        /// Restore from this file instead of the configured backup
        #[arg(long)]
        from: Option<PathBuf>,
    },

    /// Terminate whatever is listening on the port
    FreePort {
        /// Port to free (default: configured port)
        #[arg(value_name = "PORT")]
        target: Option<u16>,
        /// Only report who holds the port
        #[arg(long)]
        check: bool,
    },

    /// Regenerate the app's models.py from the live schema
    Introspect,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.quiet {
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    if let Err(e) = run(&root, cli.port, cli.app, cli.command) {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(
    root: &std::path::Path,
    port: Option<u16>,
    app: Option<String>,
    command: Option<Commands>,
) -> anyhow::Result<()> {
    // Variables already in the environment win over .env.
    match dotenvy::from_path(paths::env_path(root)) {
        Ok(()) => tracing::debug!("loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "could not load .env"),
    }

    let mut config = Config::load(root)?;
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(app) = app {
        config.app = app;
    }
    config.validate()?;

    match command.unwrap_or(Commands::Up(UpArgs::default())) {
        Commands::Up(args) => cmd::up::run(root, config, args),
        Commands::Dump => cmd::dump::run(root, &config),
        Commands::Restore { yes, from } => cmd::restore::run(root, &config, yes, from.as_deref()),
        Commands::FreePort { target, check } => {
            cmd::free_port::run(target.unwrap_or(config.port), check)
        }
        Commands::Introspect => cmd::introspect::run(root, &config),
    }
}
