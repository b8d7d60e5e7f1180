//! ptysh: run a program on a pseudo-terminal.
//!
//! Interactive mode attaches the program to this terminal. Relay mode
//! drives it over plain stdin/stdout for use behind another transport.

mod commands;
mod config;
mod terminal;

use clap::{Parser, Subcommand};
use ptysh_core::PtySize;
use std::io::IsTerminal;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// ptysh: PTY shell runner
#[derive(Parser)]
#[command(name = "ptysh", version, about = "Run a shell or program on a pseudo-terminal")]
struct Cli {
    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<String>,

    /// User to run the child as (login name or numeric uid)
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// TERM value for the child
    #[arg(long, global = true)]
    term: Option<String>,

    /// Initial window rows
    #[arg(long, global = true)]
    rows: Option<u16>,

    /// Initial window columns
    #[arg(long, global = true)]
    cols: Option<u16>,

    /// Log filter (overrides RUST_LOG)
    #[arg(long = "log-level", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a program attached to this terminal (the default)
    Shell {
        /// Program and arguments; defaults to the login shell
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        argv: Vec<String>,
    },

    /// Relay a program's terminal over stdin/stdout
    Relay {
        /// Emit newline-delimited JSON events instead of raw bytes
        #[arg(long)]
        json: bool,

        /// Program and arguments; defaults to the login shell
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        argv: Vec<String>,
    },
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let config_path = cli
        .config
        .as_deref()
        .map(config::expand_tilde)
        .unwrap_or_else(config::Config::default_path);
    let cfg = match config::Config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ptysh: {e:#}");
            std::process::exit(1);
        }
    };

    let (argv, relay_json) = match cli.command {
        None => (Vec::new(), None),
        Some(Command::Shell { argv }) => (argv, None),
        Some(Command::Relay { json, argv }) => (argv, Some(json)),
    };

    let fallback_size = if std::io::stdout().is_terminal() {
        terminal::local_pty_size()
    } else {
        PtySize::default()
    };
    let opts = cfg.spawn_options(
        config::Overrides {
            argv,
            user: cli.user,
            term: cli.term,
            rows: cli.rows,
            cols: cli.cols,
        },
        fallback_size,
    );

    let result = match relay_json {
        Some(json) => commands::relay::run(opts, json).await,
        None => tokio::task::spawn_blocking(move || commands::shell::run(opts))
            .await
            .unwrap_or_else(|e| Err(e.into())),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("ptysh: {e:#}");
        std::process::exit(1);
    }
}
