use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use roomlock::cli::{self, Cli, Command, ShellLine};
use roomlock::config::Config;
use roomlock::{DurableStore, KeyedLocks, ReservationService};

type Service = ReservationService<DurableStore, KeyedLocks>;

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries command output only
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let mut config = Config::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    roomlock::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(DurableStore::open(config.wal_path())?);
    let service = ReservationService::new(store.clone(), KeyedLocks::new())
        .with_lock_timeout(config.lock_timeout);

    let code = match cli.command {
        Command::Shell => {
            info!(
                wal = %store.path().display(),
                reservations = store.reservation_count(),
                "roomlock shell ready"
            );
            shell(&service).await?;
            info!(appends = store.wal_appends(), "roomlock shell closed");
            ExitCode::SUCCESS
        }
        command => match cli::execute(&service, command).await {
            Ok(out) => {
                if !out.is_empty() {
                    println!("{out}");
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        },
    };
    Ok(code)
}

/// Run commands from stdin until EOF, `quit`, ctrl-c or SIGTERM.
async fn shell(service: &Service) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    loop {
        #[cfg(unix)]
        let next = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
            _ = sigterm.recv() => None,
        };
        #[cfg(not(unix))]
        let next = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };

        let Some(line) = next else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" {
            break;
        }

        match ShellLine::parse_line(line) {
            Ok(command) => match cli::execute(service, command).await {
                Ok(out) => println!("{out}"),
                Err(e) => println!("error: {e}"),
            },
            Err(e) => {
                warn!(line, "unparsable command");
                println!("{e}");
            }
        }
    }
    Ok(())
}
