use std::{env, process::ExitCode, time::Duration};

use clap::{Parser, Subcommand};
use mexec_client::{CallOptions, ExecError, call};
use mexec_core::{DEFAULT_COLS, DEFAULT_ROWS, Endpoint, default_endpoint};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "mexec", about = "Machine exec client")]
struct Cli {
    /// Base URL of the machine-exec service; defaults to $MEXEC_ENDPOINT or ws://127.0.0.1:4444.
    #[arg(long)]
    endpoint: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Call a remote command in a separate container.
    Call {
        /// Container to run the command in.
        container: String,
        #[arg(long, default_value_t = DEFAULT_COLS)]
        cols: u16,
        #[arg(long, default_value_t = DEFAULT_ROWS)]
        rows: u16,
        #[arg(long)]
        tty: bool,
        /// How long to wait for the close handshake on shutdown.
        #[arg(long, default_value_t = 1000)]
        grace_ms: u64,
        /// Frames the service sends before the create response.
        #[arg(long, default_value_t = 1)]
        handshake_frames: usize,
        #[arg(last = true, required = true, num_args = 1..)]
        argv: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("mexec: {err}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<(), ExecError> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let endpoint = cli.endpoint.map(Endpoint::new).unwrap_or_else(default_endpoint);

    match cli.command {
        Command::Call {
            container,
            cols,
            rows,
            tty,
            grace_ms,
            handshake_frames,
            argv,
        } => {
            let mut options = CallOptions::new(endpoint, container, argv);
            options.cols = cols;
            options.rows = rows;
            options.tty = tty;
            options.grace = Duration::from_millis(grace_ms);
            options.ack_frames = handshake_frames;

            let mut stderr = tokio::io::stderr();
            let outcome = call(
                options,
                |name| env::var(name).ok(),
                interrupted(),
                tokio::io::stdout(),
                &mut stderr,
            )
            .await?;

            info!(
                channel_id = %outcome.channel_id,
                status = ?outcome.status,
                trigger = ?outcome.trigger,
                "session closed"
            );
            Ok(())
        }
    }
}

/// Completes on Ctrl-C; never completes if the handler cannot be installed.
async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for interrupt");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn call_parses_container_and_command() {
        let cli = Cli::try_parse_from([
            "mexec",
            "--endpoint",
            "ws://10.0.0.5:4444",
            "call",
            "tools",
            "--grace-ms",
            "250",
            "--",
            "sh",
            "-c",
            "go --version",
        ])
        .expect("arguments should parse");

        assert_eq!(cli.endpoint.as_deref(), Some("ws://10.0.0.5:4444"));
        let Command::Call {
            container,
            cols,
            rows,
            tty,
            grace_ms,
            handshake_frames,
            argv,
        } = cli.command;
        assert_eq!(container, "tools");
        assert_eq!((cols, rows, tty), (80, 24, false));
        assert_eq!(grace_ms, 250);
        assert_eq!(handshake_frames, 1);
        assert_eq!(argv, ["sh", "-c", "go --version"]);
    }

    #[test]
    fn call_requires_a_command() {
        assert!(Cli::try_parse_from(["mexec", "call", "tools"]).is_err());
    }
}
