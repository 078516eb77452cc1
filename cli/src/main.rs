use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(
    name = "redline",
    version,
    about = "Redline CLI — simulated negotiation sessions and ledger inspection"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulated two-party negotiation end to end against the
    /// in-memory store and print the resulting ledger
    Simulate {
        /// Number of leaf clauses in the generated contract
        #[arg(long, default_value_t = 4)]
        clauses: usize,
        /// Milliseconds the simulated certifier spends per clause
        #[arg(long, env = "REDLINE_CERTIFY_MS", default_value_t = 50)]
        certify_ms: u64,
    },
    /// Replay an event log (JSON array of clause events) and print the
    /// derived agreed/queried sets
    Replay {
        /// Path to the event log file
        #[arg(long)]
        file: std::path::PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "redline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Simulate {
            clauses,
            certify_ms,
        } => commands::simulate::run(clauses, certify_ms).await,
        Commands::Replay { file } => commands::replay::run(&file),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
