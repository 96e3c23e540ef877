use std::path::PathBuf;

use boardmigrate::commands::migrate::Target;
use boardmigrate::error::Result;
use boardmigrate::output::Format;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "boardmigrate",
    version,
    about = "Convert legacy board data into labels and milestones"
)]
struct Cli {
    /// Output format
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    format: Format,
    /// Path to the application database
    #[arg(long, global = true, default_value = "board.db")]
    db: PathBuf,
    /// YAML file replacing the built-in label and/or milestone templates
    #[arg(long, global = true)]
    templates: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default labels for every team and link cards' legacy label names
    Labels,
    /// Create default (or legacy) milestones for every project without any
    Milestones,
    /// Show migrations recorded in the ledger
    Status,
}

fn run(cli: Cli) -> Result<()> {
    let templates = cli.templates.as_deref();
    let target = match cli.command {
        Commands::Labels => Target::Labels,
        Commands::Milestones => Target::Milestones,
        Commands::Status => return boardmigrate::commands::status::run(&cli.db, cli.format),
    };
    boardmigrate::commands::migrate::run(&cli.db, target, templates, cli.format)
}

/// JSON mode keeps stderr for the error object unless `RUST_LOG` asks for more.
fn init_logging(format: Format) {
    let default_filter = match format {
        Format::Json => "boardmigrate=warn",
        Format::Pretty => "boardmigrate=info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    let format = cli.format;
    init_logging(format);
    if let Err(e) = run(cli) {
        match format {
            Format::Json => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "error": e.code(),
                        "message": e.to_string()
                    })
                );
            }
            Format::Pretty => eprintln!("error: {e}"),
        }
        std::process::exit(1);
    }
}
