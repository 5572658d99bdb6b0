use anyhow::Result;
use clap::{Parser, Subcommand};
use rsvp_schemas::NewGuest;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "rsvp")]
#[command(about = "RSVP notifier operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Database commands (DATABASE_URL)
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Print the attending-guest summary
    Guests,

    /// List records not yet notified
    Pending,

    /// Run a single reconcile tick and print its report
    Tick,
}

#[derive(Subcommand, Debug)]
enum DbCmd {
    Status,

    /// Apply embedded SQL migrations.
    Migrate,

    /// Insert a guest row (local testing).
    AddGuest {
        #[arg(long)]
        name: String,

        #[arg(long)]
        partner: Option<String>,

        #[arg(long)]
        wishes: Option<String>,

        /// Record the guest as not attending.
        #[arg(long, default_value_t = false)]
        declined: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => match cmd {
            DbCmd::Status => commands::db_status().await,
            DbCmd::Migrate => commands::db_migrate().await,
            DbCmd::AddGuest {
                name,
                partner,
                wishes,
                declined,
            } => {
                commands::db_add_guest(NewGuest {
                    name,
                    partner,
                    wishes,
                    attending: !declined,
                })
                .await
            }
        },
        Commands::Guests => commands::guests().await,
        Commands::Pending => commands::pending().await,
        Commands::Tick => commands::tick().await,
    }
}
