//! Rewards ledger CLI - migrations, credentials and key material.
//!
//! # Usage
//!
//! ```bash
//! # Run ledger database migrations
//! rl-cli migrate
//!
//! # Mint a bearer credential for a user
//! rl-cli token issue --sub u1 --email u1@example.com --ttl-secs 3600
//!
//! # Generate a value for LEDGER_TOKEN_SECRET
//! rl-cli keygen
//!
//! # Hash the break-glass operator password (read from stdin)
//! rl-cli bootstrap hash-password < password.txt
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "rl-cli")]
#[command(author, version, about = "Rewards ledger CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Mint bearer credentials
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
    /// Print a random signing secret for `LEDGER_TOKEN_SECRET`
    Keygen,
    /// Break-glass operator login helpers
    Bootstrap {
        #[command(subcommand)]
        action: BootstrapAction,
    },
}

#[derive(Subcommand)]
enum TokenAction {
    /// Issue a user credential
    Issue {
        /// Subject (user id)
        #[arg(long)]
        sub: String,

        /// Email claim
        #[arg(long)]
        email: Option<String>,

        /// Lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl_secs: u64,
    },
}

#[derive(Subcommand)]
enum BootstrapAction {
    /// Read a password from stdin and print its argon2 hash
    HashPassword,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

#[allow(clippy::print_stdout)]
async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Token { action } => match action {
            TokenAction::Issue {
                sub,
                email,
                ttl_secs,
            } => {
                let token = commands::token::issue(&sub, email.as_deref(), ttl_secs)?;
                println!("{token}");
            }
        },
        Commands::Keygen => println!("{}", commands::keygen::generate()?),
        Commands::Bootstrap { action } => match action {
            BootstrapAction::HashPassword => {
                let hash = commands::bootstrap::hash_from_reader(std::io::stdin().lock())?;
                println!("{hash}");
            }
        },
    }
    Ok(())
}
