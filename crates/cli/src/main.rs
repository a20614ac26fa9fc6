//! GoMarketplace CLI - Inspect and edit the persisted cart.
//!
//! # Usage
//!
//! ```bash
//! # Show the cart with line totals and subtotal
//! gm-cli show
//!
//! # Add one unit of a product (appends it or bumps its quantity)
//! gm-cli add --id shirt-01 --title "Shirt" --image-url https://cdn.example.com/shirt.png --price 19.90
//!
//! # Change the quantity of a product already in the cart
//! gm-cli increment shirt-01
//! gm-cli decrement shirt-01
//!
//! # Replace an unreadable stored cart with an empty one
//! gm-cli clear
//! ```
//!
//! # Environment Variables
//!
//! See `go_marketplace_cart::config`. `RUST_LOG` overrides the log filter.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use commands::cart::CommandError;
use go_marketplace_cart::{CartConfig, CartError, LogFormat};
use rust_decimal::Decimal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "gm-cli")]
#[command(author, version, about = "GoMarketplace cart tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the cart
    Show,
    /// Add one unit of a product
    Add {
        /// Product identifier
        #[arg(long)]
        id: String,

        /// Display title
        #[arg(long)]
        title: String,

        /// Product image URL
        #[arg(long, default_value = "")]
        image_url: String,

        /// Unit price (e.g. 19.90)
        #[arg(long)]
        price: Decimal,
    },
    /// Add one unit of a product already in the cart
    Increment {
        /// Product identifier
        id: String,
    },
    /// Remove one unit of a product (removes the line at zero)
    Decrement {
        /// Product identifier
        id: String,
    },
    /// Empty the stored cart without reading it (recovers a corrupt cart)
    Clear,
}

/// Install the tracing subscriber for the configured format.
fn init_tracing(format: LogFormat) {
    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "go_marketplace_cart=info,gm_cli=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match CartConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(LogFormat::Text);
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };
    init_tracing(config.log_format);

    if let Err(e) = run(cli, &config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &CartConfig) -> Result<(), CommandError> {
    if matches!(cli.command, Commands::Clear) {
        commands::cart::clear(config).await?;
        tracing::info!("Cart cleared");
        return Ok(());
    }

    let session = commands::cart::open(config).await.inspect_err(|e| {
        if matches!(e, CommandError::Cart(CartError::CorruptPayload(_))) {
            tracing::warn!("Run `gm-cli clear` to discard the stored cart");
        }
    })?;

    let result = match cli.command {
        Commands::Show | Commands::Clear => Ok(()),
        Commands::Add {
            id,
            title,
            image_url,
            price,
        } => commands::cart::add(&session, &id, title, image_url, price).await,
        Commands::Increment { id } => commands::cart::increment(&session, &id).await,
        Commands::Decrement { id } => commands::cart::decrement(&session, &id).await,
    };

    // Print whatever the cart holds now, including after a failed save.
    if let Ok(snapshot) = session.snapshot() {
        commands::cart::print(&snapshot.cart);
    }
    session.end().await;

    result
}
