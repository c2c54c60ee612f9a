//! Open a store, recover its newest committed phase and check that the six
//! indexes agree.

use quadstore::{StatementStore, StoreConfig, StoreError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn run(config: &StoreConfig) -> Result<(), StoreError> {
    let store = StatementStore::open(config)?;
    let phases = store.recover()?;
    match phases.first() {
        Some(&phase_number) => store.select_phase(phase_number)?,
        None => {
            tracing::info!(directory = %config.directory.display(), "no committed phase, creating empty store");
            store.clear_default()?;
        }
    }

    let statements = store.check_integrity()?;
    tracing::info!(
        name = %config.name,
        phase_number = store.phase_number()?,
        statements,
        "integrity check passed"
    );
    println!("{store}");
    store.close()
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quadstore=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment variables
    let config = match StoreConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&config) {
        tracing::error!(category = ?e.category(), "{e}");
        std::process::exit(1);
    }
}
