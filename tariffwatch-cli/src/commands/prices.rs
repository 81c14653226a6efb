//! Prices command - one update cycle.

use std::sync::Arc;

use anyhow::Result;
use tariffwatch_engie::{EngieApiClient, PriceSource, TokenProvider};
use tariffwatch_runtime::{CycleOutcome, UpdateCoordinator};
use tariffwatch_store::PriceStore;
use tracing::debug;

use super::{Paths, resume_session, runtime_config};
use crate::output::{JsonFormatter, PricesOutput, TextFormatter};
use crate::{Cli, OutputFormat};

/// Runs the prices command.
pub async fn run(cli: &Cli) -> Result<()> {
    let paths = Paths::from_cli(cli);
    let entry = paths.open_entry().await?;
    let config = runtime_config(&entry).await;
    let session = resume_session(&entry, &config).await?;

    let tokens: Arc<dyn TokenProvider> = session;
    let source: Arc<dyn PriceSource> =
        Arc::new(EngieApiClient::new(config.endpoints.clone(), config.http_timeout)?);
    let store = Arc::new(PriceStore::new(config.max_staleness));
    let coordinator = UpdateCoordinator::new(
        tokens,
        source,
        Arc::clone(&store),
        entry.entry().await.customer_number,
        config.update_interval,
    );

    match coordinator.refresh_now().await {
        CycleOutcome::Updated { contracts, skipped } => {
            debug!(contracts, skipped = skipped.len(), "Prices fetched");
        }
        CycleOutcome::Failed(e) => return Err(e.into()),
        CycleOutcome::Skipped => {}
    }

    let output = PricesOutput::new(&store.readings().await, &store.status().await);
    match cli.format {
        OutputFormat::Text => {
            println!("{}", TextFormatter::new(!cli.no_color).format_prices(&output));
        }
        OutputFormat::Json => {
            println!("{}", JsonFormatter::new(cli.pretty).format(&output)?);
        }
    }

    Ok(())
}
