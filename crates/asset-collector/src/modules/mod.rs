//! Collection workflows behind the CLI commands.

pub mod history;
pub mod quotes;
pub mod symbol_sync;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use asset_core::{Normalizer, SchemaRegistry};
use asset_data::{ChunkedSink, PgStore, SourceAdapter};

use crate::coordinator::{Coordinator, CoordinatorConfig};
use crate::summary::RunSummary;
use crate::{CollectorConfig, Result};

pub use history::collect_history;
pub use quotes::{collect_quotes, QuoteSource};
pub use symbol_sync::{sync_set_symbols, sync_sp500};

/// Shared handles for one CLI invocation.
pub struct Context {
    pub config: CollectorConfig,
    pub store: PgStore,
    pub sink: Arc<ChunkedSink>,
    pub normalizer: Normalizer,
    pub coordinator: CoordinatorConfig,
    pub cancel: CancellationToken,
}

impl Context {
    /// Registry with the built-in schemas plus any configured aliases.
    pub fn registry(config: &CollectorConfig) -> Result<SchemaRegistry> {
        let mut registry = SchemaRegistry::builtin();
        if let Some(path) = &config.aliases_file {
            let overrides = SchemaRegistry::load_aliases(path)?;
            registry.apply_aliases(&overrides)?;
            info!(path = %path.display(), "field aliases loaded");
        }
        Ok(registry)
    }

    /// Create the schema and tables if missing.
    pub async fn init_db(&self) -> Result<()> {
        let schemas: Vec<_> = [
            asset_core::LATEST_PRICES,
            asset_core::STOCK_PRICES,
            asset_core::SET_SYMBOLS,
            asset_core::SP500_SYMBOLS,
        ]
        .iter()
        .filter_map(|name| self.normalizer.registry().latest(name))
        .collect();

        self.store.bootstrap(&schemas).await?;
        Ok(())
    }

    /// Run `adapter` over `entities` through the coordinator.
    pub async fn ingest<A: SourceAdapter>(
        &self,
        adapter: A,
        entities: Vec<A::Entity>,
    ) -> Result<RunSummary> {
        let coordinator = Coordinator::new(
            adapter,
            self.normalizer.clone(),
            Arc::clone(&self.sink),
            self.coordinator.clone(),
        )
        .with_cancellation(self.cancel.clone());

        Ok(coordinator.run(entities).await?)
    }
}
