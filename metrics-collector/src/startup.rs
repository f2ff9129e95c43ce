//! Application wiring and the run lifecycle.

use crate::catalog::BillingCatalog;
use crate::clients::{ClusterClient, ClusterSource, ExoscaleClient, UsageSource};
use crate::config::{CollectorConfig, Job};
use crate::jobs::collect_usage;
use crate::services::{
    Database, MemoryStore, ReportingStore, RunReport, TracingObserver, UsageRecorder,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Where facts are written.
enum Backend {
    Postgres(Database),
    Memory(MemoryStore),
}

pub struct Application {
    job: Job,
    recorder: UsageRecorder,
    cluster: Arc<dyn ClusterSource>,
    usage: Arc<dyn UsageSource>,
    backend: Backend,
}

impl Application {
    /// Build the application with the given configuration: connect the
    /// reporting store, apply migrations when asked and seed the catalog.
    pub async fn build(config: CollectorConfig) -> Result<Self, AppError> {
        let catalog = match &config.catalog_path {
            Some(path) => BillingCatalog::load(path)?,
            None => BillingCatalog::exoscale_default(),
        };

        let backend = if config.dry_run {
            info!("Dry run, facts are kept in memory");
            Backend::Memory(MemoryStore::new())
        } else {
            let settings = config.database.as_ref().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("database configuration is missing"))
            })?;
            let database = Database::new(
                settings.url.expose_secret(),
                settings.max_connections,
                settings.min_connections,
            )
            .await?;
            database.health_check().await?;
            if config.run_migrations {
                database.run_migrations().await?;
            }
            Backend::Postgres(database)
        };

        let cluster = Arc::new(ClusterClient::new(&config.cluster)?);
        let usage = Arc::new(ExoscaleClient::new(&config.exoscale)?);

        Self::assemble(&config, catalog, backend, cluster, usage).await
    }

    /// Build against an in-memory store and the given collaborators.
    pub async fn in_memory(
        config: &CollectorConfig,
        catalog: BillingCatalog,
        store: MemoryStore,
        cluster: Arc<dyn ClusterSource>,
        usage: Arc<dyn UsageSource>,
    ) -> Result<Self, AppError> {
        Self::assemble(config, catalog, Backend::Memory(store), cluster, usage).await
    }

    async fn assemble(
        config: &CollectorConfig,
        catalog: BillingCatalog,
        backend: Backend,
        cluster: Arc<dyn ClusterSource>,
        usage: Arc<dyn UsageSource>,
    ) -> Result<Self, AppError> {
        let store: Arc<dyn ReportingStore> = match &backend {
            Backend::Postgres(database) => Arc::new(database.clone()),
            Backend::Memory(memory) => Arc::new(memory.clone()),
        };

        let recorder = UsageRecorder::new(
            store,
            Arc::new(catalog),
            config.billing_date(),
            Arc::new(TracingObserver),
        );
        recorder.initialize().await?;

        Ok(Self {
            job: config.job,
            recorder,
            cluster,
            usage,
            backend,
        })
    }

    /// Collect usage and save it. Fetch failures are returned; bucket
    /// failures are part of the report.
    #[instrument(skip_all, fields(job = self.job.as_str()))]
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunReport, AppError> {
        info!(
            billing_date = %self.recorder.billing_date().date_naive(),
            "Starting collection run"
        );

        let buckets = collect_usage(self.job, self.cluster.as_ref(), self.usage.as_ref()).await?;
        let report = self.recorder.save_usage(&buckets, cancel).await;

        if let Backend::Memory(memory) = &self.backend {
            let data = memory.snapshot()?;
            info!(
                tenants = data.tenants.len(),
                categories = data.categories.len(),
                facts = data.facts.len(),
                "Dry run result"
            );
        }
        Ok(report)
    }

    pub async fn shutdown(self) {
        if let Backend::Postgres(database) = self.backend {
            database.close().await;
        }
    }
}
