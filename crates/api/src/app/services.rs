use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use stockyard_events::InMemoryEventBus;
use stockyard_infra::blob::{BlobStore, FsBlobStore, MemoryBlobStore, NotifyingBlobStore, UrlSigner};
use stockyard_infra::config::{
    AppConfig, ConfigProvider, FileConfigProvider, FileTokenProvider, Settings, StaticConfigProvider,
    StaticTokenProvider, TokenProvider,
};
use stockyard_infra::ingest::{
    ConsumerRegistry, FileStatusStore, IngestPipeline, InventoryFormat, TemplateFormat,
};
use stockyard_infra::repository::{ItemRepository, JobRepository, TemplateRepository};
use stockyard_infra::services::{
    FileStatusService, HistoryService, InventoryService, JobService, TemplateService, UploadService,
};
use stockyard_infra::store::{InMemoryKeyedStore, KeyedStore, PostgresKeyedStore};
use stockyard_infra::wfm::{JobSyncClient, WfmClient};

/// Handler services shared by every route.
#[derive(Clone)]
pub struct AppServices {
    pub inventory: InventoryService,
    pub jobs: JobService,
    pub templates: TemplateService,
    pub history: HistoryService,
    pub uploads: UploadService,
    pub files: FileStatusService,
}

/// Wire backends from `settings` and start the ingestion consumers.
pub async fn build_services(settings: &Settings) -> anyhow::Result<AppServices> {
    let store: Arc<dyn KeyedStore> = match &settings.database_url {
        Some(url) => Arc::new(
            PostgresKeyedStore::connect(url)
                .await
                .context("connecting keyed store")?,
        ),
        None => {
            warn!("DATABASE_URL not set; using the in-memory keyed store");
            Arc::new(InMemoryKeyedStore::new())
        }
    };

    let backend: Arc<dyn BlobStore> = match &settings.blob_root {
        Some(root) => Arc::new(FsBlobStore::new(root)),
        None => {
            warn!("BLOB_ROOT not set; using the in-memory blob store");
            Arc::new(MemoryBlobStore::new())
        }
    };
    let notifying = NotifyingBlobStore::new(backend, Arc::new(InMemoryEventBus::new()));
    let notifications = notifying.subscribe();
    let blobs: Arc<dyn BlobStore> = Arc::new(notifying);

    let config: Arc<dyn ConfigProvider> = match &settings.app_config_path {
        Some(path) => Arc::new(FileConfigProvider::new(path)),
        None => Arc::new(StaticConfigProvider::new(AppConfig::default())),
    };
    let tokens: Arc<dyn TokenProvider> = match (&settings.wfm_token_path, &settings.wfm_token) {
        (Some(path), _) => Arc::new(FileTokenProvider::new(path)),
        (None, Some(token)) => Arc::new(StaticTokenProvider::new(token.clone())),
        (None, None) => {
            warn!("neither WFM_TOKEN_PATH nor WFM_TOKEN set; job sync will fail");
            Arc::new(StaticTokenProvider::empty())
        }
    };
    let sync: Arc<dyn JobSyncClient> = Arc::new(
        WfmClient::new(&settings.wfm_base_url, settings.wfm_account_id.clone(), tokens)
            .context("building WFM client")?,
    );

    let items = ItemRepository::new(store.clone());
    let jobs = JobRepository::new(store.clone());
    let templates = TemplateRepository::new(store.clone());

    let mut registry = ConsumerRegistry::new();
    registry.register(Arc::new(
        IngestPipeline::new(
            settings.upload_bucket.as_str(),
            InventoryFormat::new(items.clone(), config.clone()),
            blobs.clone(),
            store.clone(),
        )
        .with_budget(settings.ingest_budget),
    ))?;
    registry.register(Arc::new(
        IngestPipeline::new(
            settings.template_bucket.as_str(),
            TemplateFormat::new(templates.clone()),
            blobs.clone(),
            store.clone(),
        )
        .with_budget(settings.ingest_budget),
    ))?;
    // Detached: the consumer loop lives as long as the runtime.
    let _consumers = registry.spawn(notifications);
    info!(
        upload_bucket = %settings.upload_bucket,
        template_bucket = %settings.template_bucket,
        "ingestion consumers started"
    );

    Ok(AppServices {
        inventory: InventoryService::new(items, jobs.clone()),
        jobs: JobService::new(jobs.clone(), templates.clone(), sync, config),
        templates: TemplateService::new(templates),
        history: HistoryService::new(jobs),
        uploads: UploadService::new(
            UrlSigner::new(settings.upload_signing_secret.as_bytes(), &settings.public_base_url),
            blobs,
            settings.upload_bucket.as_str(),
            settings.template_bucket.as_str(),
            settings.upload_url_ttl,
        ),
        files: FileStatusService::new(FileStatusStore::new(store)),
    })
}
