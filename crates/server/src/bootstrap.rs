use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use tafel_core::config::{AppConfig, ConfigError, LoadOptions};
use tafel_core::identity::StaticIdentityProvider;
use tafel_core::send::{PaymentLinkProvider, SendFlow};
use tafel_db::repositories::RepositoryError;
use tafel_db::{connect_with_settings, fixtures, migrations, DbPool, SqlActivityLog, SqlOfferStore};

use crate::offers::ComposerState;
use crate::payments::{DisabledPaymentLinks, StripePaymentLinks};
use crate::quotation::{build_templates, TeraOfferEmail, TeraQuotationDocument};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub composer: ComposerState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("template setup failed: {0}")]
    Templates(#[source] tera::Error),
    #[error("demo seed failed: {0}")]
    Seed(#[source] RepositoryError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let demo_inquiry = fixtures::seed_demo_inquiry(&db_pool).await.map_err(BootstrapError::Seed)?;
    info!(
        event_name = "system.bootstrap.demo_seeded",
        inquiry_id = %demo_inquiry.0,
        "demo inquiry available"
    );

    let templates = Arc::new(build_templates(&config.email).map_err(BootstrapError::Templates)?);

    let payments: Arc<dyn PaymentLinkProvider> = match (config.stripe.enabled, &config.stripe.secret_key) {
        (true, Some(secret_key)) => Arc::new(StripePaymentLinks::new(
            config.stripe.api_base_url.clone(),
            secret_key.clone(),
        )),
        _ => Arc::new(DisabledPaymentLinks),
    };

    let activity = Arc::new(SqlActivityLog::new(db_pool.clone()));
    let flow = Arc::new(SendFlow::new(
        payments,
        Arc::new(TeraOfferEmail::new(Arc::clone(&templates), config.email.sender_name.clone())),
        Arc::new(TeraQuotationDocument::new(templates)),
        activity.clone(),
    ));

    let composer = ComposerState::new(
        Arc::new(SqlOfferStore::new(db_pool.clone())),
        Arc::new(StaticIdentityProvider::new(config.email.sender_address.clone())),
        activity,
        config.autosave.policy(),
        Arc::new(fixtures::demo_catalog()),
        flow,
    );

    Ok(Application { config, db_pool, composer })
}
