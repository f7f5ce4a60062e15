use std::sync::Arc;

use anyhow::Context;
use sqlx::SqlitePool;

pub mod catalog;
pub mod compose;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod household;
pub mod household_link;
pub mod id;
pub mod intent;
pub mod ledger;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod provision;
pub mod repo;
pub mod reward;
pub mod server;
pub mod state;
pub mod time;
mod util;

pub use error::{AppError, AppResult, LedgerError, LedgerResult};
pub use handler::MessageHandler;
pub use ledger::{LinkResult, MemoryLedger, PointLedger};
pub use repo::SqliteLedger;
pub use state::AppState;

use crate::catalog::ActionCatalog;
use crate::config::{Settings, Tenancy};
use crate::household::HouseholdScope;
use crate::reward::RewardAccumulator;

/// Open the configured database and bring its schema up to date.
pub async fn open_database(settings: &Settings) -> anyhow::Result<SqlitePool> {
    let url = settings.database_url()?;
    let pool = db::open_sqlite_pool(&url).await?;
    migrate::apply_migrations(&pool)
        .await
        .context("apply migrations")?;
    Ok(pool)
}

/// Handler over `pool` for the configured tenancy. Single tenancy provisions
/// its household on first use.
pub async fn build_handler(settings: &Settings, pool: SqlitePool) -> anyhow::Result<MessageHandler> {
    let accumulator = RewardAccumulator::new(settings.reward_threshold);
    let ledger = SqliteLedger::new(pool.clone());
    let scope = match settings.tenancy {
        Tenancy::Single => {
            let household = household::ensure_default_household(
                &pool,
                &ActionCatalog::default_catalog(),
                &settings.default_child_name,
            )
            .await?;
            let catalog = ActionCatalog::from_actions(ledger.actions(&household.id).await?);
            accumulator.check_catalog(&catalog, &household.id);
            HouseholdScope::Fixed(household)
        }
        Tenancy::Multi => HouseholdScope::Linked,
    };
    tracing::info!(
        target: "gohoubi",
        event = "handler_ready",
        tenancy = scope.label(),
        reward_threshold = settings.reward_threshold,
        timezone = %settings.timezone
    );

    Ok(MessageHandler::new(
        Arc::new(ledger),
        scope,
        accumulator,
        settings.timezone()?,
    ))
}

/// Share code a provisioning command works on. In single tenancy the fixed
/// household is created first when the command names none.
pub async fn provisioning_target(
    settings: &Settings,
    pool: &SqlitePool,
    share_code: Option<&str>,
) -> anyhow::Result<String> {
    let target = settings.target_share_code(share_code)?;
    if target == household::SINGLE_TENANT_SHARE_CODE && settings.tenancy == Tenancy::Single {
        household::ensure_default_household(
            pool,
            &ActionCatalog::default_catalog(),
            &settings.default_child_name,
        )
        .await?;
    }
    Ok(target)
}
