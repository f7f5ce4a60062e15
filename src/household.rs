use anyhow::Context;
use futures::FutureExt;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;

use crate::catalog::ActionCatalog;
use crate::db::run_in_tx;
use crate::id::new_uuid_v7;
use crate::model::Household;
use crate::time::now_ms;

/// Share code of the household provisioned for single tenancy. Nobody links
/// with it; it only makes the row findable on the next start.
pub const SINGLE_TENANT_SHARE_CODE: &str = "single-tenant";

/// How a chat user is mapped to a household.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HouseholdScope {
    /// Every chat user belongs to this one household.
    Fixed(Household),
    /// Chat users link themselves with a share code.
    Linked,
}

impl HouseholdScope {
    pub fn label(&self) -> &'static str {
        match self {
            HouseholdScope::Fixed(_) => "single",
            HouseholdScope::Linked => "multi",
        }
    }
}

async fn insert_household_rows(
    tx: &mut Transaction<'static, Sqlite>,
    household: &Household,
    catalog: &ActionCatalog,
    child_name: Option<&str>,
) -> Result<(), sqlx::Error> {
    let now = now_ms();
    sqlx::query(
        "INSERT INTO households (id, share_code, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
    )
    .bind(&household.id)
    .bind(&household.share_code)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    for (order, entry) in catalog.entries().iter().enumerate() {
        sqlx::query(
            "INSERT INTO actions (id, household_id, name, points, display_order, is_active, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
        )
        .bind(new_uuid_v7())
        .bind(&household.id)
        .bind(&entry.name)
        .bind(entry.points)
        .bind(order as i64)
        .bind(now)
        .execute(&mut **tx)
        .await?;
    }

    if let Some(name) = child_name {
        sqlx::query(
            "INSERT INTO children (id, household_id, name, total_points, cycle_points, created_at, updated_at) \
             VALUES (?1, ?2, ?3, 0, 0, ?4, ?4)",
        )
        .bind(new_uuid_v7())
        .bind(&household.id)
        .bind(name)
        .bind(now)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Household used in single tenancy, created with `catalog` and one child on
/// first call and returned unchanged afterwards.
pub async fn ensure_default_household(
    pool: &SqlitePool,
    catalog: &ActionCatalog,
    child_name: &str,
) -> anyhow::Result<Household> {
    let existing: Option<(String, String)> =
        sqlx::query_as("SELECT id, share_code FROM households WHERE share_code = ?")
            .bind(SINGLE_TENANT_SHARE_CODE)
            .fetch_optional(pool)
            .await
            .context("look up single-tenant household")?;
    if let Some((id, share_code)) = existing {
        return Ok(Household { id, share_code });
    }

    let household = Household {
        id: new_uuid_v7(),
        share_code: SINGLE_TENANT_SHARE_CODE.to_string(),
    };
    let seeded = household.clone();
    let catalog = catalog.clone();
    let child_name = child_name.to_string();
    run_in_tx(pool, move |tx| {
        async move { insert_household_rows(tx, &seeded, &catalog, Some(&child_name)).await }.boxed()
    })
    .await
    .context("seed single-tenant household")?;

    info!(
        target: "gohoubi",
        event = "single_tenant_household_seeded",
        household_id = %household.id
    );
    Ok(household)
}

/// Provision a household reachable through `share_code`, with the default
/// catalog and optionally a first child.
pub async fn create_household(
    pool: &SqlitePool,
    share_code: &str,
    child_name: Option<&str>,
) -> anyhow::Result<Household> {
    let share_code = share_code.trim();
    anyhow::ensure!(!share_code.is_empty(), "share code must not be empty");

    let household = Household {
        id: new_uuid_v7(),
        share_code: share_code.to_string(),
    };
    let seeded = household.clone();
    let catalog = ActionCatalog::default_catalog();
    let child_name = child_name.map(str::to_string);
    run_in_tx(pool, move |tx| {
        async move { insert_household_rows(tx, &seeded, &catalog, child_name.as_deref()).await }
            .boxed()
    })
    .await
    .with_context(|| format!("create household with share code {share_code}"))?;

    info!(
        target: "gohoubi",
        event = "household_created",
        household_id = %household.id
    );
    Ok(household)
}
