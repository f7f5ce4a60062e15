//! Household setup outside the chat flow: children, actions and goals.
//!
//! Every operation addresses the household by share code and runs in one
//! transaction.

use anyhow::{anyhow, bail, ensure, Context};
use futures::FutureExt;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;

use crate::db::run_in_tx;
use crate::id::new_uuid_v7;
use crate::time::now_ms;

async fn household_id_for(
    tx: &mut Transaction<'static, Sqlite>,
    share_code: &str,
) -> anyhow::Result<String> {
    let id: Option<String> = sqlx::query_scalar("SELECT id FROM households WHERE share_code = ?")
        .bind(share_code)
        .fetch_optional(&mut **tx)
        .await?;
    id.ok_or_else(|| anyhow!("no household with share code {share_code}"))
}

async fn next_display_order(
    tx: &mut Transaction<'static, Sqlite>,
    table: &'static str,
    household_id: &str,
) -> anyhow::Result<i64> {
    let sql = format!("SELECT COALESCE(MAX(display_order) + 1, 0) FROM {table} WHERE household_id = ?");
    let order: i64 = sqlx::query_scalar(&sql)
        .bind(household_id)
        .fetch_one(&mut **tx)
        .await?;
    Ok(order)
}

/// Add a child. The first child added is the one chat messages credit.
pub async fn add_child(
    pool: &SqlitePool,
    share_code: &str,
    name: &str,
    nickname: Option<&str>,
) -> anyhow::Result<String> {
    let name = name.trim().to_string();
    ensure!(!name.is_empty(), "child name must not be empty");
    let share_code = share_code.to_string();
    let nickname = nickname.map(str::to_string);
    let id = new_uuid_v7();
    let child_id = id.clone();

    run_in_tx(pool, move |tx| {
        async move {
            let household_id = household_id_for(tx, &share_code).await?;
            let now = now_ms();
            sqlx::query(
                "INSERT INTO children (id, household_id, name, nickname, total_points, cycle_points, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, 0, 0, ?5, ?5)",
            )
            .bind(&child_id)
            .bind(&household_id)
            .bind(&name)
            .bind(&nickname)
            .bind(now)
            .execute(&mut **tx)
            .await?;
            info!(target: "gohoubi", event = "child_added", household_id = %household_id, child_id = %child_id);
            Ok::<(), anyhow::Error>(())
        }
        .boxed()
    })
    .await
    .context("add child")?;
    Ok(id)
}

/// Append an action to the end of the household's catalog. Active names are
/// unique within a household.
pub async fn add_action(
    pool: &SqlitePool,
    share_code: &str,
    name: &str,
    points: i64,
) -> anyhow::Result<String> {
    let name = name.trim().to_string();
    ensure!(!name.is_empty(), "action name must not be empty");
    ensure!(points > 0, "action points must be positive, got {points}");
    let share_code = share_code.to_string();
    let id = new_uuid_v7();
    let action_id = id.clone();

    run_in_tx(pool, move |tx| {
        async move {
            let household_id = household_id_for(tx, &share_code).await?;
            let clash: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM actions WHERE household_id = ? AND name = ? AND is_active = 1",
            )
            .bind(&household_id)
            .bind(&name)
            .fetch_one(&mut **tx)
            .await?;
            if clash > 0 {
                bail!("action {name} already exists");
            }

            let order = next_display_order(tx, "actions", &household_id).await?;
            let now = now_ms();
            sqlx::query(
                "INSERT INTO actions (id, household_id, name, points, display_order, is_active, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
            )
            .bind(&action_id)
            .bind(&household_id)
            .bind(&name)
            .bind(points)
            .bind(order)
            .bind(now)
            .execute(&mut **tx)
            .await?;
            info!(target: "gohoubi", event = "action_added", household_id = %household_id, action_id = %action_id, points);
            Ok::<(), anyhow::Error>(())
        }
        .boxed()
    })
    .await
    .context("add action")?;
    Ok(id)
}

/// Hide an action from detection. Its past records keep their name and points.
pub async fn deactivate_action(pool: &SqlitePool, share_code: &str, name: &str) -> anyhow::Result<()> {
    let share_code = share_code.to_string();
    let name = name.trim().to_string();

    run_in_tx(pool, move |tx| {
        async move {
            let household_id = household_id_for(tx, &share_code).await?;
            let res = sqlx::query(
                "UPDATE actions SET is_active = 0, updated_at = ? \
                 WHERE household_id = ? AND name = ? AND is_active = 1",
            )
            .bind(now_ms())
            .bind(&household_id)
            .bind(&name)
            .execute(&mut **tx)
            .await?;
            if res.rows_affected() == 0 {
                bail!("no active action named {name}");
            }
            info!(target: "gohoubi", event = "action_deactivated", household_id = %household_id, name = %name);
            Ok::<(), anyhow::Error>(())
        }
        .boxed()
    })
    .await
    .context("deactivate action")
}

pub async fn add_goal(
    pool: &SqlitePool,
    share_code: &str,
    title: &str,
    target_points: Option<i64>,
) -> anyhow::Result<String> {
    let title = title.trim().to_string();
    ensure!(!title.is_empty(), "goal title must not be empty");
    if let Some(target) = target_points {
        ensure!(target > 0, "goal target must be positive, got {target}");
    }
    let share_code = share_code.to_string();
    let id = new_uuid_v7();
    let goal_id = id.clone();

    run_in_tx(pool, move |tx| {
        async move {
            let household_id = household_id_for(tx, &share_code).await?;
            let order = next_display_order(tx, "goals", &household_id).await?;
            let now = now_ms();
            sqlx::query(
                "INSERT INTO goals (id, household_id, title, target_points, display_order, is_achieved, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
            )
            .bind(&goal_id)
            .bind(&household_id)
            .bind(&title)
            .bind(target_points)
            .bind(order)
            .bind(now)
            .execute(&mut **tx)
            .await?;
            info!(target: "gohoubi", event = "goal_added", household_id = %household_id, goal_id = %goal_id);
            Ok::<(), anyhow::Error>(())
        }
        .boxed()
    })
    .await
    .context("add goal")?;
    Ok(id)
}
