#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::sync::Arc;

use chrono_tz::Tz;
use gohoubi_lib::{
    household::HouseholdScope, migrate, reward::RewardAccumulator, MemoryLedger, MessageHandler,
};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

/// 2026-10-19 12:00 in Tokyo.
pub const NOON_JST: i64 = 1_792_378_800_000;
/// 2026-10-18 23:59 in Tokyo, the day before [`NOON_JST`].
pub const YESTERDAY_LATE_JST: i64 = 1_792_335_540_000;
/// 2026-10-19 00:00 in Tokyo.
pub const MIDNIGHT_JST: i64 = 1_792_335_600_000;

pub const TOKYO: Tz = chrono_tz::Asia::Tokyo;

pub async fn temp_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect sqlite::memory:");
    sqlx::query("PRAGMA foreign_keys=ON;")
        .execute(&pool)
        .await
        .unwrap();
    pool
}

pub async fn migrated_pool() -> SqlitePool {
    let pool = temp_pool().await;
    migrate::apply_migrations(&pool).await.expect("migrations apply");
    pool
}

pub fn memory_handler(ledger: &Arc<MemoryLedger>, scope: HouseholdScope) -> MessageHandler {
    MessageHandler::new(ledger.clone(), scope, RewardAccumulator::new(100), TOKYO)
}
