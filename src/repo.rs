use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Error as SqlxError, Row, SqlitePool};

use crate::{
    error::{AppError, LedgerError, LedgerResult},
    id::new_uuid_v7,
    ledger::{LinkResult, PointLedger},
    model::{Action, Child, Goal, Household, NewRecord, PointTotals, Record},
    time::{now_ms, DayWindow},
};

const CHILD_COLUMNS: &str = "id, household_id, name, nickname, total_points, cycle_points";
const RECORD_COLUMNS: &str =
    "id, child_id, action_id, action_name, points, recorded_at, source";

fn storage(err: SqlxError, operation: &'static str) -> LedgerError {
    LedgerError::Storage(AppError::from(err).with_context("operation", operation))
}

fn deserialize_child(row: SqliteRow) -> LedgerResult<Child> {
    Ok(Child {
        id: row.try_get("id").map_err(|e| storage(e, "child_decode"))?,
        household_id: row
            .try_get("household_id")
            .map_err(|e| storage(e, "child_decode"))?,
        name: row.try_get("name").map_err(|e| storage(e, "child_decode"))?,
        nickname: row
            .try_get::<Option<String>, _>("nickname")
            .map_err(|e| storage(e, "child_decode"))?,
        total_points: row
            .try_get("total_points")
            .map_err(|e| storage(e, "child_decode"))?,
        cycle_points: row
            .try_get("cycle_points")
            .map_err(|e| storage(e, "child_decode"))?,
    })
}

fn deserialize_record(row: SqliteRow) -> LedgerResult<Record> {
    Ok(Record {
        id: row.try_get("id").map_err(|e| storage(e, "record_decode"))?,
        child_id: row
            .try_get("child_id")
            .map_err(|e| storage(e, "record_decode"))?,
        action_id: row
            .try_get::<Option<String>, _>("action_id")
            .map_err(|e| storage(e, "record_decode"))?,
        action_name: row
            .try_get("action_name")
            .map_err(|e| storage(e, "record_decode"))?,
        points: row.try_get("points").map_err(|e| storage(e, "record_decode"))?,
        recorded_at: row
            .try_get("recorded_at")
            .map_err(|e| storage(e, "record_decode"))?,
        source: row.try_get("source").map_err(|e| storage(e, "record_decode"))?,
    })
}

fn deserialize_action(row: SqliteRow) -> LedgerResult<Action> {
    let is_active: i64 = row
        .try_get("is_active")
        .map_err(|e| storage(e, "action_decode"))?;
    Ok(Action {
        id: row.try_get("id").map_err(|e| storage(e, "action_decode"))?,
        household_id: row
            .try_get("household_id")
            .map_err(|e| storage(e, "action_decode"))?,
        name: row.try_get("name").map_err(|e| storage(e, "action_decode"))?,
        points: row.try_get("points").map_err(|e| storage(e, "action_decode"))?,
        is_active: is_active != 0,
        display_order: row
            .try_get("display_order")
            .map_err(|e| storage(e, "action_decode"))?,
    })
}

fn deserialize_goal(row: SqliteRow) -> LedgerResult<Goal> {
    let is_achieved: i64 = row
        .try_get("is_achieved")
        .map_err(|e| storage(e, "goal_decode"))?;
    Ok(Goal {
        id: row.try_get("id").map_err(|e| storage(e, "goal_decode"))?,
        household_id: row
            .try_get("household_id")
            .map_err(|e| storage(e, "goal_decode"))?,
        title: row.try_get("title").map_err(|e| storage(e, "goal_decode"))?,
        target_points: row
            .try_get::<Option<i64>, _>("target_points")
            .map_err(|e| storage(e, "goal_decode"))?,
        display_order: row
            .try_get("display_order")
            .map_err(|e| storage(e, "goal_decode"))?,
        is_achieved: is_achieved != 0,
    })
}

fn is_unique_violation(err: &SqlxError) -> bool {
    match err {
        SqlxError::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

/// [`PointLedger`] backed by the application's SQLite database.
#[derive(Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PointLedger for SqliteLedger {
    async fn child(&self, child_id: &str) -> LedgerResult<Child> {
        let sql = format!("SELECT {CHILD_COLUMNS} FROM children WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(child_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage(e, "child_get"))?;
        match row {
            Some(row) => deserialize_child(row),
            None => Err(LedgerError::not_found("child", child_id)),
        }
    }

    async fn children(&self, household_id: &str) -> LedgerResult<Vec<Child>> {
        let sql = format!(
            "SELECT {CHILD_COLUMNS} FROM children WHERE household_id = ? ORDER BY created_at, id"
        );
        let rows = sqlx::query(&sql)
            .bind(household_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage(e, "children_list"))?;
        rows.into_iter().map(deserialize_child).collect()
    }

    async fn update_child_points(
        &self,
        child_id: &str,
        expected: PointTotals,
        next: PointTotals,
    ) -> LedgerResult<bool> {
        let res = sqlx::query(
            "UPDATE children SET total_points = ?1, cycle_points = ?2, updated_at = ?3 \
             WHERE id = ?4 AND total_points = ?5 AND cycle_points = ?6",
        )
        .bind(next.total_points)
        .bind(next.cycle_points)
        .bind(now_ms())
        .bind(child_id)
        .bind(expected.total_points)
        .bind(expected.cycle_points)
        .execute(&self.pool)
        .await
        .map_err(|e| storage(e, "child_points_update"))?;
        if res.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM children WHERE id = ?")
            .bind(child_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage(e, "child_points_update_lookup"))?;
        match exists {
            Some(_) => Ok(false),
            None => Err(LedgerError::not_found("child", child_id)),
        }
    }

    async fn append_record(&self, record: NewRecord) -> LedgerResult<Record> {
        let id = new_uuid_v7();
        sqlx::query(
            "INSERT INTO records (id, child_id, action_id, action_name, points, recorded_at, source) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&id)
        .bind(&record.child_id)
        .bind(&record.action_id)
        .bind(&record.action_name)
        .bind(record.points)
        .bind(record.recorded_at)
        .bind(&record.source)
        .execute(&self.pool)
        .await
        .map_err(|e| storage(e, "record_append"))?;

        Ok(Record {
            id,
            child_id: record.child_id,
            action_id: record.action_id,
            action_name: record.action_name,
            points: record.points,
            recorded_at: record.recorded_at,
            source: record.source,
        })
    }

    async fn today_records(&self, child_id: &str, window: DayWindow) -> LedgerResult<Vec<Record>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records \
             WHERE child_id = ? AND recorded_at >= ? AND recorded_at < ? \
             ORDER BY recorded_at, id"
        );
        let rows = sqlx::query(&sql)
            .bind(child_id)
            .bind(window.start_ms)
            .bind(window.end_ms)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage(e, "records_today"))?;
        rows.into_iter().map(deserialize_record).collect()
    }

    async fn actions(&self, household_id: &str) -> LedgerResult<Vec<Action>> {
        let rows = sqlx::query(
            "SELECT id, household_id, name, points, is_active, display_order FROM actions \
             WHERE household_id = ? AND is_active = 1 ORDER BY display_order, created_at, id",
        )
        .bind(household_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage(e, "actions_list"))?;
        rows.into_iter().map(deserialize_action).collect()
    }

    async fn goals(&self, household_id: &str) -> LedgerResult<Vec<Goal>> {
        let rows = sqlx::query(
            "SELECT id, household_id, title, target_points, display_order, is_achieved FROM goals \
             WHERE household_id = ? AND is_achieved = 0 ORDER BY display_order, created_at, id",
        )
        .bind(household_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage(e, "goals_list"))?;
        rows.into_iter().map(deserialize_goal).collect()
    }

    async fn household_by_chat_user(&self, chat_user_id: &str) -> LedgerResult<Option<Household>> {
        let row = sqlx::query(
            "SELECT h.id, h.share_code FROM chat_user_links l \
             JOIN households h ON h.id = l.household_id WHERE l.chat_user_id = ?",
        )
        .bind(chat_user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage(e, "household_by_chat_user"))?;
        row.map(|row| {
            Ok(Household {
                id: row.try_get("id").map_err(|e| storage(e, "household_decode"))?,
                share_code: row
                    .try_get("share_code")
                    .map_err(|e| storage(e, "household_decode"))?,
            })
        })
        .transpose()
    }

    async fn link_chat_user(
        &self,
        chat_user_id: &str,
        share_code: &str,
    ) -> LedgerResult<LinkResult> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage(e, "chat_user_link_begin"))?;

        let existing: Option<String> =
            sqlx::query_scalar("SELECT household_id FROM chat_user_links WHERE chat_user_id = ?")
                .bind(chat_user_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| storage(e, "chat_user_link_lookup"))?;
        if existing.is_some() {
            tx.rollback().await.ok();
            return Ok(LinkResult::AlreadyLinked);
        }

        let household: Option<(String, String)> =
            sqlx::query_as("SELECT id, share_code FROM households WHERE share_code = ?")
                .bind(share_code)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| storage(e, "household_by_share_code"))?;
        let Some((household_id, code)) = household else {
            tx.rollback().await.ok();
            return Ok(LinkResult::InvalidCode);
        };

        let inserted = sqlx::query(
            "INSERT INTO chat_user_links (chat_user_id, household_id, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(chat_user_id)
        .bind(&household_id)
        .bind(now_ms())
        .execute(&mut *tx)
        .await;
        if let Err(err) = inserted {
            tx.rollback().await.ok();
            if is_unique_violation(&err) {
                return Ok(LinkResult::AlreadyLinked);
            }
            return Err(storage(err, "chat_user_link_insert"));
        }

        tx.commit()
            .await
            .map_err(|e| storage(e, "chat_user_link_commit"))?;
        Ok(LinkResult::Linked(Household {
            id: household_id,
            share_code: code,
        }))
    }
}
