//! Per-message pipeline: classify, mutate, compose.
//!
//! [`MessageHandler::handle`] never fails outward. Storage failures and
//! panics both come back as the fixed retry text and are logged with the
//! detail.

use std::sync::Arc;

use chrono_tz::Tz;
use serde_json::json;

use crate::catalog::{ActionCatalog, CatalogEntry};
use crate::compose::{compose, Reply};
use crate::error::{AppError, LedgerError, LedgerResult};
use crate::household::HouseholdScope;
use crate::household_link::HouseholdLinker;
use crate::intent::{classify, Intent};
use crate::ledger::{LinkResult, PointLedger};
use crate::logging::MessageScope;
use crate::model::{Child, NewRecord, TodaySummary, RECORD_SOURCE_LINE};
use crate::reward::RewardAccumulator;
use crate::time::{day_window, now_ms, DayWindow};
use crate::util::dispatch_async_with_fence;

/// Compare-and-swap attempts on a child's totals before giving up.
pub const MAX_UPDATE_ATTEMPTS: u32 = 3;

pub const POINTS_CONFLICT_CODE: &str = "LEDGER/CONFLICT";

#[derive(Clone)]
pub struct MessageHandler {
    ledger: Arc<dyn PointLedger>,
    linker: HouseholdLinker,
    accumulator: RewardAccumulator,
    tz: Tz,
    source: &'static str,
}

impl MessageHandler {
    pub fn new(
        ledger: Arc<dyn PointLedger>,
        scope: HouseholdScope,
        accumulator: RewardAccumulator,
        tz: Tz,
    ) -> Self {
        Self {
            linker: HouseholdLinker::new(ledger.clone(), scope),
            ledger,
            accumulator,
            tz,
            source: RECORD_SOURCE_LINE,
        }
    }

    /// Tag stored records with `source` instead of the webhook default.
    pub fn with_source(mut self, source: &'static str) -> Self {
        self.source = source;
        self
    }

    pub fn linker(&self) -> &HouseholdLinker {
        &self.linker
    }

    pub async fn handle(&self, text: &str, chat_user_id: &str) -> String {
        self.handle_at(text, chat_user_id, now_ms()).await
    }

    /// Same as [`handle`](Self::handle) with an explicit clock.
    pub async fn handle_at(&self, text: &str, chat_user_id: &str, now_ms: i64) -> String {
        let mut scope = MessageScope::new(chat_user_id);
        let outcome =
            dispatch_async_with_fence(|| self.process(text, chat_user_id, now_ms, &mut scope)).await;

        let reply = match outcome {
            Ok(Ok(reply)) => {
                scope.success(reply.label());
                reply
            }
            Ok(Err(LedgerError::Storage(err))) => {
                scope.fail(&err);
                Reply::StorageFailure
            }
            Ok(Err(err @ LedgerError::NotFound { .. })) => {
                scope.fail(&AppError::new("LEDGER/NOT_FOUND", err.to_string()));
                Reply::StorageFailure
            }
            Err(panic) => {
                scope.fail(&panic);
                Reply::StorageFailure
            }
        };
        compose(&reply)
    }

    fn today(&self, now_ms: i64) -> DayWindow {
        day_window(self.tz, now_ms)
    }

    async fn process(
        &self,
        text: &str,
        chat_user_id: &str,
        now_ms: i64,
        scope: &mut MessageScope,
    ) -> LedgerResult<Reply> {
        if let Intent::LinkHousehold(code) = classify(text, None) {
            scope.set_intent("link_household");
            if code.is_empty() {
                return Ok(Reply::LinkUsage);
            }
            return Ok(match self.linker.link(chat_user_id, &code).await? {
                LinkResult::AlreadyLinked => Reply::AlreadyLinked,
                LinkResult::InvalidCode => Reply::InvalidShareCode,
                LinkResult::Linked(_) => Reply::Linked,
            });
        }

        let Some(household) = self.linker.resolve_household(chat_user_id).await? else {
            return Ok(Reply::NotLinked);
        };
        scope.set_household(&household.id);

        let Some(child) = self.ledger.children(&household.id).await?.into_iter().next() else {
            return Ok(Reply::NoChildren);
        };

        let catalog = ActionCatalog::from_actions(self.ledger.actions(&household.id).await?);
        let intent = classify(text, Some(&catalog));
        scope.set_intent(intent.label());

        match intent {
            Intent::RecordAction(entry) => self.record_action(&child, entry, now_ms, scope).await,
            Intent::QueryToday => {
                let records = self.ledger.today_records(&child.id, self.today(now_ms)).await?;
                Ok(Reply::Today {
                    child_name: child.display_name().to_string(),
                    summary: TodaySummary::from_records(&records),
                })
            }
            Intent::QueryRewardStatus => {
                let goals = self.ledger.goals(&household.id).await?;
                Ok(Reply::RewardStatus {
                    child_name: child.display_name().to_string(),
                    cycle_points: child.cycle_points,
                    total_points: child.total_points,
                    threshold: self.accumulator.threshold(),
                    goals,
                })
            }
            // Link commands were answered before the household lookup.
            Intent::Unknown | Intent::LinkHousehold(_) => {
                if catalog.is_empty() {
                    Ok(Reply::NoActions)
                } else {
                    Ok(Reply::Unknown {
                        action_names: catalog.names().into_iter().map(str::to_string).collect(),
                    })
                }
            }
        }
    }

    /// Append first, then move the totals. A failed append writes nothing; a
    /// failed update leaves the record in place.
    async fn record_action(
        &self,
        child: &Child,
        entry: CatalogEntry,
        now_ms: i64,
        scope: &MessageScope,
    ) -> LedgerResult<Reply> {
        self.ledger
            .append_record(NewRecord {
                child_id: child.id.clone(),
                action_id: entry.id.clone(),
                action_name: entry.name.clone(),
                points: entry.points,
                recorded_at: now_ms,
                source: self.source.to_string(),
            })
            .await?;

        let mut current = child.totals();
        let mut attempt = 1;
        let update = loop {
            let update = self.accumulator.apply_action(current, entry.points);
            if self
                .ledger
                .update_child_points(&child.id, current, update.totals())
                .await?
            {
                break update;
            }
            if attempt >= MAX_UPDATE_ATTEMPTS {
                return Err(LedgerError::Storage(
                    AppError::new(POINTS_CONFLICT_CODE, "child totals changed on every attempt")
                        .with_context("child_id", child.id.clone())
                        .with_context("attempts", attempt.to_string()),
                ));
            }
            scope.warn(json!({ "stage": "points_conflict", "attempt": attempt }));
            attempt += 1;
            current = self.ledger.child(&child.id).await?.totals();
        };

        if update.new_cycle >= self.accumulator.threshold() {
            scope.warn(json!({
                "stage": "cycle_over_threshold",
                "cycle_points": update.new_cycle,
                "threshold": self.accumulator.threshold(),
            }));
        }

        let today_points = self
            .ledger
            .today_records(&child.id, self.today(now_ms))
            .await?
            .iter()
            .map(|record| record.points)
            .sum();

        Ok(Reply::Recorded {
            child_name: child.display_name().to_string(),
            action_name: entry.name,
            points: entry.points,
            today_points,
            total_points: update.new_total,
            reward_achieved: update.reward_achieved,
            threshold: self.accumulator.threshold(),
        })
    }
}
