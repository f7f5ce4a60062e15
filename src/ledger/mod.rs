//! Storage contract the message pipeline is written against.
//!
//! Every accessor either succeeds, reports `NotFound`, or reports a storage
//! failure; nothing fails silently or partially.

use async_trait::async_trait;

use crate::error::LedgerResult;
use crate::model::{Action, Child, Goal, Household, NewRecord, PointTotals, Record};
use crate::time::DayWindow;

pub mod memory;

pub use memory::MemoryLedger;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkResult {
    AlreadyLinked,
    InvalidCode,
    Linked(Household),
}

#[async_trait]
pub trait PointLedger: Send + Sync {
    async fn child(&self, child_id: &str) -> LedgerResult<Child>;

    /// Children of a household, oldest first.
    async fn children(&self, household_id: &str) -> LedgerResult<Vec<Child>>;

    /// Compare-and-swap of a child's totals. Returns `false` without writing
    /// when the stored totals no longer equal `expected`.
    async fn update_child_points(
        &self,
        child_id: &str,
        expected: PointTotals,
        next: PointTotals,
    ) -> LedgerResult<bool>;

    async fn append_record(&self, record: NewRecord) -> LedgerResult<Record>;

    async fn today_records(&self, child_id: &str, window: DayWindow) -> LedgerResult<Vec<Record>>;

    /// Active actions ordered by display order.
    async fn actions(&self, household_id: &str) -> LedgerResult<Vec<Action>>;

    /// Unachieved goals ordered by display order.
    async fn goals(&self, household_id: &str) -> LedgerResult<Vec<Goal>>;

    async fn household_by_chat_user(&self, chat_user_id: &str) -> LedgerResult<Option<Household>>;

    /// Link `chat_user_id` to the household owning `share_code`. Never
    /// replaces an existing link.
    async fn link_chat_user(&self, chat_user_id: &str, share_code: &str)
        -> LedgerResult<LinkResult>;
}
