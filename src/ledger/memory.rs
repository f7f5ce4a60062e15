use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AppError, LedgerError, LedgerResult};
use crate::id::new_uuid_v7;
use crate::model::{Action, Child, Goal, Household, NewRecord, PointTotals, Record};
use crate::time::DayWindow;

use super::{LinkResult, PointLedger};

/// Ledger operations, used to inject failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerOp {
    Child,
    Children,
    UpdateChildPoints,
    AppendRecord,
    TodayRecords,
    Actions,
    Goals,
    HouseholdByChatUser,
    LinkChatUser,
}

#[derive(Default)]
struct State {
    households: Vec<Household>,
    children: Vec<Child>,
    actions: Vec<Action>,
    goals: Vec<Goal>,
    records: Vec<Record>,
    links: HashMap<String, String>,
    failing: HashSet<LedgerOp>,
    calls: HashMap<LedgerOp, usize>,
    concurrent_writes: HashMap<String, Vec<i64>>,
}

impl State {
    fn enter(&mut self, op: LedgerOp) -> LedgerResult<()> {
        *self.calls.entry(op).or_default() += 1;
        if self.failing.contains(&op) {
            return Err(LedgerError::Storage(
                AppError::new("MEMORY/INJECTED", "injected ledger failure")
                    .with_context("op", format!("{op:?}")),
            ));
        }
        Ok(())
    }
}

/// In-process ledger with the same semantics as the SQLite one. Used by
/// tests and dry runs.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_household(&self, share_code: &str) -> Household {
        let household = Household {
            id: new_uuid_v7(),
            share_code: share_code.to_string(),
        };
        self.lock().households.push(household.clone());
        household
    }

    pub fn add_child(&self, household_id: &str, name: &str, nickname: Option<&str>) -> Child {
        let child = Child {
            id: new_uuid_v7(),
            household_id: household_id.to_string(),
            name: name.to_string(),
            nickname: nickname.map(str::to_string),
            total_points: 0,
            cycle_points: 0,
        };
        self.lock().children.push(child.clone());
        child
    }

    pub fn add_action(&self, household_id: &str, name: &str, points: i64) -> Action {
        let mut state = self.lock();
        let display_order = state
            .actions
            .iter()
            .filter(|a| a.household_id == household_id)
            .count() as i64;
        let action = Action {
            id: new_uuid_v7(),
            household_id: household_id.to_string(),
            name: name.to_string(),
            points,
            is_active: true,
            display_order,
        };
        state.actions.push(action.clone());
        action
    }

    pub fn add_goal(&self, household_id: &str, title: &str, target_points: Option<i64>) -> Goal {
        let mut state = self.lock();
        let display_order = state
            .goals
            .iter()
            .filter(|g| g.household_id == household_id)
            .count() as i64;
        let goal = Goal {
            id: new_uuid_v7(),
            household_id: household_id.to_string(),
            title: title.to_string(),
            target_points,
            display_order,
            is_achieved: false,
        };
        state.goals.push(goal.clone());
        goal
    }

    pub fn set_totals(&self, child_id: &str, totals: PointTotals) {
        if let Some(child) = self.lock().children.iter_mut().find(|c| c.id == child_id) {
            child.total_points = totals.total_points;
            child.cycle_points = totals.cycle_points;
        }
    }

    pub fn insert_record(&self, record: Record) {
        self.lock().records.push(record);
    }

    pub fn fail(&self, op: LedgerOp) {
        self.lock().failing.insert(op);
    }

    pub fn recover(&self, op: LedgerOp) {
        self.lock().failing.remove(&op);
    }

    pub fn calls(&self, op: LedgerOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Simulate another writer adding `points` to the child right before the
    /// next compare-and-swap on it.
    pub fn interleave_write(&self, child_id: &str, points: i64) {
        self.lock()
            .concurrent_writes
            .entry(child_id.to_string())
            .or_default()
            .push(points);
    }

    pub fn records(&self) -> Vec<Record> {
        self.lock().records.clone()
    }

    pub fn snapshot_child(&self, child_id: &str) -> Option<Child> {
        self.lock().children.iter().find(|c| c.id == child_id).cloned()
    }
}

#[async_trait]
impl PointLedger for MemoryLedger {
    async fn child(&self, child_id: &str) -> LedgerResult<Child> {
        let mut state = self.lock();
        state.enter(LedgerOp::Child)?;
        state
            .children
            .iter()
            .find(|c| c.id == child_id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("child", child_id))
    }

    async fn children(&self, household_id: &str) -> LedgerResult<Vec<Child>> {
        let mut state = self.lock();
        state.enter(LedgerOp::Children)?;
        Ok(state
            .children
            .iter()
            .filter(|c| c.household_id == household_id)
            .cloned()
            .collect())
    }

    async fn update_child_points(
        &self,
        child_id: &str,
        expected: PointTotals,
        next: PointTotals,
    ) -> LedgerResult<bool> {
        let mut state = self.lock();
        state.enter(LedgerOp::UpdateChildPoints)?;
        let pending = state
            .concurrent_writes
            .get_mut(child_id)
            .and_then(|queue| (!queue.is_empty()).then(|| queue.remove(0)));
        let child = state
            .children
            .iter_mut()
            .find(|c| c.id == child_id)
            .ok_or_else(|| LedgerError::not_found("child", child_id))?;
        if let Some(points) = pending {
            child.total_points += points;
            child.cycle_points += points;
        }
        if child.totals() != expected {
            return Ok(false);
        }
        child.total_points = next.total_points;
        child.cycle_points = next.cycle_points;
        Ok(true)
    }

    async fn append_record(&self, record: NewRecord) -> LedgerResult<Record> {
        let mut state = self.lock();
        state.enter(LedgerOp::AppendRecord)?;
        let stored = Record {
            id: new_uuid_v7(),
            child_id: record.child_id,
            action_id: record.action_id,
            action_name: record.action_name,
            points: record.points,
            recorded_at: record.recorded_at,
            source: record.source,
        };
        state.records.push(stored.clone());
        Ok(stored)
    }

    async fn today_records(&self, child_id: &str, window: DayWindow) -> LedgerResult<Vec<Record>> {
        let mut state = self.lock();
        state.enter(LedgerOp::TodayRecords)?;
        let mut records: Vec<Record> = state
            .records
            .iter()
            .filter(|r| r.child_id == child_id && window.contains(r.recorded_at))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.recorded_at);
        Ok(records)
    }

    async fn actions(&self, household_id: &str) -> LedgerResult<Vec<Action>> {
        let mut state = self.lock();
        state.enter(LedgerOp::Actions)?;
        let mut actions: Vec<Action> = state
            .actions
            .iter()
            .filter(|a| a.household_id == household_id && a.is_active)
            .cloned()
            .collect();
        actions.sort_by_key(|a| a.display_order);
        Ok(actions)
    }

    async fn goals(&self, household_id: &str) -> LedgerResult<Vec<Goal>> {
        let mut state = self.lock();
        state.enter(LedgerOp::Goals)?;
        let mut goals: Vec<Goal> = state
            .goals
            .iter()
            .filter(|g| g.household_id == household_id && !g.is_achieved)
            .cloned()
            .collect();
        goals.sort_by_key(|g| g.display_order);
        Ok(goals)
    }

    async fn household_by_chat_user(&self, chat_user_id: &str) -> LedgerResult<Option<Household>> {
        let mut state = self.lock();
        state.enter(LedgerOp::HouseholdByChatUser)?;
        let Some(household_id) = state.links.get(chat_user_id) else {
            return Ok(None);
        };
        Ok(state
            .households
            .iter()
            .find(|h| &h.id == household_id)
            .cloned())
    }

    async fn link_chat_user(
        &self,
        chat_user_id: &str,
        share_code: &str,
    ) -> LedgerResult<LinkResult> {
        let mut state = self.lock();
        state.enter(LedgerOp::LinkChatUser)?;
        if state.links.contains_key(chat_user_id) {
            return Ok(LinkResult::AlreadyLinked);
        }
        let Some(household) = state
            .households
            .iter()
            .find(|h| h.share_code == share_code)
            .cloned()
        else {
            return Ok(LinkResult::InvalidCode);
        };
        state
            .links
            .insert(chat_user_id.to_string(), household.id.clone());
        Ok(LinkResult::Linked(household))
    }
}
