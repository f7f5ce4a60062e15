use std::sync::Arc;

use tracing::{info, warn};

use crate::error::LedgerResult;
use crate::household::HouseholdScope;
use crate::ledger::{LinkResult, PointLedger};
use crate::model::Household;

/// Maps chat users to households according to the deployment's tenancy.
#[derive(Clone)]
pub struct HouseholdLinker {
    ledger: Arc<dyn PointLedger>,
    scope: HouseholdScope,
}

impl HouseholdLinker {
    pub fn new(ledger: Arc<dyn PointLedger>, scope: HouseholdScope) -> Self {
        Self { ledger, scope }
    }

    pub async fn resolve_household(&self, chat_user_id: &str) -> LedgerResult<Option<Household>> {
        match &self.scope {
            HouseholdScope::Fixed(household) => Ok(Some(household.clone())),
            HouseholdScope::Linked => self.ledger.household_by_chat_user(chat_user_id).await,
        }
    }

    /// An existing link wins over any code, valid or not.
    pub async fn link(&self, chat_user_id: &str, share_code: &str) -> LedgerResult<LinkResult> {
        if let HouseholdScope::Fixed(_) = self.scope {
            return Ok(LinkResult::AlreadyLinked);
        }

        let result = self.ledger.link_chat_user(chat_user_id, share_code).await?;
        match &result {
            LinkResult::Linked(household) => info!(
                target: "gohoubi",
                event = "chat_user_linked",
                chat_user_id,
                household_id = %household.id
            ),
            LinkResult::AlreadyLinked => info!(
                target: "gohoubi",
                event = "chat_user_link_skipped",
                chat_user_id,
                reason = "already_linked"
            ),
            LinkResult::InvalidCode => warn!(
                target: "gohoubi",
                event = "chat_user_link_rejected",
                chat_user_id,
                reason = "unknown_share_code"
            ),
        }
        Ok(result)
    }
}
