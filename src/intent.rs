//! Message intent classification.
//!
//! Precedence is fixed: link command, then (with a resolved household) the
//! today query, the reward query, action detection and finally `Unknown`.
//! A message mentioning both today and points is a today query even when it
//! also names an action.

use crate::catalog::{ActionCatalog, CatalogEntry};

pub const LINK_COMMAND: &str = "登録";
pub const TODAY_MARKER: &str = "今日";
pub const POINTS_MARKER: &str = "ポイント";
pub const REWARD_MARKERS: &[&str] = &["ごほうび", "ご褒美"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Link this chat user to a household. An empty code asks for usage help.
    LinkHousehold(String),
    QueryToday,
    QueryRewardStatus,
    RecordAction(CatalogEntry),
    Unknown,
}

impl Intent {
    pub fn label(&self) -> &'static str {
        match self {
            Intent::LinkHousehold(_) => "link_household",
            Intent::QueryToday => "query_today",
            Intent::QueryRewardStatus => "query_reward_status",
            Intent::RecordAction(_) => "record_action",
            Intent::Unknown => "unknown",
        }
    }
}

/// Share code carried by a link command, or `None` when `text` is not one.
///
/// The command word must be followed by whitespace or nothing at all;
/// `登録abc` is not a link command. A bare `登録` carries an empty code.
pub fn parse_link_command(text: &str) -> Option<String> {
    let rest = text.trim().strip_prefix(LINK_COMMAND)?;
    match rest.chars().next() {
        None => Some(String::new()),
        Some(first) if first.is_whitespace() => Some(rest.trim().to_string()),
        Some(_) => None,
    }
}

/// Classify `raw_text`. `catalog` is `None` while no household is resolved,
/// in which case only the link command is recognised.
pub fn classify(raw_text: &str, catalog: Option<&ActionCatalog>) -> Intent {
    if let Some(code) = parse_link_command(raw_text) {
        return Intent::LinkHousehold(code);
    }

    let Some(catalog) = catalog else {
        return Intent::Unknown;
    };

    let text = raw_text.trim();
    if text.contains(TODAY_MARKER) && text.contains(POINTS_MARKER) {
        return Intent::QueryToday;
    }
    if REWARD_MARKERS.iter().any(|marker| text.contains(marker)) {
        return Intent::QueryRewardStatus;
    }
    match catalog.detect(text) {
        Some(entry) => Intent::RecordAction(entry.clone()),
        None => Intent::Unknown,
    }
}
