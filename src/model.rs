use serde::{Deserialize, Serialize};

pub const RECORD_SOURCE_LINE: &str = "line";
pub const RECORD_SOURCE_CLI: &str = "cli";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Household {
    pub id: String,
    pub share_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Action {
    pub id: String,
    pub household_id: String,
    pub name: String,
    pub points: i64,
    pub is_active: bool,
    pub display_order: i64,
}

/// Point totals of a child. `total_points` never decreases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointTotals {
    pub total_points: i64,
    pub cycle_points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Child {
    pub id: String,
    pub household_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    pub total_points: i64,
    pub cycle_points: i64,
}

impl Child {
    /// Nickname when set, otherwise the registered name.
    pub fn display_name(&self) -> &str {
        match self.nickname.as_deref() {
            Some(nick) if !nick.is_empty() => nick,
            _ => &self.name,
        }
    }

    pub fn totals(&self) -> PointTotals {
        PointTotals {
            total_points: self.total_points,
            cycle_points: self.cycle_points,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NewRecord {
    pub child_id: String,
    pub action_id: Option<String>,
    pub action_name: String,
    pub points: i64,
    pub recorded_at: i64,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Record {
    pub id: String,
    pub child_id: String,
    pub action_id: Option<String>,
    pub action_name: String,
    pub points: i64,
    pub recorded_at: i64,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Goal {
    pub id: String,
    pub household_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_points: Option<i64>,
    pub display_order: i64,
    pub is_achieved: bool,
}

/// Today's records folded per action name, in order of first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodaySummary {
    pub total_points: i64,
    pub actions: Vec<(String, u32)>,
}

impl TodaySummary {
    pub fn from_records(records: &[Record]) -> Self {
        let mut summary = TodaySummary::default();
        for record in records {
            summary.total_points += record.points;
            match summary
                .actions
                .iter_mut()
                .find(|(name, _)| *name == record.action_name)
            {
                Some((_, count)) => *count += 1,
                None => summary.actions.push((record.action_name.clone(), 1)),
            }
        }
        summary
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, points: i64) -> Record {
        Record {
            id: format!("r-{name}-{points}"),
            child_id: "c-1".into(),
            action_id: None,
            action_name: name.into(),
            points,
            recorded_at: 0,
            source: RECORD_SOURCE_LINE.into(),
        }
    }

    #[test]
    fn summary_counts_repeated_actions_once() {
        let summary = TodaySummary::from_records(&[
            record("宿題", 1),
            record("早寝", 2),
            record("宿題", 1),
        ]);
        assert_eq!(summary.total_points, 4);
        assert_eq!(
            summary.actions,
            vec![("宿題".to_string(), 2), ("早寝".to_string(), 1)]
        );
    }

    #[test]
    fn display_name_prefers_nickname() {
        let mut child = Child {
            id: "c-1".into(),
            household_id: "hh-1".into(),
            name: "Hanako".into(),
            nickname: Some("はなちゃん".into()),
            total_points: 0,
            cycle_points: 0,
        };
        assert_eq!(child.display_name(), "はなちゃん");
        child.nickname = Some(String::new());
        assert_eq!(child.display_name(), "Hanako");
    }
}
