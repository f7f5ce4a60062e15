//! Ordered list of rewarded actions for one household.

use crate::model::Action;

/// One recognisable action. `id` is `None` only for catalogs that were never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: Option<String>,
    pub name: String,
    pub points: i64,
}

/// Built-in catalog used by single-household deployments and new households.
pub const DEFAULT_ACTIONS: &[(&str, i64)] = &[
    ("宿題", 1),
    ("スタスタ", 3),
    ("早寝", 2),
    ("お手伝い", 2),
];

/// Delimiter used when listing action names back to the user.
pub const NAME_DELIMITER: &str = "」「";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionCatalog {
    entries: Vec<CatalogEntry>,
}

impl ActionCatalog {
    /// Build from stored actions. Inactive rows are dropped and the rest sorted
    /// by display order; ties keep their incoming order.
    pub fn from_actions(actions: impl IntoIterator<Item = Action>) -> Self {
        let mut active: Vec<Action> = actions.into_iter().filter(|a| a.is_active).collect();
        active.sort_by_key(|a| a.display_order);
        Self {
            entries: active
                .into_iter()
                .map(|a| CatalogEntry {
                    id: Some(a.id),
                    name: a.name,
                    points: a.points,
                })
                .collect(),
        }
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, i64)>) -> Self {
        Self {
            entries: pairs
                .into_iter()
                .map(|(name, points)| CatalogEntry {
                    id: None,
                    name: name.to_string(),
                    points,
                })
                .collect(),
        }
    }

    pub fn default_catalog() -> Self {
        Self::from_pairs(DEFAULT_ACTIONS.iter().copied())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// First entry, in display order, whose name occurs in `text`.
    pub fn detect(&self, text: &str) -> Option<&CatalogEntry> {
        self.entries
            .iter()
            .find(|entry| !entry.name.is_empty() && text.contains(entry.name.as_str()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Largest point value in the catalog.
    pub fn max_points(&self) -> Option<i64> {
        self.entries.iter().map(|e| e.points).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(id: &str, name: &str, points: i64, order: i64, active: bool) -> Action {
        Action {
            id: id.into(),
            household_id: "hh-1".into(),
            name: name.into(),
            points,
            is_active: active,
            display_order: order,
        }
    }

    #[test]
    fn detects_first_match_in_display_order() {
        let catalog = ActionCatalog::from_actions(vec![
            action("a2", "早寝", 2, 2, true),
            action("a1", "宿題", 1, 1, true),
        ]);
        let hit = catalog.detect("早寝して宿題もやった").expect("match");
        assert_eq!(hit.name, "宿題");
        assert_eq!(hit.id.as_deref(), Some("a1"));
    }

    #[test]
    fn inactive_actions_are_ignored() {
        let catalog = ActionCatalog::from_actions(vec![
            action("a1", "宿題", 1, 1, false),
            action("a2", "早寝", 2, 2, true),
        ]);
        assert!(catalog.detect("宿題やった").is_none());
        assert_eq!(catalog.names(), vec!["早寝"]);
    }

    #[test]
    fn matching_is_case_sensitive() {
        let catalog = ActionCatalog::from_pairs([("Piano", 2)]);
        assert!(catalog.detect("piano practice").is_none());
        assert!(catalog.detect("Piano practice").is_some());
    }

    #[test]
    fn default_catalog_keeps_listed_order() {
        let catalog = ActionCatalog::default_catalog();
        assert_eq!(catalog.names(), vec!["宿題", "スタスタ", "早寝", "お手伝い"]);
        assert_eq!(catalog.max_points(), Some(3));
    }
}
