use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegendPosition {
    #[default]
    Bottom,
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegendMode {
    #[default]
    List,
    Table,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegendSize {
    Small,
    #[default]
    Medium,
}

/// Legend settings; `V` is the kind of value a table legend can show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendOptions<V> {
    #[serde(default)]
    pub position: LegendPosition,
    #[serde(default)]
    pub mode: LegendMode,
    #[serde(default)]
    pub size: LegendSize,
    #[serde(default = "Vec::new")]
    pub values: Vec<V>,
}

impl<V> LegendOptions<V> {
    /// Table mode with at least one value column to show.
    pub fn has_table_columns(&self) -> bool {
        self.mode == LegendMode::Table && !self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendItem {
    pub id: String,
    pub label: String,
    pub color: String,
    /// Table cells keyed by column accessor.
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnAlign {
    Left,
    #[default]
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegendColumn {
    pub accessor_key: String,
    pub header: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_description: Option<String>,
    pub width: u32,
    pub align: ColumnAlign,
}

/// Which legend items the user has picked. Starts as [`SelectedItems::All`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectedItems {
    #[default]
    All,
    Some(BTreeSet<String>),
}

impl SelectedItems {
    /// Applies a legend click. A plain click isolates the item, or resets to
    /// all when it was already the only one. A modifier click (shift/meta)
    /// toggles the item in or out of the selection.
    pub fn click(self, id: &str, modifier: bool) -> Self {
        if modifier {
            return self.toggle(id);
        }
        match self {
            Self::Some(set) if set.len() == 1 && set.contains(id) => Self::All,
            _ => Self::Some(BTreeSet::from([id.to_string()])),
        }
    }

    fn toggle(self, id: &str) -> Self {
        let mut set = match self {
            Self::All => return Self::Some(BTreeSet::from([id.to_string()])),
            Self::Some(set) => set,
        };
        if !set.remove(id) {
            set.insert(id.to_string());
        }
        if set.is_empty() { Self::All } else { Self::Some(set) }
    }

    /// True only for explicitly selected items.
    pub fn is_highlighted(&self, id: &str) -> bool {
        matches!(self, Self::Some(set) if set.contains(id))
    }

    pub fn is_visible(&self, id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Some(set) => set.contains(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_click_isolates_then_resets() {
        let selected = SelectedItems::All.click("a", false);
        assert!(selected.is_highlighted("a"));
        assert!(!selected.is_visible("b"));

        let selected = selected.click("b", false);
        assert!(selected.is_highlighted("b"));
        assert!(!selected.is_highlighted("a"));

        assert_eq!(selected.click("b", false), SelectedItems::All);
    }

    #[test]
    fn modifier_click_toggles_membership() {
        let selected = SelectedItems::All.click("a", true).click("b", true);
        assert!(selected.is_highlighted("a") && selected.is_highlighted("b"));

        let selected = selected.click("a", true);
        assert!(!selected.is_highlighted("a"));

        assert_eq!(selected.click("b", true), SelectedItems::All);
    }

    #[test]
    fn all_highlights_nothing_but_shows_everything() {
        assert!(!SelectedItems::All.is_highlighted("a"));
        assert!(SelectedItems::All.is_visible("a"));
    }

    #[test]
    fn legend_options_default_missing_fields() {
        let legend: LegendOptions<String> = serde_json::from_str(r#"{"mode":"table"}"#).unwrap();
        assert_eq!(legend.position, LegendPosition::Bottom);
        assert_eq!(legend.mode, LegendMode::Table);
        assert!(!legend.has_table_columns());

        let legend: LegendOptions<String> =
            serde_json::from_str(r#"{"mode":"table","values":["abs"]}"#).unwrap();
        assert!(legend.has_table_columns());
    }
}
