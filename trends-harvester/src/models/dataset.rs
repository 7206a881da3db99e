//! Trend rows and the aggregated master dataset

use serde::{Deserialize, Serialize};

/// Column names of a raw artifact, in upstream order
pub const ARTIFACT_HEADER: [&str; 6] = [
    "Trends",
    "Search volume",
    "Started",
    "Ended",
    "Trend breakdown",
    "Explore link",
];

/// Column injected in front of every aggregated row
pub const CATEGORY_COLUMN: &str = "Category";

/// One trend as read from an artifact (no category tag yet)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTrend {
    pub trends: String,
    pub search_volume: String,
    pub started: String,
    pub ended: String,
    pub trend_breakdown: String,
    pub explore_link: String,
}

impl RawTrend {
    /// Value of an artifact column by header name (unknown names are empty)
    pub fn field(&self, column: &str) -> &str {
        match column {
            "Trends" => &self.trends,
            "Search volume" => &self.search_volume,
            "Started" => &self.started,
            "Ended" => &self.ended,
            "Trend breakdown" => &self.trend_breakdown,
            "Explore link" => &self.explore_link,
            _ => "",
        }
    }

    /// Set an artifact column by header name; returns false for unknown names
    pub fn set_field(&mut self, column: &str, value: String) -> bool {
        let slot = match column {
            "Trends" => &mut self.trends,
            "Search volume" => &mut self.search_volume,
            "Started" => &mut self.started,
            "Ended" => &mut self.ended,
            "Trend breakdown" => &mut self.trend_breakdown,
            "Explore link" => &mut self.explore_link,
            _ => return false,
        };
        *slot = value;
        true
    }

    pub fn is_blank(&self) -> bool {
        ARTIFACT_HEADER.iter().all(|c| self.field(c).trim().is_empty())
    }
}

/// A trend tagged with the category it was harvested for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendRow {
    pub category: String,
    pub category_id: u32,
    #[serde(flatten)]
    pub trend: RawTrend,
}

impl TrendRow {
    pub fn field(&self, column: &str) -> &str {
        if column == CATEGORY_COLUMN {
            &self.category
        } else {
            self.trend.field(column)
        }
    }
}

/// Aggregated, category-tagged rows of one harvest
///
/// The header is fixed when the dataset is created. Row order reflects
/// completion order and carries no meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterDataset {
    pub header: Vec<String>,
    pub rows: Vec<TrendRow>,
}

impl MasterDataset {
    /// Empty dataset with the standard `Category` + artifact header
    pub fn new() -> Self {
        Self::with_header(master_header())
    }

    pub fn with_header(header: Vec<String>) -> Self {
        Self {
            header,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row values laid out in header order
    pub fn record(&self, row: &TrendRow) -> Vec<String> {
        self.header.iter().map(|c| row.field(c).to_string()).collect()
    }
}

impl Default for MasterDataset {
    fn default() -> Self {
        Self::new()
    }
}

/// `Category` followed by the artifact columns
pub fn master_header() -> Vec<String> {
    std::iter::once(CATEGORY_COLUMN)
        .chain(ARTIFACT_HEADER)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_header_prepends_category() {
        let header = master_header();
        assert_eq!(header.len(), 7);
        assert_eq!(header[0], "Category");
        assert_eq!(header[1], "Trends");
        assert_eq!(header[6], "Explore link");
    }

    #[test]
    fn test_record_follows_header_order() {
        let dataset = MasterDataset::new();
        let row = TrendRow {
            category: "Sports".to_string(),
            category_id: 17,
            trend: RawTrend {
                trends: "cup final".to_string(),
                search_volume: "200K+".to_string(),
                ..Default::default()
            },
        };
        let record = dataset.record(&row);
        assert_eq!(record[0], "Sports");
        assert_eq!(record[1], "cup final");
        assert_eq!(record[2], "200K+");
        assert_eq!(record[3], "");
    }

    #[test]
    fn test_row_serializes_flat() {
        let row = TrendRow {
            category: "Games".to_string(),
            category_id: 6,
            trend: RawTrend {
                trends: "speedrun".to_string(),
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["category"], "Games");
        assert_eq!(json["category_id"], 6);
        assert_eq!(json["trends"], "speedrun");
        assert!(json.get("trend").is_none());
    }

    #[test]
    fn test_set_field_rejects_unknown_column() {
        let mut raw = RawTrend::default();
        assert!(raw.set_field("Started", "today".to_string()));
        assert!(!raw.set_field("Popularity", "high".to_string()));
        assert_eq!(raw.started, "today");
        assert!(!raw.is_blank());
    }
}
