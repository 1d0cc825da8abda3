use super::catalog::emotion_icon;
use crate::models::EmotionRecord;
use serde::Serialize;

/// Filter value that matches every label
pub const ALL_EMOTIONS: &str = "todos";

/// One page of the analysis history
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    /// 1-based
    pub page: usize,
    pub total_pages: usize,
    pub total_matches: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub record: EmotionRecord,
    pub icon: &'static str,
}

/// Case-insensitive label filter over loaded records, paged for display
#[derive(Debug, Clone)]
pub struct HistoryView {
    records: Vec<EmotionRecord>,
    page_size: usize,
}

impl HistoryView {
    pub fn new(records: Vec<EmotionRecord>, page_size: usize) -> Self {
        Self {
            records,
            page_size: page_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn matching<'a>(&'a self, filter: &'a str) -> impl Iterator<Item = &'a EmotionRecord> + 'a {
        let all = filter.eq_ignore_ascii_case(ALL_EMOTIONS) || filter.is_empty();
        let wanted = filter.to_lowercase();
        self.records
            .iter()
            .filter(move |record| all || record.emotion.to_lowercase() == wanted)
    }

    pub fn total_pages(&self, filter: &str) -> usize {
        self.matching(filter).count().div_ceil(self.page_size)
    }

    /// Records on 1-based `page` matching `filter`; past the end gives an empty page
    pub fn page(&self, filter: &str, page: usize) -> HistoryPage {
        let page = page.max(1);
        let total_matches = self.matching(filter).count();
        let entries = self
            .matching(filter)
            .skip((page - 1) * self.page_size)
            .take(self.page_size)
            .map(|record| HistoryEntry {
                record: record.clone(),
                icon: emotion_icon(&record.emotion),
            })
            .collect();

        HistoryPage {
            entries,
            page,
            total_pages: total_matches.div_ceil(self.page_size),
            total_matches,
        }
    }

    /// Drop a record locally; the backend has no delete endpoint
    pub fn remove(&mut self, id: i64) -> bool {
        let before = self.records.len();
        self.records.retain(|record| record.id != Some(id));
        self.records.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn records() -> Vec<EmotionRecord> {
        (0..20)
            .map(|i| {
                let emotion = if i % 4 == 0 { "Tristeza" } else { "Felicidad" };
                let mut record = EmotionRecord::new(
                    emotion,
                    80.0,
                    Utc.with_ymd_and_hms(2024, 5, 1, 0, i, 0).unwrap(),
                );
                record.id = Some(i as i64);
                record
            })
            .collect()
    }

    #[test]
    fn test_pagination_with_all_filter() {
        let view = HistoryView::new(records(), 9);
        assert_eq!(view.total_pages("todos"), 3);

        let first = view.page("todos", 1);
        assert_eq!(first.entries.len(), 9);
        assert_eq!(first.total_matches, 20);
        assert_eq!(first.entries[0].record.id, Some(0));

        let last = view.page("TODOS", 3);
        assert_eq!(last.entries.len(), 2);
        assert!(view.page("todos", 4).entries.is_empty());
    }

    #[test]
    fn test_filter_is_case_insensitive() {
        let view = HistoryView::new(records(), 9);
        let page = view.page("tristeza", 1);
        assert_eq!(page.total_matches, 5);
        assert_eq!(page.total_pages, 1);
        assert!(page.entries.iter().all(|e| e.record.emotion == "Tristeza"));
        assert_eq!(page.entries[0].icon, "😢");
    }

    #[test]
    fn test_remove_is_local() {
        let mut view = HistoryView::new(records(), 9);
        assert!(view.remove(4));
        assert!(!view.remove(4));
        assert_eq!(view.page("Tristeza", 1).total_matches, 4);
    }
}
