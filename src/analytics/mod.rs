//! Derived views over server-held classification records.

mod aggregator;
mod catalog;
mod history_view;

pub use aggregator::{
    AnalyticsAggregator, DayBucket, DominantEmotion, EmotionSummary, SentimentBalance,
};
pub use catalog::{emotion_color, emotion_icon, sentiment, Sentiment, FALLBACK_COLOR, FALLBACK_ICON};
pub use history_view::{HistoryEntry, HistoryPage, HistoryView, ALL_EMOTIONS};
