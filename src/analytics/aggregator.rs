use super::catalog::{emotion_icon, sentiment, Sentiment};
use crate::config::AnalyticsConfig;
use crate::error::Result;
use crate::models::EmotionRecord;
use chrono::{Datelike, Duration, NaiveDate};
use chrono_tz::Tz;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

const WEEKDAY_LABELS: [&str; 7] = ["Dom", "Lun", "Mar", "Mié", "Jue", "Vie", "Sáb"];
const TREND_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DominantEmotion {
    pub name: String,
    pub icon: String,
    pub count: usize,
}

/// Emotion counts for one local calendar day
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayBucket {
    pub date: NaiveDate,
    /// Spanish weekday abbreviation, e.g. `Lun`
    pub day: &'static str,
    pub emotions: IndexMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentBalance {
    pub positive_count: usize,
    pub negative_count: usize,
    pub positive_percent: f64,
    pub negative_percent: f64,
}

/// Dashboard figures derived from a list of classification records
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionSummary {
    pub total_count: usize,
    pub dominant_emotion: Option<DominantEmotion>,
    /// Mean confidence, one decimal
    pub average_confidence: f64,
    /// Label -> count, in order of first appearance
    pub distribution: IndexMap<String, usize>,
    /// Label -> share of `total_count`, one decimal
    pub percentages: IndexMap<String, f64>,
    pub weekly_trend: Vec<DayBucket>,
    pub sentiment_balance: SentimentBalance,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Stateless summarizer; the timezone decides which weekday a timestamp falls on
#[derive(Debug, Clone, Copy)]
pub struct AnalyticsAggregator {
    timezone: Tz,
}

impl AnalyticsAggregator {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn from_config(config: &AnalyticsConfig) -> Result<Self> {
        Ok(Self::new(config.timezone()?))
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn summarize(&self, records: &[EmotionRecord]) -> EmotionSummary {
        let distribution = distribution(records);
        let total_count = records.len();

        let summary = EmotionSummary {
            total_count,
            dominant_emotion: dominant(&distribution),
            average_confidence: average_confidence(records),
            percentages: distribution
                .iter()
                .map(|(label, count)| {
                    (label.clone(), round1(*count as f64 / total_count as f64 * 100.0))
                })
                .collect(),
            weekly_trend: self.weekly_trend(records),
            sentiment_balance: sentiment_balance(&distribution),
            distribution,
        };
        debug!(
            "Summarized {} records, dominant {:?}",
            summary.total_count,
            summary.dominant_emotion.as_ref().map(|d| d.name.as_str())
        );
        summary
    }

    /// Seven buckets, oldest first, ending on the newest record's local date.
    ///
    /// Older records fall outside the window; empty input yields no buckets.
    pub fn weekly_trend(&self, records: &[EmotionRecord]) -> Vec<DayBucket> {
        let local_date = |record: &EmotionRecord| {
            record.timestamp.with_timezone(&self.timezone).date_naive()
        };

        let Some(last) = records.iter().map(local_date).max() else {
            return Vec::new();
        };
        let first = last - Duration::days(TREND_DAYS - 1);

        let mut buckets: Vec<DayBucket> = (0..TREND_DAYS)
            .map(|offset| {
                let date = first + Duration::days(offset);
                DayBucket {
                    date,
                    day: WEEKDAY_LABELS[date.weekday().num_days_from_sunday() as usize],
                    emotions: IndexMap::new(),
                }
            })
            .collect();

        for record in records {
            let date = local_date(record);
            if date < first {
                continue;
            }
            let index = (date - first).num_days() as usize;
            *buckets[index]
                .emotions
                .entry(record.emotion.clone())
                .or_insert(0) += 1;
        }
        buckets
    }
}

fn distribution(records: &[EmotionRecord]) -> IndexMap<String, usize> {
    let mut counts = IndexMap::new();
    for record in records {
        *counts.entry(record.emotion.clone()).or_insert(0) += 1;
    }
    counts
}

/// Highest count; on a tie the label seen first wins
fn dominant(distribution: &IndexMap<String, usize>) -> Option<DominantEmotion> {
    let mut best: Option<(&String, usize)> = None;
    for (label, &count) in distribution {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((label, count));
        }
    }
    best.map(|(label, count)| DominantEmotion {
        name: label.clone(),
        icon: emotion_icon(label).to_string(),
        count,
    })
}

fn average_confidence(records: &[EmotionRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let total: f64 = records.iter().map(|record| record.confidence).sum();
    round1(total / records.len() as f64)
}

/// Shares are relative to the positive + negative total, not the grand total
fn sentiment_balance(distribution: &IndexMap<String, usize>) -> SentimentBalance {
    let mut positive_count = 0;
    let mut negative_count = 0;
    for (label, count) in distribution {
        match sentiment(label) {
            Some(Sentiment::Positive) => positive_count += count,
            Some(Sentiment::Negative) => negative_count += count,
            None => {}
        }
    }

    let total = positive_count + negative_count;
    let (positive_percent, negative_percent) = if total == 0 {
        (0.0, 0.0)
    } else {
        let positive = round1(positive_count as f64 / total as f64 * 100.0);
        (positive, round1(100.0 - positive))
    };

    SentimentBalance {
        positive_count,
        negative_count,
        positive_percent,
        negative_percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    fn record(emotion: &str, confidence: f64, ts: &str) -> EmotionRecord {
        EmotionRecord::new(emotion, confidence, at(ts))
    }

    fn utc() -> AnalyticsAggregator {
        AnalyticsAggregator::new(chrono_tz::UTC)
    }

    #[test]
    fn test_reference_scenario() {
        let records = vec![
            record("Felicidad", 90.0, "2024-05-02T10:00:00Z"),
            record("Felicidad", 80.0, "2024-05-02T11:00:00Z"),
            record("Tristeza", 60.0, "2024-05-01T10:00:00Z"),
        ];
        let summary = utc().summarize(&records);

        assert_eq!(summary.total_count, 3);
        assert_eq!(
            summary.dominant_emotion,
            Some(DominantEmotion {
                name: "Felicidad".to_string(),
                icon: "😊".to_string(),
                count: 2,
            })
        );
        assert_eq!(summary.average_confidence, 76.7);
        let distribution: Vec<_> = summary
            .distribution
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        assert_eq!(distribution, vec![("Felicidad", 2), ("Tristeza", 1)]);
        assert_eq!(summary.percentages["Felicidad"], 66.7);
        assert_eq!(summary.percentages["Tristeza"], 33.3);
    }

    #[test]
    fn test_empty_input() {
        let summary = utc().summarize(&[]);
        assert_eq!(summary.total_count, 0);
        assert!(summary.dominant_emotion.is_none());
        assert_eq!(summary.average_confidence, 0.0);
        assert!(summary.weekly_trend.is_empty());
        assert_eq!(summary.sentiment_balance.positive_percent, 0.0);
        assert_eq!(summary.sentiment_balance.negative_percent, 0.0);
    }

    #[test]
    fn test_dominant_tie_first_appearance_wins() {
        let records = vec![
            record("Calma", 50.0, "2024-05-01T10:00:00Z"),
            record("Enojo", 50.0, "2024-05-01T11:00:00Z"),
            record("Enojo", 50.0, "2024-05-01T12:00:00Z"),
            record("Calma", 50.0, "2024-05-01T13:00:00Z"),
        ];
        let dominant = utc().summarize(&records).dominant_emotion.unwrap();
        assert_eq!(dominant.name, "Calma");
        assert_eq!(dominant.count, 2);
    }

    #[test]
    fn test_summary_is_pure() {
        let records = vec![
            record("Miedo", 33.3, "2024-05-01T10:00:00Z"),
            record("Sorpresa", 99.9, "2024-05-03T10:00:00Z"),
            record("Confusión", 12.0, "2024-04-20T10:00:00Z"),
        ];
        let before = records.clone();
        let aggregator = utc();

        let first = aggregator.summarize(&records);
        let second = aggregator.summarize(&records);
        assert_eq!(first, second);
        assert_eq!(records, before);
        assert!((0.0..=100.0).contains(&first.average_confidence));
    }

    #[test]
    fn test_sentiment_balance_excludes_unknown_labels() {
        let records = vec![
            record("Felicidad", 90.0, "2024-05-01T10:00:00Z"),
            record("HAPPY", 90.0, "2024-05-01T10:00:00Z"),
            record("Tristeza", 90.0, "2024-05-01T10:00:00Z"),
            record("Confusión", 90.0, "2024-05-01T10:00:00Z"),
            record("Nostalgia", 90.0, "2024-05-01T10:00:00Z"),
        ];
        let balance = utc().summarize(&records).sentiment_balance;
        assert_eq!(balance.positive_count, 2);
        assert_eq!(balance.negative_count, 1);
        assert_eq!(balance.positive_percent, 66.7);
        assert_eq!(balance.negative_percent, 33.3);
        assert!((balance.positive_percent + balance.negative_percent - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_sentiment_balance_without_known_labels() {
        let records = vec![record("Confusión", 40.0, "2024-05-01T10:00:00Z")];
        let balance = utc().summarize(&records).sentiment_balance;
        assert_eq!(balance.positive_count + balance.negative_count, 0);
        assert_eq!(balance.positive_percent, 0.0);
        assert_eq!(balance.negative_percent, 0.0);
    }

    #[test]
    fn test_weekly_trend_calendar_window() {
        // 2024-05-05 is a Sunday
        let records = vec![
            record("Felicidad", 90.0, "2024-05-05T20:00:00Z"),
            record("Tristeza", 60.0, "2024-05-05T09:00:00Z"),
            record("Felicidad", 70.0, "2024-04-30T10:00:00Z"),
            // Outside the seven-day window
            record("Enojo", 80.0, "2024-04-28T10:00:00Z"),
        ];
        let trend = utc().weekly_trend(&records);

        assert_eq!(trend.len(), 7);
        let labels: Vec<_> = trend.iter().map(|b| b.day).collect();
        assert_eq!(labels, vec!["Lun", "Mar", "Mié", "Jue", "Vie", "Sáb", "Dom"]);
        assert_eq!(trend[0].date, NaiveDate::from_ymd_opt(2024, 4, 29).unwrap());
        assert_eq!(trend[1].emotions["Felicidad"], 1);
        assert_eq!(trend[6].emotions["Felicidad"], 1);
        assert_eq!(trend[6].emotions["Tristeza"], 1);
        assert!(trend.iter().all(|b| !b.emotions.contains_key("Enojo")));
    }

    #[test]
    fn test_weekly_trend_uses_local_date() {
        // 02:00 UTC on Monday is still Sunday evening in Mexico City
        let records = vec![EmotionRecord::new(
            "Calma",
            80.0,
            Utc.with_ymd_and_hms(2024, 5, 6, 2, 0, 0).unwrap(),
        )];

        let local = AnalyticsAggregator::new(chrono_tz::America::Mexico_City).weekly_trend(&records);
        assert_eq!(local.last().unwrap().day, "Dom");

        let utc_trend = utc().weekly_trend(&records);
        assert_eq!(utc_trend.last().unwrap().day, "Lun");
    }

    #[test]
    fn test_from_config_rejects_unknown_timezone() {
        let config = AnalyticsConfig {
            timezone: "Mars/Olympus_Mons".to_string(),
            page_size: 9,
        };
        assert!(AnalyticsAggregator::from_config(&config).is_err());
    }
}
