//! Presentation attributes of the classifier's emotion labels.
//!
//! The classifier has answered in English and in Spanish over time, so
//! both spellings are listed.

use serde::Serialize;

pub const FALLBACK_ICON: &str = "😐";
pub const FALLBACK_COLOR: &str = "#808080";

/// Side of the positive/negative balance an emotion counts toward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sentiment {
    Positive,
    Negative,
}

struct EmotionEntry {
    labels: &'static [&'static str],
    icon: &'static str,
    color: &'static str,
    sentiment: Option<Sentiment>,
}

const CATALOG: &[EmotionEntry] = &[
    EmotionEntry {
        labels: &["Felicidad", "HAPPY"],
        icon: "😊",
        color: "#FFD700",
        sentiment: Some(Sentiment::Positive),
    },
    EmotionEntry {
        labels: &["Calma", "CALM"],
        icon: "😌",
        color: "#20B2AA",
        sentiment: Some(Sentiment::Positive),
    },
    EmotionEntry {
        labels: &["Sorpresa", "SURPRISED"],
        icon: "😲",
        color: "#FF8C00",
        sentiment: Some(Sentiment::Positive),
    },
    EmotionEntry {
        labels: &["Tristeza", "SAD"],
        icon: "😢",
        color: "#4169E1",
        sentiment: Some(Sentiment::Negative),
    },
    EmotionEntry {
        labels: &["Enojo", "ANGRY"],
        icon: "😠",
        color: "#DC143C",
        sentiment: Some(Sentiment::Negative),
    },
    EmotionEntry {
        labels: &["Miedo", "FEAR"],
        icon: "😨",
        color: "#9370DB",
        sentiment: Some(Sentiment::Negative),
    },
    EmotionEntry {
        labels: &["Disgusto", "DISGUSTED"],
        icon: "🤢",
        color: "#32CD32",
        sentiment: Some(Sentiment::Negative),
    },
    // Counted in distributions, excluded from the balance
    EmotionEntry {
        labels: &["Confusión", "CONFUSED"],
        icon: "😕",
        color: "#C0C0C0",
        sentiment: None,
    },
];

fn lookup(label: &str) -> Option<&'static EmotionEntry> {
    CATALOG.iter().find(|entry| entry.labels.contains(&label))
}

pub fn emotion_icon(label: &str) -> &'static str {
    lookup(label).map(|entry| entry.icon).unwrap_or(FALLBACK_ICON)
}

/// Chart colour as a `#RRGGBB` string
pub fn emotion_color(label: &str) -> &'static str {
    lookup(label).map(|entry| entry.color).unwrap_or(FALLBACK_COLOR)
}

/// Labels match exactly; unknown labels belong to neither side
pub fn sentiment(label: &str) -> Option<Sentiment> {
    lookup(label).and_then(|entry| entry.sentiment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_languages_share_attributes() {
        assert_eq!(emotion_icon("Felicidad"), emotion_icon("HAPPY"));
        assert_eq!(emotion_color("Tristeza"), "#4169E1");
        assert_eq!(emotion_color("SAD"), "#4169E1");
    }

    #[test]
    fn test_unknown_label_fallbacks() {
        assert_eq!(emotion_icon("Nostalgia"), FALLBACK_ICON);
        assert_eq!(emotion_color("Nostalgia"), FALLBACK_COLOR);
        assert_eq!(sentiment("Nostalgia"), None);
    }

    #[test]
    fn test_sentiment_sets() {
        for label in ["HAPPY", "CALM", "SURPRISED", "Felicidad", "Calma", "Sorpresa"] {
            assert_eq!(sentiment(label), Some(Sentiment::Positive), "{}", label);
        }
        for label in ["SAD", "ANGRY", "FEAR", "DISGUSTED", "Tristeza", "Enojo", "Miedo", "Disgusto"] {
            assert_eq!(sentiment(label), Some(Sentiment::Negative), "{}", label);
        }
        assert_eq!(sentiment("Confusión"), None);
        assert_eq!(sentiment("felicidad"), None);
    }
}
