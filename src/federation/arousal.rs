//! Request intensity ("arousal") tiers for the scoring router.
//!
//! A cheap heuristic over the request text: length, code fences and the
//! density of high-stakes keywords. Low-intensity requests lean towards fast
//! local models, high-intensity ones towards capable large-context models.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArousalTier {
    Low,
    Medium,
    High,
}

impl fmt::Display for ArousalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArousalTier::Low => f.write_str("low"),
            ArousalTier::Medium => f.write_str("medium"),
            ArousalTier::High => f.write_str("high"),
        }
    }
}

impl FromStr for ArousalTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(ArousalTier::Low),
            "medium" => Ok(ArousalTier::Medium),
            "high" => Ok(ArousalTier::High),
            _ => Err(format!("Invalid arousal tier: {}", s)),
        }
    }
}

const INTENSE_KEYWORDS: &[&str] = &[
    "architecture",
    "concurrency",
    "critical",
    "debug",
    "migrate",
    "migration",
    "optimize",
    "outage",
    "production",
    "race",
    "refactor",
    "security",
    "urgent",
    "vulnerability",
];

const LONG_TEXT_CHARS: usize = 4_000;
const MEDIUM_TEXT_CHARS: usize = 1_000;

/// Infer the tier for `text`.
pub fn infer_arousal(text: &str) -> ArousalTier {
    let mut points = 0u32;

    let chars = text.chars().count();
    if chars > LONG_TEXT_CHARS {
        points += 2;
    } else if chars > MEDIUM_TEXT_CHARS {
        points += 1;
    }

    let fences = text.matches("```").count() / 2;
    points += fences.min(2) as u32;

    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    if !words.is_empty() {
        let hits = words
            .iter()
            .filter(|w| INTENSE_KEYWORDS.contains(&w.as_str()))
            .count();
        // hits per hundred words
        let density = hits as f64 * 100.0 / words.len() as f64;
        if density >= 5.0 {
            points += 2;
        } else if hits > 0 {
            points += 1;
        }
    }

    match points {
        0 => ArousalTier::Low,
        1 | 2 => ArousalTier::Medium,
        _ => ArousalTier::High,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_plain_text_is_low() {
        assert_eq!(infer_arousal("list the files in this folder"), ArousalTier::Low);
        assert_eq!(infer_arousal(""), ArousalTier::Low);
    }

    #[test]
    fn single_keyword_in_long_prose_is_medium() {
        let text = format!("please debug this {}", "word ".repeat(100));
        assert_eq!(infer_arousal(&text), ArousalTier::Medium);
    }

    #[test]
    fn dense_keywords_with_code_is_high() {
        let text = "urgent production outage: debug the race\n```rust\nfn main() {}\n```";
        assert_eq!(infer_arousal(text), ArousalTier::High);
    }

    #[test]
    fn long_text_with_code_is_high() {
        let text = format!("```\n{}\n```", "x = 1\n".repeat(800));
        assert_eq!(infer_arousal(&text), ArousalTier::High);
    }
}
