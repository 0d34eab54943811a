//! Turns raw stage text into structured stage records.
//!
//! None of these functions fail: text without the expected markers degrades to
//! a best-effort record.

use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use uuid::Uuid;

use crate::models::chat::{
    CriticRecord,
    JudgeRecord,
    ReasoningType,
    ThinkerRecord,
    DEFAULT_REASONING_TYPE,
    NO_REASONING_PROVIDED,
};

/// Keyword sets in priority order; the first set with a hit wins.
const REASONING_KEYWORDS: [(ReasoningType, &[&str]); 4] = [
    (ReasoningType::Mathematical, &["math", "calculate", "equation"]),
    (ReasoningType::Causal, &["cause", "effect", "because"]),
    (ReasoningType::Probabilistic, &["probability", "likely", "chance"]),
    (ReasoningType::Deductive, &["deduce", "therefore", "logically"]),
];

lazy_static! {
    static ref ANSWER_MARKER: Regex = Regex::new(r"(?i)##[ \t]*user[ \t]+facing[ \t]+answer").unwrap();
    static ref REASONING_MARKER: Regex = Regex::new(r"(?i)##[ \t]*reasoning").unwrap();
}

pub fn classify_reasoning(raw: &str) -> ReasoningType {
    let lower = raw.to_lowercase();
    REASONING_KEYWORDS.iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(kind, _)| *kind)
        .unwrap_or(DEFAULT_REASONING_TYPE)
}

pub fn parse_thinker_response(raw: &str) -> ThinkerRecord {
    ThinkerRecord {
        internal: true,
        reasoning_type: classify_reasoning(raw),
        raw: raw.trim().to_string(),
        error: None,
    }
}

pub fn parse_critic_response(raw: &str) -> CriticRecord {
    CriticRecord {
        internal: true,
        raw: raw.trim().to_string(),
        error: None,
    }
}

pub fn parse_judge_response(raw: &str) -> JudgeRecord {
    let answer = ANSWER_MARKER.find(raw);
    // Prefer a reasoning section after the answer; otherwise take one that precedes it.
    let reasoning = match answer {
        Some(a) => REASONING_MARKER.find_at(raw, a.end()).or_else(|| REASONING_MARKER.find(raw)),
        None => REASONING_MARKER.find(raw),
    };

    let final_answer = answer
        .map(|m| {
            let end = reasoning
                .filter(|r| r.start() >= m.end())
                .map(|r| r.start())
                .unwrap_or(raw.len());
            raw[m.end()..end].trim()
        })
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| raw.trim())
        .to_string();

    let judge_reasoning = reasoning
        .map(|m| {
            let end = answer
                .filter(|a| a.start() >= m.end())
                .map(|a| a.start())
                .unwrap_or(raw.len());
            raw[m.end()..end].trim()
        })
        .filter(|text| !text.is_empty())
        .unwrap_or(NO_REASONING_PROVIDED)
        .to_string();

    JudgeRecord {
        final_answer,
        judge_reasoning,
        error: None,
    }
}

/// `q-<base36 millis>-<random>`; unique within a running process.
pub fn generate_query_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let random = Uuid::new_v4().simple().to_string();
    format!("q-{}-{}", to_base36(millis), &random[..8])
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn because_without_other_keywords_is_causal() {
        let raw = "The road is wet because it rained overnight.";
        assert_eq!(classify_reasoning(raw), ReasoningType::Causal);
    }

    #[test]
    fn math_keywords_take_priority() {
        let raw = "Therefore we calculate the probability, because of the effect.";
        assert_eq!(classify_reasoning(raw), ReasoningType::Mathematical);
    }

    #[test]
    fn probabilistic_beats_deductive() {
        let raw = "It is LIKELY, and therefore logically sound.";
        assert_eq!(classify_reasoning(raw), ReasoningType::Probabilistic);
    }

    #[test]
    fn deductive_and_default() {
        assert_eq!(classify_reasoning("We deduce the answer"), ReasoningType::Deductive);
        assert_eq!(classify_reasoning("Birds fly south in winter."), ReasoningType::Commonsense);
    }

    #[test]
    fn thinker_record_is_trimmed_and_internal() {
        let record = parse_thinker_response("\n  Let me calculate 2+2.  \n");
        assert!(record.internal);
        assert_eq!(record.raw, "Let me calculate 2+2.");
        assert_eq!(record.reasoning_type, ReasoningType::Mathematical);
        assert!(record.error.is_none());
    }

    #[test]
    fn critic_is_passthrough() {
        let record = parse_critic_response("  ## Verdict\nValid\n");
        assert!(record.internal);
        assert_eq!(record.raw, "## Verdict\nValid");
    }

    #[test]
    fn judge_sections_are_split() {
        let raw = "## User Facing Answer\n4\n\n## Reasoning\nThe Thinker was right.";
        let record = parse_judge_response(raw);
        assert_eq!(record.final_answer, "4");
        assert_eq!(record.judge_reasoning, "The Thinker was right.");
        assert!(!record.final_answer.contains("Reasoning"));
        assert!(!record.judge_reasoning.contains("User Facing Answer"));
    }

    #[test]
    fn judge_markers_are_case_insensitive() {
        let raw = "##   user facing ANSWER\n  Paris  \n## REASONING\n  Capital city.";
        let record = parse_judge_response(raw);
        assert_eq!(record.final_answer, "Paris");
        assert_eq!(record.judge_reasoning, "Capital city.");
    }

    #[test]
    fn missing_answer_marker_falls_back_to_whole_text() {
        let raw = "  Just an answer without sections.  ";
        let record = parse_judge_response(raw);
        assert_eq!(record.final_answer, raw.trim());
        assert_eq!(record.judge_reasoning, NO_REASONING_PROVIDED);
    }

    #[test]
    fn missing_answer_marker_keeps_reasoning_section() {
        let raw = "Answer: 4\n## Reasoning\nSimple sum.";
        let record = parse_judge_response(raw);
        assert_eq!(record.final_answer, raw.trim());
        assert_eq!(record.judge_reasoning, "Simple sum.");
    }

    #[test]
    fn reasoning_before_answer_is_still_extracted() {
        let raw = "## Reasoning\nBoth stages agree.\n\n## User Facing Answer\n4";
        let record = parse_judge_response(raw);
        assert_eq!(record.final_answer, "4");
        assert_eq!(record.judge_reasoning, "Both stages agree.");
    }

    #[test]
    fn answer_without_reasoning_runs_to_end() {
        let raw = "## User Facing Answer\nThe answer is 42.";
        let record = parse_judge_response(raw);
        assert_eq!(record.final_answer, "The answer is 42.");
        assert_eq!(record.judge_reasoning, NO_REASONING_PROVIDED);
    }

    #[test]
    fn query_ids_are_unique_and_prefixed() {
        let ids: HashSet<String> = (0..500).map(|_| generate_query_id()).collect();
        assert_eq!(ids.len(), 500);
        assert!(ids.iter().all(|id| id.starts_with("q-")));
    }

    #[test]
    fn base36_encoding() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
