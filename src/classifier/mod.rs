//! AI agent classification from a client's identifying string
//!
//! Classification is pure and total: every input maps to a result, and
//! "not detected" is a normal outcome rather than an error.

mod signatures;

use serde::{Deserialize, Serialize};

pub use signatures::{GENERIC_DESCRIPTION, GENERIC_NAME, GENERIC_PATTERNS, KNOWN_AGENTS};

/// How a detection was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Matched a named agent signature
    Known,
    /// Matched one of the generic automation tokens
    Generic,
}

/// Result of classifying an identifying string
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub detected: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_kind: Option<MatchKind>,

    /// Generic token that triggered a `Generic` match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_used: Option<String>,
}

impl ClassificationResult {
    /// The "nothing matched" result
    pub fn undetected() -> Self {
        Self::default()
    }

    fn known(name: &str, description: &str) -> Self {
        Self {
            matched_name: Some(name.to_string()),
            description: Some(description.to_string()),
            detected: true,
            match_kind: Some(MatchKind::Known),
            pattern_used: None,
        }
    }

    fn generic(pattern: &str) -> Self {
        Self {
            matched_name: Some(GENERIC_NAME.to_string()),
            description: Some(GENERIC_DESCRIPTION.to_string()),
            detected: true,
            match_kind: Some(MatchKind::Generic),
            pattern_used: Some(pattern.to_string()),
        }
    }
}

/// Classify an identifying string (user agent or equivalent).
pub fn classify(identifying: &str) -> ClassificationResult {
    if identifying.is_empty() {
        return ClassificationResult::undetected();
    }

    if let Some((name, description)) = KNOWN_AGENTS
        .iter()
        .find(|(signature, _)| identifying.contains(signature))
    {
        return ClassificationResult::known(name, description);
    }

    let lowered = identifying.to_ascii_lowercase();
    if let Some(pattern) = GENERIC_PATTERNS
        .iter()
        .find(|pattern| lowered.contains(*pattern))
    {
        return ClassificationResult::generic(pattern);
    }

    ClassificationResult::undetected()
}

/// Classify raw bytes, e.g. a `User-Agent` header that is not valid UTF-8.
///
/// Invalid sequences are replaced before matching; signatures are ASCII so
/// replacement never creates or hides a match.
pub fn classify_bytes(identifying: &[u8]) -> ClassificationResult {
    classify(&String::from_utf8_lossy(identifying))
}

/// The ordered signature table, for listing.
pub fn known_agents() -> &'static [(&'static str, &'static str)] {
    KNOWN_AGENTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_agent_exact_label() {
        let result = classify("Mozilla/5.0 (compatible; ClaudeBot/1.0)");
        assert_eq!(
            result,
            ClassificationResult {
                matched_name: Some("ClaudeBot".to_string()),
                description: Some("Anthropic Claude".to_string()),
                detected: true,
                match_kind: Some(MatchKind::Known),
                pattern_used: None,
            }
        );
    }

    #[test]
    fn test_every_signature_maps_to_its_label() {
        for (signature, label) in KNOWN_AGENTS {
            let ua = format!("Mozilla/5.0 (compatible; {}/1.0)", signature);
            let result = classify(&ua);
            assert!(result.detected, "{} should be detected", signature);
            assert_eq!(result.matched_name.as_deref(), Some(*signature));
            assert_eq!(result.description.as_deref(), Some(*label));
        }
    }

    #[test]
    fn test_specific_signature_wins_over_contained_one() {
        let result = classify("Mozilla/5.0 (Applebot-Extended/0.1)");
        assert_eq!(result.matched_name.as_deref(), Some("Applebot-Extended"));
    }

    #[test]
    fn test_known_match_is_case_sensitive() {
        // "bingbot" misses "BingBot" but still trips the generic "bot" token
        let result = classify("Mozilla/5.0 (compatible; bingbot/2.0)");
        assert_eq!(result.match_kind, Some(MatchKind::Generic));
        assert_eq!(result.pattern_used.as_deref(), Some("bot"));
    }

    #[test]
    fn test_generic_pattern() {
        let result = classify("SomeCrawler/2.0");
        assert!(result.detected);
        assert_eq!(result.match_kind, Some(MatchKind::Generic));
        assert_eq!(result.matched_name.as_deref(), Some("unknown"));
        assert_eq!(result.description.as_deref(), Some("generic-automated"));
        assert_eq!(result.pattern_used.as_deref(), Some("crawler"));
    }

    #[test]
    fn test_generic_patterns_in_order() {
        assert_eq!(classify("my-LLM-client").pattern_used.as_deref(), Some("llm"));
        assert_eq!(classify("an AI-Agent").pattern_used.as_deref(), Some("ai-agent"));
        // "spiderbot" hits "bot" first because it is earlier in the list
        assert_eq!(classify("spiderbot").pattern_used.as_deref(), Some("bot"));
    }

    #[test]
    fn test_not_detected() {
        assert_eq!(classify(""), ClassificationResult::undetected());
        assert_eq!(
            classify("Mozilla/5.0 (Windows NT 10.0)"),
            ClassificationResult::undetected()
        );
    }

    #[test]
    fn test_undetected_serializes_to_detected_only() {
        let json = serde_json::to_value(classify("")).unwrap();
        assert_eq!(json, serde_json::json!({ "detected": false }));
    }

    #[test]
    fn test_non_utf8_bytes() {
        let mut bytes = b"\xff\xfeGPTBot/1.1 \xc3".to_vec();
        bytes.push(0x80);
        let result = classify_bytes(&bytes);
        assert_eq!(result.matched_name.as_deref(), Some("GPTBot"));

        assert!(!classify_bytes(b"\xff\xff\xff").detected);
    }
}
