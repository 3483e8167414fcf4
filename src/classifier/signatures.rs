/// Known AI agent signatures, in match priority order.
///
/// Matching is a case-sensitive substring test and the first hit wins, so a
/// signature that contains another one must be listed before it.
pub const KNOWN_AGENTS: &[(&str, &str)] = &[
    ("GPTBot", "OpenAI Training"),
    ("OAI-SearchBot", "OpenAI Search"),
    ("ChatGPT-User", "ChatGPT Real-time"),
    ("ClaudeBot", "Anthropic Claude"),
    ("anthropic-ai", "Anthropic AI"),
    ("claude-web", "Claude Web"),
    ("PerplexityBot", "Perplexity"),
    ("Perplexity-User", "Perplexity User"),
    ("Google-Extended", "Google Gemini"),
    ("BingBot", "Microsoft Bing"),
    ("Amazonbot", "Amazon"),
    ("Applebot-Extended", "Apple Extended"),
    ("Applebot", "Apple"),
    ("FacebookBot", "Meta Facebook"),
    ("meta-externalagent", "Meta External"),
    ("LinkedInBot", "LinkedIn"),
    ("Bytespider", "ByteDance TikTok"),
    ("DuckAssistBot", "DuckDuckGo"),
    ("cohere-ai", "Cohere"),
    ("AI2Bot", "Allen Institute"),
    ("CCBot", "Common Crawl"),
    ("Diffbot", "Diffbot"),
    ("omgili", "Omgili"),
    ("TimpiBot", "Timpi"),
    ("YouBot", "You.com"),
    ("MistralAI-User", "Mistral AI"),
];

/// Generic automation tokens, matched case-insensitively after the known list.
pub const GENERIC_PATTERNS: &[&str] = &["bot", "crawler", "spider", "scraper", "ai-agent", "llm"];

/// Name reported for generic matches.
pub const GENERIC_NAME: &str = "unknown";

/// Description reported for generic matches.
pub const GENERIC_DESCRIPTION: &str = "generic-automated";
