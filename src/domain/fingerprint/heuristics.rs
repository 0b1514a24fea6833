use serde::Serialize;
use std::fmt;

use super::HeaderSnapshot;

/// User-agent fragments that mark automated clients.
pub fn default_bot_patterns() -> Vec<String> {
    [
        "bot", "crawler", "spider", "scraper", "curl", "wget", "python", "java", "phantom",
        "headless",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

/// Why a request looked automated or spoofed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspicionReason {
    BotUserAgent,
    MissingUserAgent,
    MissingAcceptLanguage,
    MissingAcceptEncoding,
    ExcessiveRequestRate,
}

impl SuspicionReason {
    pub fn description(&self) -> &'static str {
        match self {
            SuspicionReason::BotUserAgent => "Bot-like user agent detected",
            SuspicionReason::MissingUserAgent => "Missing user agent",
            SuspicionReason::MissingAcceptLanguage => "Missing Accept-Language header",
            SuspicionReason::MissingAcceptEncoding => "Missing Accept-Encoding header",
            SuspicionReason::ExcessiveRequestRate => "Excessive request frequency",
        }
    }
}

impl fmt::Display for SuspicionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Header-only checks. Patterns match case-insensitively anywhere in the UA.
pub fn inspect_headers(headers: &HeaderSnapshot, bot_patterns: &[String]) -> Vec<SuspicionReason> {
    let mut reasons = Vec::new();

    let user_agent = headers.user_agent.trim().to_lowercase();
    if user_agent.is_empty() {
        reasons.push(SuspicionReason::MissingUserAgent);
    } else if bot_patterns
        .iter()
        .filter(|p| !p.is_empty())
        .any(|p| user_agent.contains(&p.to_lowercase()))
    {
        reasons.push(SuspicionReason::BotUserAgent);
    }

    if headers.accept_language.trim().is_empty() {
        reasons.push(SuspicionReason::MissingAcceptLanguage);
    }
    if headers.accept_encoding.trim().is_empty() {
        reasons.push(SuspicionReason::MissingAcceptEncoding);
    }

    reasons
}

/// Result of `evaluate`: suspicious iff at least one reason fired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub suspicious: bool,
    pub reasons: Vec<SuspicionReason>,
}

impl Evaluation {
    /// Combines header checks with the per-minute request count.
    pub fn from_checks(
        headers: &HeaderSnapshot,
        bot_patterns: &[String],
        requests_this_minute: u64,
        max_requests_per_minute: u64,
    ) -> Self {
        let mut reasons = inspect_headers(headers, bot_patterns);
        if requests_this_minute > max_requests_per_minute {
            reasons.push(SuspicionReason::ExcessiveRequestRate);
        }
        Self {
            suspicious: !reasons.is_empty(),
            reasons,
        }
    }

    /// Human-readable summary, used as an automatic block reason.
    pub fn summary(&self) -> String {
        self.reasons
            .iter()
            .map(|r| r.description())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn browser() -> HeaderSnapshot {
        HeaderSnapshot {
            user_agent: "Mozilla/5.0 Firefox/121.0".to_string(),
            accept_language: "en-US".to_string(),
            accept_encoding: "gzip".to_string(),
            ..HeaderSnapshot::default()
        }
    }

    #[test]
    fn ordinary_browser_is_clean() {
        let eval = Evaluation::from_checks(&browser(), &default_bot_patterns(), 3, 60);
        assert!(!eval.suspicious);
        assert!(eval.reasons.is_empty());
    }

    #[test]
    fn bot_pattern_matches_case_insensitively() {
        let headers = HeaderSnapshot {
            user_agent: "Mozilla/5.0 (compatible; Googlebot/2.1)".to_string(),
            ..browser()
        };
        let reasons = inspect_headers(&headers, &default_bot_patterns());
        assert_eq!(reasons, vec![SuspicionReason::BotUserAgent]);

        let headless = HeaderSnapshot {
            user_agent: "HeadlessChrome/120".to_string(),
            ..browser()
        };
        assert!(inspect_headers(&headless, &default_bot_patterns())
            .contains(&SuspicionReason::BotUserAgent));
    }

    #[test]
    fn missing_headers_are_each_reported() {
        let reasons = inspect_headers(&HeaderSnapshot::default(), &default_bot_patterns());
        assert_eq!(
            reasons,
            vec![
                SuspicionReason::MissingUserAgent,
                SuspicionReason::MissingAcceptLanguage,
                SuspicionReason::MissingAcceptEncoding,
            ]
        );
    }

    #[test]
    fn rate_above_limit_is_suspicious() {
        let at_limit = Evaluation::from_checks(&browser(), &default_bot_patterns(), 60, 60);
        assert!(!at_limit.suspicious);

        let over = Evaluation::from_checks(&browser(), &default_bot_patterns(), 61, 60);
        assert!(over.suspicious);
        assert_eq!(over.reasons, vec![SuspicionReason::ExcessiveRequestRate]);
    }

    #[test]
    fn summary_joins_descriptions() {
        let eval = Evaluation::from_checks(&HeaderSnapshot::default(), &[], 0, 60);
        assert_eq!(
            eval.summary(),
            "Missing user agent; Missing Accept-Language header; Missing Accept-Encoding header"
        );
    }
}
