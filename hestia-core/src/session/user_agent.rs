//! Coarse user-agent classification

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserAgentClass {
    Browser,
    Mobile,
    Bot,
    /// Command-line clients and HTTP libraries
    Tool,
    #[default]
    Unknown,
}

const BOT_MARKERS: &[&str] = &["bot", "crawler", "spider", "slurp", "facebookexternalhit"];
const TOOL_MARKERS: &[&str] =
    &["curl/", "wget/", "python-requests", "python-urllib", "go-http-client", "reqwest", "httpie"];
const MOBILE_MARKERS: &[&str] = &["mobile", "android", "iphone", "ipad", "ipod"];

impl UserAgentClass {
    pub fn classify(user_agent: Option<&str>) -> Self {
        let Some(ua) = user_agent.map(str::to_ascii_lowercase) else {
            return UserAgentClass::Unknown;
        };
        if ua.trim().is_empty() {
            return UserAgentClass::Unknown;
        }

        if BOT_MARKERS.iter().any(|m| ua.contains(m)) {
            UserAgentClass::Bot
        } else if TOOL_MARKERS.iter().any(|m| ua.contains(m)) {
            UserAgentClass::Tool
        } else if MOBILE_MARKERS.iter().any(|m| ua.contains(m)) {
            UserAgentClass::Mobile
        } else if ua.starts_with("mozilla/") || ua.starts_with("opera/") {
            UserAgentClass::Browser
        } else {
            UserAgentClass::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(
            UserAgentClass::classify(Some(
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36"
            )),
            UserAgentClass::Browser
        );
        assert_eq!(
            UserAgentClass::classify(Some("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0) Mobile/15E148")),
            UserAgentClass::Mobile
        );
        assert_eq!(
            UserAgentClass::classify(Some("Mozilla/5.0 (compatible; Googlebot/2.1)")),
            UserAgentClass::Bot
        );
        assert_eq!(UserAgentClass::classify(Some("curl/8.4.0")), UserAgentClass::Tool);
        assert_eq!(UserAgentClass::classify(None), UserAgentClass::Unknown);
    }
}
