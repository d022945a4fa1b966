use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Wildcard origin string: accept or address any counterparty.
pub const ANY_ORIGIN: &str = "*";

/// Trust anchor used to filter inbound traffic and to tag outbound traffic.
///
/// `Origin::Any` is the `"*"` wildcard. It disables origin isolation and
/// must be an explicit opt-in; prefer pinning an exact origin such as
/// `https://parent.example.com`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Origin {
    Any,
    Exact(Arc<str>),
}

impl Origin {
    /// Parse an origin string; `"*"` becomes [`Origin::Any`].
    pub fn new(origin: impl AsRef<str>) -> Self {
        // ---
        match origin.as_ref() {
            ANY_ORIGIN => Origin::Any,
            exact => Origin::Exact(Arc::from(exact)),
        }
    }

    /// Does a message from `sender` pass this filter?
    pub fn matches(&self, sender: &str) -> bool {
        match self {
            Origin::Any => true,
            Origin::Exact(expected) => &**expected == sender,
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Origin::Any)
    }

    /// The string handed to the platform when sending.
    pub fn as_str(&self) -> &str {
        match self {
            Origin::Any => ANY_ORIGIN,
            Origin::Exact(origin) => origin,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Origin {
    fn from(value: &str) -> Self {
        Origin::new(value)
    }
}

impl From<String> for Origin {
    fn from(value: String) -> Self {
        Origin::new(value)
    }
}

impl From<Origin> for String {
    fn from(value: Origin) -> Self {
        value.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_wildcard_matches_everything() {
        // ---
        let origin = Origin::new("*");
        assert!(origin.is_any());
        assert!(origin.matches("https://evil.example.com"));
        assert!(origin.matches(""));
        assert_eq!(origin.as_str(), "*");
    }

    #[test]
    fn test_exact_origin_is_strict() {
        // ---
        let origin = Origin::from("https://parent.example.com");
        assert!(origin.matches("https://parent.example.com"));
        assert!(!origin.matches("https://parent.example.com:8443"));
        assert!(!origin.matches("http://parent.example.com"));
        assert!(!origin.matches("*"));
    }

    #[test]
    fn test_serde_as_string() {
        // ---
        let origin: Origin = serde_json::from_str("\"*\"").unwrap();
        assert_eq!(origin, Origin::Any);
        assert_eq!(
            serde_json::to_string(&Origin::from("https://a.example")).unwrap(),
            "\"https://a.example\""
        );
    }
}
