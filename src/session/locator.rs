//! Target-element descriptor parsing.

use serde::{Deserialize, Serialize};

/// Resolved addressing strategy for a step's target element.
///
/// A single step definition may carry either addressing style; the parse
/// rule is fixed so flows stay declarative: an explicit `xpath=` prefix or
/// a leading path character selects the structural form, everything else
/// is a flat CSS selector (with an optional `css=` prefix).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Locator {
    /// Structural XPath.
    Structural(String),
    /// Flat CSS selector.
    Flat(String),
}

impl Locator {
    pub fn parse(target: &str) -> Self {
        let target = target.trim();
        if let Some(path) = target.strip_prefix("xpath=") {
            return Self::Structural(path.to_string());
        }
        if let Some(selector) = target.strip_prefix("css=") {
            return Self::Flat(selector.to_string());
        }
        if target.starts_with('/') || target.starts_with('(') {
            return Self::Structural(target.to_string());
        }
        Self::Flat(target.to_string())
    }

    pub(crate) fn as_webdriver(&self) -> fantoccini::Locator<'_> {
        match self {
            Self::Structural(path) => fantoccini::Locator::XPath(path),
            Self::Flat(selector) => fantoccini::Locator::Css(selector),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Structural(path) => write!(f, "xpath {path}"),
            Self::Flat(selector) => write!(f, "css {selector}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_selector_is_flat() {
        assert_eq!(
            Locator::parse("#userId"),
            Locator::Flat("#userId".to_string())
        );
        assert_eq!(
            Locator::parse("button.n-form"),
            Locator::Flat("button.n-form".to_string())
        );
    }

    #[test]
    fn leading_slash_is_structural() {
        assert_eq!(
            Locator::parse("//div[@id='x']/a"),
            Locator::Structural("//div[@id='x']/a".to_string())
        );
        assert_eq!(
            Locator::parse("(//table//tr)[2]"),
            Locator::Structural("(//table//tr)[2]".to_string())
        );
    }

    #[test]
    fn explicit_prefixes_win() {
        assert_eq!(
            Locator::parse("xpath=//a[text()='go']"),
            Locator::Structural("//a[text()='go']".to_string())
        );
        // css= forces flat even for path-looking selectors
        assert_eq!(
            Locator::parse("css=#go > a"),
            Locator::Flat("#go > a".to_string())
        );
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert_eq!(
            Locator::parse("  #go  "),
            Locator::Flat("#go".to_string())
        );
    }
}
