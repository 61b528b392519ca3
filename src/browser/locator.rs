use std::fmt;
use std::time::Duration;

use serde::Serialize;

use super::Page;
use crate::error::{BrowserError, BrowserResult};

/// A label pattern, matched as a regular expression against trimmed text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TextMatch {
    pub pattern: String,
    pub ignore_case: bool,
}

impl TextMatch {
    /// Case-insensitive pattern.
    pub fn ci(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ignore_case: true,
        }
    }

    pub fn exact(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ignore_case: false,
        }
    }

    /// Same semantics as the in-page matcher, for logs and test doubles.
    pub fn is_match(&self, text: &str) -> bool {
        regex::RegexBuilder::new(&self.pattern)
            .case_insensitive(self.ignore_case)
            .build()
            .map(|re| re.is_match(text.trim()))
            .unwrap_or(false)
    }
}

impl fmt::Display for TextMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.pattern, if self.ignore_case { "i" } else { "" })
    }
}

/// Structured element query, resolved inside the page by a fixed script.
///
/// Locators describe *what* a user would look for (a button named
/// "Exportar", the split toggle next to it) rather than a brittle path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    Css {
        selector: String,
    },
    /// ARIA role (explicit or implicit) plus accessible name
    Role {
        role: String,
        name: TextMatch,
    },
    /// Innermost elements whose text matches
    Text {
        text: TextMatch,
    },
    /// CSS matches that also contain matching text
    HasText {
        selector: String,
        text: TextMatch,
    },
    /// `inner` searched under each match of `scope`
    Within {
        scope: Box<Locator>,
        inner: Box<Locator>,
    },
    /// Later siblings of the anchor's first match that satisfy `selector`
    FollowingSibling {
        anchor: Box<Locator>,
        selector: String,
    },
    /// Union of all options, in document order
    Any {
        options: Vec<Locator>,
    },
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css {
            selector: selector.into(),
        }
    }

    pub fn role(role: impl Into<String>, name: TextMatch) -> Self {
        Locator::Role {
            role: role.into(),
            name,
        }
    }

    pub fn text(text: TextMatch) -> Self {
        Locator::Text { text }
    }

    pub fn has_text(selector: impl Into<String>, text: TextMatch) -> Self {
        Locator::HasText {
            selector: selector.into(),
            text,
        }
    }

    pub fn within(self, scope: &Locator) -> Self {
        Locator::Within {
            scope: Box::new(scope.clone()),
            inner: Box::new(self),
        }
    }

    pub fn following_sibling(anchor: &Locator, selector: impl Into<String>) -> Self {
        Locator::FollowingSibling {
            anchor: Box::new(anchor.clone()),
            selector: selector.into(),
        }
    }

    pub fn or(self, other: Locator) -> Self {
        match self {
            Locator::Any { mut options } => {
                options.push(other);
                Locator::Any { options }
            }
            first => Locator::Any {
                options: vec![first, other],
            },
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css { selector } => write!(f, "{selector}"),
            Locator::Role { role, name } => write!(f, "role={role}[name={name}]"),
            Locator::Text { text } => write!(f, "text={text}"),
            Locator::HasText { selector, text } => write!(f, "{selector}:has-text({text})"),
            Locator::Within { scope, inner } => write!(f, "{scope} >> {inner}"),
            Locator::FollowingSibling { anchor, selector } => write!(f, "{anchor} ~ {selector}"),
            Locator::Any { options } => {
                let parts: Vec<String> = options.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(" | "))
            }
        }
    }
}

/// Ranked fallback strategies; the first one with a match wins.
#[derive(Debug, Clone, Default)]
pub struct LocatorChain {
    candidates: Vec<(String, Locator)>,
}

impl LocatorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, label: impl Into<String>, locator: Locator) -> Self {
        self.candidates.push((label.into(), locator));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// First candidate that currently matches at least one element.
    pub async fn resolve(&self, page: &dyn Page) -> BrowserResult<Option<(&str, &Locator)>> {
        for (label, locator) in &self.candidates {
            match page.count(locator).await {
                Ok(n) if n > 0 => {
                    tracing::debug!(strategy = %label, matches = n, "locator resolved");
                    return Ok(Some((label.as_str(), locator)));
                }
                Ok(_) | Err(BrowserError::Script(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Poll [`resolve`](Self::resolve) until a candidate matches or `timeout`
    /// elapses.
    pub async fn resolve_within(
        &self,
        page: &dyn Page,
        timeout: Duration,
    ) -> BrowserResult<(&str, &Locator)> {
        let poll = async {
            loop {
                if let Some(found) = self.resolve(page).await? {
                    return Ok(found);
                }
                tokio::time::sleep(super::wait::POLL_INTERVAL).await;
            }
        };
        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::timeout(self.describe(), timeout)),
        }
    }

    fn describe(&self) -> String {
        let labels: Vec<&str> = self.candidates.iter().map(|(l, _)| l.as_str()).collect();
        format!("any of [{}]", labels.join(", "))
    }
}
