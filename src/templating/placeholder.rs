//! Placeholder token syntax.
//!
//! ```text
//! {{ <dotted.path> [:<transform>] [||<default>] }}
//! ```
//!
//! The first path segment is the placeholder's *root*. Item references use the
//! item's source id as root (`{{6f2a.itemId}}`, `{{6f2a.layer0.url}}`), which is how
//! resolution policies decide whether a token belongs to a dependency.

use regex::Regex;
use std::sync::OnceLock;

use super::transforms::Transform;
use crate::core::DeployError;

/// Server portion of portal URLs in templates.
pub const PLACEHOLDER_SERVER_NAME: &str = "{{portalBaseUrl}}";

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("placeholder regex is valid"))
}

/// A parsed `{{...}}` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder<'a> {
    /// Full token text including braces.
    pub token: &'a str,
    pub path: &'a str,
    pub transform: Option<&'a str>,
    pub default: Option<&'a str>,
}

impl<'a> Placeholder<'a> {
    fn parse(token: &'a str, inner: &'a str) -> Self {
        let (expr, default) = match inner.split_once("||") {
            Some((expr, default)) => (expr.trim(), Some(default.trim())),
            None => (inner.trim(), None),
        };
        let (path, transform) = match expr.split_once(':') {
            Some((path, transform)) => (path.trim(), Some(transform.trim())),
            None => (expr, None),
        };
        Self {
            token,
            path,
            transform,
            default,
        }
    }

    /// First segment of the path.
    pub fn root(&self) -> &'a str {
        self.path.split('.').next().unwrap_or(self.path)
    }

    pub fn transform(&self) -> Result<Transform, DeployError> {
        Transform::from_name(self.transform.unwrap_or_default())
    }
}

/// A placeholder with its byte range in the scanned string.
#[derive(Debug, Clone)]
pub struct Located<'a> {
    pub start: usize,
    pub end: usize,
    pub placeholder: Placeholder<'a>,
}

/// Find every placeholder in `text`, in order.
pub fn scan(text: &str) -> Vec<Located<'_>> {
    placeholder_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let inner = caps.get(1)?;
            Some(Located {
                start: whole.start(),
                end: whole.end(),
                placeholder: Placeholder::parse(whole.as_str(), inner.as_str()),
            })
        })
        .collect()
}

/// Whether `text` contains any placeholder.
pub fn contains_placeholder(text: &str) -> bool {
    placeholder_regex().is_match(text)
}

/// Replace every occurrence of `term` in `context` with `{{term<suffix>}}`.
///
/// ```rust
/// use solution_deployer::templating::templatize_term;
///
/// assert_eq!(templatize_term("abc", "abc", ".layer0.url"), "{{abc.layer0.url}}");
/// assert_eq!(templatize_term("abc", "abc", ".itemId"), "{{abc.itemId}}");
/// ```
pub fn templatize_term(context: &str, term: &str, suffix: &str) -> String {
    if term.is_empty() {
        return context.to_string();
    }
    context.replace(term, &format!("{{{{{term}{suffix}}}}}"))
}
