//! Resolution of placeholder tokens left in transform output.
//!
//! A placeholder is a self-closing element in the placeholder prefix, such as
//! `<res:idCitation />` or `<res:idTitle xmlns:res="…"/>`. Its local name is the
//! resource key. The scan is a single forward pass; a candidate's tail ends at
//! the first `<` or `>`, and scanning resumes there, so every byte is visited
//! once. The clock is sampled every `DEADLINE_CHECK_BYTES` of progress.

use log::{debug, warn};
use metadoc_traits::SharedResourceResolver;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const DEFAULT_PREFIX: &str = "res";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(250);

/// Candidates scanned between deadline checks.
const DEADLINE_CHECK_INTERVAL: usize = 256;

/// Bytes scanned between deadline checks.
const DEADLINE_CHECK_BYTES: usize = 64 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocalizeError {
    #[error("Placeholder resolution exceeded {budget:?} (ran {elapsed:?})")]
    Timeout { budget: Duration, elapsed: Duration },

    #[error("No resource string for placeholder '{key}'")]
    UnresolvedPlaceholder { key: String },
}

/// What to do with a placeholder whose key the resolver does not know.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnresolvedPolicy {
    /// Leave the token in the output verbatim.
    #[default]
    KeepToken,
    /// Replace the token with nothing.
    Remove,
    /// Abort the render.
    Fail,
}

impl FromStr for UnresolvedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keepToken" | "keep-token" | "keep" => Ok(UnresolvedPolicy::KeepToken),
            "remove" => Ok(UnresolvedPolicy::Remove),
            "fail" => Ok(UnresolvedPolicy::Fail),
            other => Err(format!(
                "unknown unresolved policy '{}' (expected keep-token, remove or fail)",
                other
            )),
        }
    }
}

impl fmt::Display for UnresolvedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnresolvedPolicy::KeepToken => "keep-token",
            UnresolvedPolicy::Remove => "remove",
            UnresolvedPolicy::Fail => "fail",
        })
    }
}

/// Localized text and what happened to its placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Localized {
    pub text: String,
    pub resolved: usize,
    /// Keys without a resource string, in order of appearance.
    pub unresolved: Vec<String>,
}

/// A placeholder found in the scanned text.
struct Token<'t> {
    start: usize,
    end: usize,
    key: &'t str,
}

#[derive(Debug, Clone)]
pub struct LocalizationResolver {
    resolver: SharedResourceResolver,
    prefix: String,
    policy: UnresolvedPolicy,
    timeout: Duration,
}

impl LocalizationResolver {
    pub fn new(resolver: SharedResourceResolver) -> Self {
        Self {
            resolver,
            prefix: DEFAULT_PREFIX.to_string(),
            policy: UnresolvedPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_policy(mut self, policy: UnresolvedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn policy(&self) -> UnresolvedPolicy {
        self.policy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Replaces every placeholder in `text` with its resource string.
    ///
    /// # Errors
    ///
    /// `Timeout` if the scan overruns its budget, `UnresolvedPlaceholder` for
    /// an unknown key under `UnresolvedPolicy::Fail`. No text is returned in
    /// either case.
    pub fn resolve(&self, text: &str) -> Result<Localized, LocalizeError> {
        let mut deadline = Deadline::new(self.timeout);
        let opener = format!("<{}:", self.prefix);
        let mut out = String::with_capacity(text.len());
        let mut resolved = 0;
        let mut unresolved = Vec::new();
        let mut copied = 0;
        let mut cursor = 0;
        let mut candidates = 0;

        while let Some(candidate) = find_opener(text, cursor, opener.as_bytes(), &mut deadline)? {
            candidates += 1;
            if candidates % DEADLINE_CHECK_INTERVAL == 0 {
                deadline.check()?;
            }

            let token = match scan_token(text, candidate, opener.len(), &mut deadline)? {
                Scan::Token(token) => token,
                Scan::Miss { resume } => {
                    cursor = resume;
                    continue;
                }
            };

            out.push_str(&text[copied..token.start]);
            match self.resolver.resolve_resource_string(token.key) {
                Some(value) => {
                    out.push_str(&value);
                    resolved += 1;
                }
                None => {
                    warn!("No resource string for placeholder '{}'", token.key);
                    match self.policy {
                        UnresolvedPolicy::KeepToken => out.push_str(&text[token.start..token.end]),
                        UnresolvedPolicy::Remove => {}
                        UnresolvedPolicy::Fail => {
                            return Err(LocalizeError::UnresolvedPlaceholder {
                                key: token.key.to_string(),
                            });
                        }
                    }
                    unresolved.push(token.key.to_string());
                }
            }
            copied = token.end;
            cursor = token.end;
        }
        deadline.check()?;
        out.push_str(&text[copied..]);

        debug!(
            "Localized {} placeholders ({} unresolved) in {:?}",
            resolved,
            unresolved.len(),
            deadline.elapsed()
        );
        Ok(Localized {
            text: out,
            resolved,
            unresolved,
        })
    }
}

/// Wall-clock budget for one scan, sampled as the scan position advances.
struct Deadline {
    started: Instant,
    budget: Duration,
    next_check: usize,
}

impl Deadline {
    fn new(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
            next_check: 0,
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn check(&self) -> Result<(), LocalizeError> {
        let elapsed = self.elapsed();
        if elapsed > self.budget {
            return Err(LocalizeError::Timeout {
                budget: self.budget,
                elapsed,
            });
        }
        Ok(())
    }

    /// Checks the clock once the scan has moved `DEADLINE_CHECK_BYTES` past
    /// the previous check.
    fn advance_to(&mut self, position: usize) -> Result<(), LocalizeError> {
        if position < self.next_check {
            return Ok(());
        }
        self.next_check = position + DEADLINE_CHECK_BYTES;
        self.check()
    }
}

enum Scan<'t> {
    Token(Token<'t>),
    /// Not a placeholder. No opener starts before `resume`.
    Miss { resume: usize },
}

/// Position of the next `opener` at or after `from`.
fn find_opener(
    text: &str,
    from: usize,
    opener: &[u8],
    deadline: &mut Deadline,
) -> Result<Option<usize>, LocalizeError> {
    let bytes = text.as_bytes();
    let mut pos = from;
    while pos < bytes.len() {
        let window_end = (pos + DEADLINE_CHECK_BYTES).min(bytes.len());
        match bytes[pos..window_end].iter().position(|b| *b == b'<') {
            Some(n) if bytes[pos + n..].starts_with(opener) => return Ok(Some(pos + n)),
            Some(n) => pos += n + 1,
            None => pos = window_end,
        }
        deadline.advance_to(pos)?;
    }
    Ok(None)
}

/// Keys are word characters: letters, digits, marks and `_`.
fn is_key_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Matches `<prefix:key …/>` at `start`, where `opener_len` covers `<prefix:`.
fn scan_token<'t>(
    text: &'t str,
    start: usize,
    opener_len: usize,
    deadline: &mut Deadline,
) -> Result<Scan<'t>, LocalizeError> {
    let bytes = text.as_bytes();
    let key_start = start + opener_len;
    let mut key_end = text.len();
    for (offset, c) in text[key_start..].char_indices() {
        if !is_key_char(c) {
            key_end = key_start + offset;
            break;
        }
        deadline.advance_to(key_start + offset)?;
    }
    if key_end == key_start {
        return Ok(Scan::Miss { resume: key_start });
    }

    // The key must be followed by whitespace or the closing `/>`.
    match bytes.get(key_end) {
        Some(b) if b.is_ascii_whitespace() || *b == b'/' => {}
        _ => return Ok(Scan::Miss { resume: key_end }),
    }

    let mut i = key_end;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => return Ok(Scan::Miss { resume: i }),
            b'>' => return Ok(Scan::Miss { resume: i + 1 }),
            b'/' if bytes.get(i + 1) == Some(&b'>') => {
                return Ok(Scan::Token(Token {
                    start,
                    end: i + 2,
                    key: &text[key_start..key_end],
                }));
            }
            _ => i += 1,
        }
        deadline.advance_to(i)?;
    }
    Ok(Scan::Miss { resume: bytes.len() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use metadoc_traits::InMemoryResourceResolver;
    use std::sync::Arc;

    fn localizer() -> LocalizationResolver {
        LocalizationResolver::new(Arc::new(InMemoryResourceResolver::from_pairs([
            ("title", "Overview"),
            ("idAbstract", "Abstract"),
        ])))
    }

    #[test]
    fn test_replaces_simple_token() {
        let out = localizer().resolve("<p><res:title/></p>").unwrap();
        assert_eq!(out.text, "<p>Overview</p>");
        assert_eq!(out.resolved, 1);
        assert!(out.unresolved.is_empty());
    }

    #[test]
    fn test_token_with_attributes_and_spaces() {
        let text = r#"<h2><res:idAbstract xmlns:res="http://www.esri.com/metadata/res/" /></h2><res:title />"#;
        let out = localizer().resolve(text).unwrap();
        assert_eq!(out.text, "<h2>Abstract</h2>Overview");
        assert_eq!(out.resolved, 2);
    }

    #[test]
    fn test_non_tokens_are_untouched() {
        let text = "<res:open>x</res:open><res:/><res:a-b/><resx:title/><res:title";
        let out = localizer().resolve(text).unwrap();
        assert_eq!(out.text, text);
        assert_eq!(out.resolved, 0);
    }

    #[test]
    fn test_tail_stops_at_angle_brackets() {
        let text = "<res:title <b>x</b> />";
        let out = localizer().resolve(text).unwrap();
        assert_eq!(out.text, text);
    }

    #[test]
    fn test_custom_prefix() {
        let out = localizer()
            .with_prefix("loc")
            .resolve("<loc:title/> <res:title/>")
            .unwrap();
        assert_eq!(out.text, "Overview <res:title/>");
    }

    #[test]
    fn test_unresolved_policies() {
        let text = "a<res:missing/>b<res:title/>";

        let kept = localizer().resolve(text).unwrap();
        assert_eq!(kept.text, "a<res:missing/>bOverview");
        assert_eq!(kept.unresolved, vec!["missing".to_string()]);

        let removed = localizer()
            .with_policy(UnresolvedPolicy::Remove)
            .resolve(text)
            .unwrap();
        assert_eq!(removed.text, "abOverview");
        assert_eq!(removed.unresolved.len(), 1);

        let err = localizer()
            .with_policy(UnresolvedPolicy::Fail)
            .resolve(text)
            .unwrap_err();
        assert_eq!(
            err,
            LocalizeError::UnresolvedPlaceholder {
                key: "missing".to_string()
            }
        );
    }

    #[test]
    fn test_adversarial_input_times_out() {
        let text = "<res:aaaa ".repeat(200_000);
        let start = Instant::now();
        let err = localizer()
            .with_timeout(Duration::from_nanos(1))
            .resolve(&text)
            .unwrap_err();
        assert!(matches!(err, LocalizeError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_deadline_holds_inside_a_long_candidate() {
        // One candidate whose tail never closes, then nothing but attribute text.
        let mut text = String::from("<res:a ");
        text.push_str(&" x".repeat(32 * 1024 * 1024));
        let budget = Duration::from_millis(10);

        let start = Instant::now();
        let err = localizer().with_timeout(budget).resolve(&text).unwrap_err();
        let took = start.elapsed();

        assert!(matches!(err, LocalizeError::Timeout { .. }));
        assert!(
            took < budget + Duration::from_millis(150),
            "scan ran {:?} against a {:?} budget",
            took,
            budget
        );
    }

    #[test]
    fn test_deadline_holds_over_placeholder_free_text() {
        let text = "plain text without markup ".repeat(2 * 1024 * 1024);
        let budget = Duration::from_millis(5);

        let start = Instant::now();
        let err = localizer().with_timeout(budget).resolve(&text).unwrap_err();
        let took = start.elapsed();

        assert!(matches!(err, LocalizeError::Timeout { .. }));
        assert!(took < budget + Duration::from_millis(150), "scan ran {:?}", took);
    }

    #[test]
    fn test_unicode_keys() {
        let resolver = LocalizationResolver::new(Arc::new(InMemoryResourceResolver::from_pairs([
            ("título", "Título"),
            ("名前", "Name"),
        ])));
        let out = resolver.resolve("<p><res:título/></p><p><res:名前 /></p>").unwrap();
        assert_eq!(out.text, "<p>Título</p><p>Name</p>");
        assert_eq!(out.resolved, 2);
    }

    #[test]
    fn test_rejected_candidate_does_not_hide_the_next_token() {
        let out = localizer()
            .resolve("<res:broken attr<res:title/> <res:x>y</res:x><res:idAbstract/>")
            .unwrap();
        assert_eq!(out.text, "<res:broken attrOverview <res:x>y</res:x>Abstract");
        assert_eq!(out.resolved, 2);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("keep-token".parse::<UnresolvedPolicy>(), Ok(UnresolvedPolicy::KeepToken));
        assert_eq!("keepToken".parse::<UnresolvedPolicy>(), Ok(UnresolvedPolicy::KeepToken));
        assert_eq!("fail".parse::<UnresolvedPolicy>(), Ok(UnresolvedPolicy::Fail));
        assert!("sometimes".parse::<UnresolvedPolicy>().is_err());
        let json: UnresolvedPolicy = serde_json::from_str("\"remove\"").unwrap();
        assert_eq!(json, UnresolvedPolicy::Remove);
    }
}
