//! Resource locators and locator pattern matching.
//!
//! # Responsibility
//! - Parse `scheme://authority/segment/...` locators into a canonical form.
//! - Route locators to registered codes through `UriMatcher`.
//!
//! # Invariants
//! - Registered patterns are pairwise disjoint; overlaps are rejected when
//!   registering, so matching never needs a tie-break.
//! - A `#` pattern segment only matches a non-negative decimal integer that
//!   fits in `i64`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

static LOCATOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*)://([^/?#]+)([^?#]*)(?:\?[^#]*)?(?:#.*)?$")
        .expect("valid locator regex")
});

/// Pattern segment that matches a numeric id.
pub const NUMBER_WILDCARD: &str = "#";

/// Parsed resource locator.
///
/// Query strings and fragments are dropped; empty path segments are ignored,
/// so `content://a/villains/` and `content://a/villains` are the same locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    scheme: String,
    authority: String,
    segments: Vec<String>,
}

impl Locator {
    pub fn parse(value: &str) -> Result<Self, LocatorParseError> {
        let captures = LOCATOR_RE
            .captures(value.trim())
            .ok_or_else(|| LocatorParseError(value.to_string()))?;

        Ok(Self {
            scheme: captures[1].to_ascii_lowercase(),
            authority: captures[2].to_string(),
            segments: split_path(&captures[3]),
        })
    }

    /// Builds a locator from already-validated parts.
    pub fn from_parts(
        scheme: &str,
        authority: &str,
        path: &str,
    ) -> Result<Self, LocatorParseError> {
        Self::parse(&format!("{scheme}://{authority}/{path}"))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns this locator with `id` appended as the last path segment.
    pub fn with_appended_id(&self, id: i64) -> Self {
        let mut segments = self.segments.clone();
        segments.push(id.to_string());
        Self {
            scheme: self.scheme.clone(),
            authority: self.authority.clone(),
            segments,
        }
    }

    /// Parses the last path segment as an id.
    pub fn last_id(&self) -> Option<i64> {
        self.segments.last().and_then(|segment| parse_id(segment))
    }

    /// Whether `self` equals `other` or is one of its path prefixes.
    pub fn is_ancestor_or_self_of(&self, other: &Locator) -> bool {
        self.scheme == other.scheme
            && self.authority == other.authority
            && other.segments.starts_with(&self.segments)
    }

    /// Whether either locator is an ancestor of (or equal to) the other.
    pub fn is_related_to(&self, other: &Locator) -> bool {
        self.is_ancestor_or_self_of(other) || other.is_ancestor_or_self_of(self)
    }
}

impl Display for Locator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)?;
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for Locator {
    type Err = LocatorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorParseError(pub String);

impl Display for LocatorParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed locator: `{}`", self.0)
    }
}

impl Error for LocatorParseError {}

/// Pattern registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriMatcherError {
    InvalidPattern(String),
    OverlappingPattern { existing: String, added: String },
}

impl Display for UriMatcherError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPattern(pattern) => write!(f, "invalid locator pattern: `{pattern}`"),
            Self::OverlappingPattern { existing, added } => write!(
                f,
                "locator pattern `{added}` overlaps registered pattern `{existing}`"
            ),
        }
    }
}

impl Error for UriMatcherError {}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternSegment {
    Literal(String),
    Number,
}

impl PatternSegment {
    fn overlaps(&self, other: &PatternSegment) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Literal(value), Self::Number) | (Self::Number, Self::Literal(value)) => {
                parse_id(value).is_some()
            }
            (Self::Number, Self::Number) => true,
        }
    }

    fn matches(&self, segment: &str) -> Option<Option<i64>> {
        match self {
            Self::Literal(value) => (value == segment).then_some(None),
            Self::Number => parse_id(segment).map(Some),
        }
    }
}

#[derive(Debug, Clone)]
struct Route<C> {
    authority: String,
    pattern: Vec<PatternSegment>,
    display: String,
    code: C,
}

impl<C> Route<C> {
    fn overlaps(&self, other: &Route<C>) -> bool {
        self.authority == other.authority
            && self.pattern.len() == other.pattern.len()
            && self
                .pattern
                .iter()
                .zip(&other.pattern)
                .all(|(a, b)| a.overlaps(b))
    }
}

/// Successful match: the registered code and the ids captured by `#` segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriMatch<C> {
    pub code: C,
    pub ids: Vec<i64>,
}

/// Routes locators to codes by authority and path pattern.
///
/// The scheme is not part of matching.
#[derive(Debug, Clone)]
pub struct UriMatcher<C> {
    routes: Vec<Route<C>>,
}

impl<C> Default for UriMatcher<C> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<C: Copy> UriMatcher<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `authority` + `path` (segments separated by `/`, `#` for a numeric id).
    ///
    /// # Errors
    /// - `InvalidPattern` when the authority is empty or contains `/`.
    /// - `OverlappingPattern` when some locator could match both this and an
    ///   already registered pattern.
    pub fn add_uri(&mut self, authority: &str, path: &str, code: C) -> Result<(), UriMatcherError> {
        let authority = authority.trim();
        if authority.is_empty() || authority.contains(['/', '?', '#']) {
            return Err(UriMatcherError::InvalidPattern(format!("{authority}/{path}")));
        }

        let pattern = split_path(path)
            .into_iter()
            .map(|segment| {
                if segment == NUMBER_WILDCARD {
                    PatternSegment::Number
                } else {
                    PatternSegment::Literal(segment)
                }
            })
            .collect();
        let route = Route {
            authority: authority.to_string(),
            pattern,
            display: format!("{authority}/{}", path.trim_matches('/')),
            code,
        };

        if let Some(existing) = self.routes.iter().find(|existing| existing.overlaps(&route)) {
            return Err(UriMatcherError::OverlappingPattern {
                existing: existing.display.clone(),
                added: route.display,
            });
        }

        self.routes.push(route);
        Ok(())
    }

    /// Returns the single route matching `locator`, if any.
    pub fn match_locator(&self, locator: &Locator) -> Option<UriMatch<C>> {
        self.routes.iter().find_map(|route| {
            if route.authority != locator.authority()
                || route.pattern.len() != locator.segments().len()
            {
                return None;
            }

            let mut ids = Vec::new();
            for (pattern, segment) in route.pattern.iter().zip(locator.segments()) {
                if let Some(id) = pattern.matches(segment)? {
                    ids.push(id);
                }
            }
            Some(UriMatch {
                code: route.code,
                ids,
            })
        })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_id(segment: &str) -> Option<i64> {
    if segment.is_empty() || !segment.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}
