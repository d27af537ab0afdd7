use villain_core::{Locator, UriMatcher, UriMatcherError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Code {
    All,
    Item,
}

fn matcher() -> UriMatcher<Code> {
    let mut matcher = UriMatcher::new();
    matcher.add_uri("auth", "villains", Code::All).unwrap();
    matcher.add_uri("auth", "villains/#", Code::Item).unwrap();
    matcher
}

fn locator(value: &str) -> Locator {
    Locator::parse(value).unwrap()
}

#[test]
fn matches_collection_and_item_patterns() {
    let matcher = matcher();

    let all = matcher.match_locator(&locator("content://auth/villains")).unwrap();
    assert_eq!(all.code, Code::All);
    assert!(all.ids.is_empty());

    let item = matcher.match_locator(&locator("content://auth/villains/7")).unwrap();
    assert_eq!(item.code, Code::Item);
    assert_eq!(item.ids, vec![7]);
}

#[test]
fn unmatched_shapes_return_none() {
    let matcher = matcher();

    for value in [
        "content://auth/other",
        "content://auth",
        "content://other/villains",
        "content://auth/villains/abc",
        "content://auth/villains/-1",
        "content://auth/villains/7/extra",
        "content://auth/villains/99999999999999999999",
    ] {
        assert!(
            matcher.match_locator(&locator(value)).is_none(),
            "{value} should not match"
        );
    }
}

#[test]
fn matching_ignores_scheme_query_and_trailing_slash() {
    let matcher = matcher();

    let item = matcher
        .match_locator(&locator("file://auth/villains/3/?projection=all"))
        .unwrap();
    assert_eq!(item.ids, vec![3]);
    assert!(matcher.match_locator(&locator("content://auth/villains/")).is_some());
}

#[test]
fn overlapping_registration_is_rejected() {
    let mut matcher = matcher();

    let duplicate = matcher.add_uri("auth", "villains", Code::Item).unwrap_err();
    assert!(matches!(duplicate, UriMatcherError::OverlappingPattern { .. }));

    let numeric_literal = matcher.add_uri("auth", "villains/12", Code::All).unwrap_err();
    assert!(matches!(
        numeric_literal,
        UriMatcherError::OverlappingPattern { .. }
    ));
    assert_eq!(matcher.len(), 2);
}

#[test]
fn disjoint_registrations_are_accepted() {
    let mut matcher = matcher();

    matcher.add_uri("auth", "villains/latest", Code::All).unwrap();
    matcher.add_uri("other", "villains", Code::All).unwrap();
    matcher.add_uri("auth", "villains/#/series", Code::Item).unwrap();
    assert_eq!(matcher.len(), 5);

    let latest = matcher
        .match_locator(&locator("content://auth/villains/latest"))
        .unwrap();
    assert_eq!(latest.code, Code::All);
}

#[test]
fn invalid_authority_is_rejected() {
    let mut matcher: UriMatcher<Code> = UriMatcher::new();
    let err = matcher.add_uri("", "villains", Code::All).unwrap_err();
    assert!(matches!(err, UriMatcherError::InvalidPattern(_)));
}

#[test]
fn locator_parse_rejects_malformed_input() {
    for value in ["", "villains/7", "content:/auth/villains", "://auth/villains"] {
        assert!(Locator::parse(value).is_err(), "{value} should be rejected");
    }
}

#[test]
fn locator_ancestry() {
    let collection = locator("content://auth/villains");
    let item = collection.with_appended_id(5);

    assert_eq!(item.to_string(), "content://auth/villains/5");
    assert_eq!(item.last_id(), Some(5));
    assert!(collection.is_ancestor_or_self_of(&item));
    assert!(!item.is_ancestor_or_self_of(&collection));
    assert!(item.is_related_to(&collection));
    assert!(!item.is_related_to(&collection.with_appended_id(6)));
    assert!(!collection.is_related_to(&locator("content://elsewhere/villains")));
}
