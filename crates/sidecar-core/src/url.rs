//! URL helpers used for matching and redirects
//!
//! All helpers fall back to the raw input when it does not parse.

use url::Url;

/// Query parameter used to evaluate the page as another user
pub const OVERRIDE_USER_PARAM: &str = "overrideuser";

/// Strip every `overrideuser` parameter from `raw`
///
/// Other parameters keep their order. The `?` is dropped when nothing
/// remains. Input without the parameter, or that fails to parse, is returned
/// unchanged.
#[must_use]
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    if !url.query_pairs().any(|(k, _)| k == OVERRIDE_USER_PARAM) {
        return raw.to_string();
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != OVERRIDE_USER_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url.to_string()
}

/// Path component of `raw`, or `raw` itself when it does not parse
#[must_use]
pub fn url_path(raw: &str) -> String {
    Url::parse(raw).map_or_else(|_| raw.to_string(), |u| u.path().to_string())
}

/// Carry query parameters of `current` over to `destination`
///
/// Parameters already on the destination win. Parameters only present on
/// `current` are appended in their original order.
#[must_use]
pub fn merge_query_params(destination: &Url, current: &Url) -> Url {
    let carried: Vec<(String, String)> = current
        .query_pairs()
        .filter(|(k, _)| !destination.query_pairs().any(|(dk, _)| dk == *k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if carried.is_empty() {
        return destination.clone();
    }

    let mut merged = destination.clone();
    merged.query_pairs_mut().extend_pairs(carried);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_override_user() {
        assert_eq!(
            normalize_url("https://shop.example/p?a=1&overrideuser=bob&b=2"),
            "https://shop.example/p?a=1&b=2"
        );
    }

    #[test]
    fn drops_question_mark_when_empty() {
        assert_eq!(
            normalize_url("https://shop.example/p?overrideuser=bob&overrideuser=eve"),
            "https://shop.example/p"
        );
    }

    #[test]
    fn untouched_without_parameter() {
        let raw = "https://shop.example/p?q=a%20b#top";
        assert_eq!(normalize_url(raw), raw);
    }

    #[test]
    fn unparsable_input_is_returned() {
        assert_eq!(normalize_url("not a url"), "not a url");
        assert_eq!(url_path("not a url"), "not a url");
    }

    #[test]
    fn path_of_url() {
        assert_eq!(url_path("https://shop.example/cart?x=1"), "/cart");
        assert_eq!(url_path("https://shop.example"), "/");
    }

    #[test]
    fn merge_keeps_destination_values() {
        let dest = Url::parse("https://shop.example/b?x=dest").unwrap();
        let cur = Url::parse("https://shop.example/a?utm=1&x=cur&ref=home").unwrap();
        assert_eq!(
            merge_query_params(&dest, &cur).as_str(),
            "https://shop.example/b?x=dest&utm=1&ref=home"
        );
    }

    #[test]
    fn merge_without_current_params_is_identity() {
        let dest = Url::parse("https://shop.example/b").unwrap();
        let cur = Url::parse("https://shop.example/a").unwrap();
        assert_eq!(merge_query_params(&dest, &cur), dest);
    }

    proptest! {
        #[test]
        fn normalized_url_never_mentions_override(
            keys in proptest::collection::vec("[a-z]{1,6}", 0..5),
            who in "[a-z]{1,8}",
        ) {
            let mut raw = String::from("https://shop.example/page?");
            for (i, key) in keys.iter().enumerate() {
                raw.push_str(&format!("{key}={i}&"));
            }
            raw.push_str(&format!("overrideuser={who}"));

            let normalized = normalize_url(&raw);
            prop_assert!(!normalized.contains("overrideuser="));
            for (i, key) in keys.iter().enumerate() {
                let needle = format!("{key}={i}");
                prop_assert!(normalized.contains(&needle));
            }
        }

        #[test]
        fn normalize_is_idempotent(path in "[a-z]{0,8}", q in "[a-z]{1,5}") {
            let raw = format!("https://shop.example/{path}?{q}=1&overrideuser=x");
            let once = normalize_url(&raw);
            prop_assert_eq!(normalize_url(&once), once.clone());
        }
    }
}
