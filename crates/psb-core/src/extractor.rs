//! Link extraction from free-form post text.
//!
//! A candidate is a scheme, `://`, and a maximal run of characters that are not
//! whitespace, quotes or angle brackets. Sentence punctuation glued to the end of
//! a candidate is stripped afterwards.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[a-zA-Z][a-zA-Z0-9+.\-]*://[^\s"'<>]+"#).expect("valid link regex")
});

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}', '>'];

/// Extract the unique links embedded in `text`, sorted.
///
/// Never fails: text without links yields an empty vector.
pub fn extract_links(text: &str) -> Vec<String> {
    let mut out = BTreeSet::new();
    collect_links(text, &mut out);
    out.into_iter().collect()
}

/// Union of [`extract_links`] over several posts, sorted and unique.
pub fn extract_links_from_posts<S: AsRef<str>>(posts: &[S]) -> Vec<String> {
    let mut out = BTreeSet::new();
    for post in posts {
        collect_links(post.as_ref(), &mut out);
    }
    out.into_iter().collect()
}

fn collect_links(text: &str, out: &mut BTreeSet<String>) {
    for m in LINK_RE.find_iter(text) {
        let cleaned = strip_trailing_punctuation(m.as_str());
        if !has_body(cleaned) {
            tracing::debug!(candidate = m.as_str(), "dropping link without body");
            continue;
        }
        out.insert(cleaned.to_string());
    }
}

/// Strip sentence punctuation from the end of a candidate link.
///
/// A trailing `)` is only removed while the part after `://` has more `)` than `(`.
pub fn strip_trailing_punctuation(candidate: &str) -> &str {
    let mut s = candidate;
    while let Some(last) = s.chars().next_back() {
        if !TRAILING_PUNCTUATION.contains(&last) {
            break;
        }
        if last == ')' && !has_unbalanced_close(s) {
            break;
        }
        s = &s[..s.len() - last.len_utf8()];
    }
    s
}

fn has_unbalanced_close(s: &str) -> bool {
    let body = s.split_once("://").map(|(_, rest)| rest).unwrap_or(s);
    let open = body.matches('(').count();
    let close = body.matches(')').count();
    close > open
}

fn has_body(link: &str) -> bool {
    match link.split_once("://") {
        Some((scheme, body)) => !scheme.is_empty() && !body.is_empty(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_sentence_punctuation_and_keeps_balanced_parens() {
        let text = "Check this out: http://example.com. Also (http://foo.com/a(b)c).";
        assert_eq!(
            extract_links(text),
            vec![
                "http://example.com".to_string(),
                "http://foo.com/a(b)c".to_string()
            ]
        );
    }

    #[test]
    fn empty_and_linkless_text_yield_nothing() {
        assert!(extract_links("").is_empty());
        assert!(extract_links("no links here, just words: a:b //c").is_empty());
    }

    #[test]
    fn duplicates_are_returned_once() {
        let text = "vmess://abc\nagain vmess://abc, and vmess://abc.";
        assert_eq!(extract_links(text), vec!["vmess://abc".to_string()]);
    }

    #[test]
    fn stops_at_quotes_whitespace_and_angle_brackets() {
        let text = r#"<a href="trojan://pw@host:443?sni=x#tag">x</a> 'ss://aaa' <vless://id@h:1>"#;
        assert_eq!(
            extract_links(text),
            vec![
                "ss://aaa".to_string(),
                "trojan://pw@host:443?sni=x#tag".to_string(),
                "vless://id@h:1".to_string(),
            ]
        );
    }

    #[test]
    fn strips_stacked_trailing_punctuation() {
        assert_eq!(strip_trailing_punctuation("hy2://h:1?x=y]};!?"), "hy2://h:1?x=y");
        assert_eq!(strip_trailing_punctuation("tuic://h:1)))"), "tuic://h:1");
    }

    #[test]
    fn keeps_close_paren_when_balanced() {
        assert_eq!(
            strip_trailing_punctuation("https://en.wikipedia.org/wiki/Rust_(language)"),
            "https://en.wikipedia.org/wiki/Rust_(language)"
        );
        assert_eq!(
            strip_trailing_punctuation("https://x.org/a_(b))."),
            "https://x.org/a_(b)"
        );
    }

    #[test]
    fn drops_links_whose_body_is_all_punctuation() {
        assert!(extract_links("see vmess://... and ss://).").is_empty());
    }

    #[test]
    fn scheme_may_contain_plus_dot_and_dash() {
        assert_eq!(
            extract_links("use svn+ssh://repo/x and a.b-c://d"),
            vec!["a.b-c://d".to_string(), "svn+ssh://repo/x".to_string()]
        );
    }

    #[test]
    fn unicode_text_around_links_is_handled() {
        let text = "Новые ключи: vless://uuid@сервер:443?type=ws。 ещё";
        assert_eq!(
            extract_links(text),
            vec!["vless://uuid@сервер:443?type=ws。".to_string()]
        );
    }

    #[test]
    fn posts_are_merged_sorted_and_unique() {
        let posts = vec![
            "first vmess://b".to_string(),
            "second ss://a and vmess://b".to_string(),
        ];
        assert_eq!(
            extract_links_from_posts(&posts),
            vec!["ss://a".to_string(), "vmess://b".to_string()]
        );
    }

    #[test]
    fn every_result_keeps_the_link_shape() {
        let text = "x://y. (z://w)) q://(r)) s://t,;:!?)]}> end";
        let shape = Regex::new(r#"^[a-zA-Z][a-zA-Z0-9+.\-]*://[^\s"'<>]+$"#).unwrap();
        for link in extract_links(text) {
            assert!(shape.is_match(&link), "bad shape: {link}");
            let last = link.chars().last().unwrap();
            if TRAILING_PUNCTUATION.contains(&last) {
                assert_eq!(last, ')');
                assert!(!has_unbalanced_close(&link), "unbalanced: {link}");
            }
        }
    }
}
