use std::collections::BTreeMap;

use crate::categories::CategoryTable;

/// Category name → links in input order (duplicates kept).
pub type Buckets = BTreeMap<String, Vec<String>>;

/// Lowercased scheme of `link`, or `None` when the item is not link-shaped.
pub fn protocol_of(link: &str) -> Option<String> {
    link.split_once("://")
        .map(|(scheme, _)| scheme.to_lowercase())
}

/// Group links by category.
///
/// Items without `://` are skipped. Empty input yields an empty map.
pub fn classify<I, S>(links: I, table: &CategoryTable) -> Buckets
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut buckets = Buckets::new();
    for link in links {
        let link = link.as_ref();
        let Some(protocol) = protocol_of(link) else {
            tracing::debug!(item = %preview(link), "skipping malformed link");
            continue;
        };
        buckets
            .entry(table.category_for(&protocol).to_string())
            .or_default()
            .push(link.to_string());
    }
    buckets
}

/// [`classify`] over untyped JSON input; non-string items are skipped.
pub fn classify_values(values: &[serde_json::Value], table: &CategoryTable) -> Buckets {
    let links = values.iter().filter_map(|v| match v.as_str() {
        Some(s) => Some(s),
        None => {
            tracing::debug!(item = %preview(&v.to_string()), "skipping non-string link");
            None
        }
    });
    classify(links, table)
}

fn preview(s: &str) -> String {
    s.chars().take(100).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn buckets_example_batch() {
        let table = CategoryTable::default();
        let buckets = classify(["vmess://abc", "ss://def", "ss://def", "foo://bar"], &table);

        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets["vmess"], strings(&["vmess://abc"]));
        assert_eq!(buckets["shadowsocks"], strings(&["ss://def", "ss://def"]));
        assert_eq!(buckets["clashMetaCore"], strings(&["foo://bar"]));
    }

    #[test]
    fn empty_input_gives_no_buckets() {
        let table = CategoryTable::default();
        assert!(classify(Vec::<String>::new(), &table).is_empty());
        assert!(classify(["no scheme here", ""], &table).is_empty());
    }

    #[test]
    fn protocol_is_case_insensitive_and_link_is_untouched() {
        let table = CategoryTable::default();
        let buckets = classify(["VMess://ABC", "Hy2://x"], &table);
        assert_eq!(buckets["vmess"], strings(&["VMess://ABC"]));
        assert_eq!(buckets["hysteria2"], strings(&["Hy2://x"]));
    }

    #[test]
    fn empty_scheme_goes_to_fallback() {
        let table = CategoryTable::default();
        let buckets = classify(["://nothing"], &table);
        assert_eq!(buckets["clashMetaCore"], strings(&["://nothing"]));
    }

    #[test]
    fn classification_is_idempotent() {
        let table = CategoryTable::default();
        let input = ["trojan://a", "vless://b", "trojan://a", "x://c", "tuic://d"];
        assert_eq!(classify(input, &table), classify(input, &table));
        assert_eq!(
            classify(input, &table)["trojan"],
            strings(&["trojan://a", "trojan://a"])
        );
    }

    #[test]
    fn partition_counts_every_valid_link_once() {
        let table = CategoryTable::default();
        let input = [
            "vmess://1", "bad", "ss://2", "ssr://3", "ss://2", "hysteria://4", "zz://5", "",
        ];
        let buckets = classify(input, &table);
        let total: usize = buckets.values().map(Vec::len).sum();
        let valid = input.iter().filter(|s| s.contains("://")).count();
        assert_eq!(total, valid);

        for link in input.iter().filter(|s| s.contains("://")) {
            let holders = buckets.values().filter(|v| v.iter().any(|l| l == link)).count();
            assert_eq!(holders, 1, "{link} should be in exactly one bucket");
        }
    }

    #[test]
    fn untyped_values_skip_non_strings() {
        let table = CategoryTable::default();
        let values = vec![
            json!("vless://a"),
            json!(42),
            json!(null),
            json!({"link": "vmess://b"}),
            json!("trojan://c"),
        ];
        let buckets = classify_values(&values, &table);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets["vless"], strings(&["vless://a"]));
        assert_eq!(buckets["trojan"], strings(&["trojan://c"]));
    }

    #[test]
    fn configured_labels_are_used() {
        let table = CategoryTable::with_overrides(Some("vmess=v2rayNG"), None).unwrap();
        let buckets = classify(["vmess://a"], &table);
        assert_eq!(buckets["v2rayNG"], strings(&["vmess://a"]));
    }
}
