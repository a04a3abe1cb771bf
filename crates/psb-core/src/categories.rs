//! Protocol → category table.
//!
//! Built once at startup (defaults, optionally overridden from config) and shared
//! read-only afterwards.

use std::collections::BTreeMap;

use crate::{errors::Error, Result};

/// File stem of the aggregate artifact.
pub const AGGREGATE_NAME: &str = "all_proxies";

pub const DEFAULT_FALLBACK: &str = "clashMetaCore";

const DEFAULT_MAP: &[(&str, &str)] = &[
    ("vmess", "vmess"),
    ("vless", "vless"),
    ("trojan", "trojan"),
    ("ss", "shadowsocks"),
    ("ssr", "shadowsocksr"),
    ("tuic", "tuic"),
    ("hy2", "hysteria2"),
    ("hysteria", "hysteria"),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryTable {
    by_protocol: BTreeMap<String, String>,
    fallback: String,
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self {
            by_protocol: DEFAULT_MAP
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
            fallback: DEFAULT_FALLBACK.to_string(),
        }
    }
}

impl CategoryTable {
    pub fn new<I, P, C>(entries: I, fallback: &str) -> Result<Self>
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: AsRef<str>,
    {
        validate_category(fallback)?;
        let mut by_protocol = BTreeMap::new();
        for (protocol, category) in entries {
            let protocol = protocol.as_ref().trim().to_lowercase();
            let category = category.as_ref().trim();
            if protocol.is_empty() {
                return Err(Error::Config("category map has an empty protocol".into()));
            }
            validate_category(category)?;
            by_protocol.insert(protocol, category.to_string());
        }
        Ok(Self {
            by_protocol,
            fallback: fallback.to_string(),
        })
    }

    /// Defaults with overrides applied.
    ///
    /// `overrides` has the form `vmess=v2rayNG,vless=hiddify`. Protocols not named
    /// keep their default category.
    pub fn with_overrides(overrides: Option<&str>, fallback: Option<&str>) -> Result<Self> {
        let mut entries = Self::default().by_protocol;
        for pair in overrides.unwrap_or_default().split(',') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let Some((p, c)) = pair.split_once('=') else {
                return Err(Error::Config(format!(
                    "invalid category mapping `{pair}` (expected protocol=category)"
                )));
            };
            entries.insert(p.trim().to_lowercase(), c.trim().to_string());
        }
        Self::new(entries, fallback.unwrap_or(DEFAULT_FALLBACK).trim())
    }

    pub fn category_for(&self, protocol: &str) -> &str {
        self.by_protocol
            .get(protocol)
            .map(String::as_str)
            .unwrap_or(self.fallback.as_str())
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// True for categories that feed the aggregate artifact.
    pub fn is_mapped(&self, category: &str) -> bool {
        category != self.fallback
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_protocol
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_str()))
    }
}

/// Category names become file stems, so keep them to a portable alphabet.
fn validate_category(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Config("category name is empty".into()));
    }
    if name == AGGREGATE_NAME {
        return Err(Error::Config(format!(
            "category name `{AGGREGATE_NAME}` is reserved for the aggregate file"
        )));
    }
    if name.starts_with('.')
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(Error::Config(format!("invalid category name `{name}`")));
    }
    Ok(())
}
