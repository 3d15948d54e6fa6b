//! # Localized Status Messages
//!
//! A static message catalog keyed by language tag and status name,
//! resolved from an `Accept-Language` header.
//!
//! Resolution order: each accepted language by descending quality (exact
//! tag, then primary subtag), then the configured default language, then
//! English, then the bare key.

use std::collections::HashMap;

use lsd_state::{Localize, StatusKind};

const EN: &[(&str, &str)] = &[
    ("ready", "The license is ready to be used."),
    ("active", "The license is active."),
    ("revoked", "The license has been revoked."),
    ("returned", "The license has been returned."),
    ("cancelled", "The license has been cancelled."),
    ("expired", "The license has expired."),
];

const FR: &[(&str, &str)] = &[
    ("ready", "La licence est prête à être utilisée."),
    ("active", "La licence est active."),
    ("revoked", "La licence a été révoquée."),
    ("returned", "La licence a été restituée."),
    ("cancelled", "La licence a été annulée."),
    ("expired", "La licence a expiré."),
];

const DE: &[(&str, &str)] = &[
    ("ready", "Die Lizenz ist einsatzbereit."),
    ("active", "Die Lizenz ist aktiv."),
    ("revoked", "Die Lizenz wurde widerrufen."),
    ("returned", "Die Lizenz wurde zurückgegeben."),
    ("cancelled", "Die Lizenz wurde storniert."),
    ("expired", "Die Lizenz ist abgelaufen."),
];

/// In-memory message catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    messages: HashMap<String, HashMap<String, String>>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Catalog {
    /// An empty catalog; every lookup falls back to the key.
    pub fn empty() -> Self {
        Self {
            messages: HashMap::new(),
        }
    }

    /// English, French, and German status messages.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for (lang, table) in [("en", EN), ("fr", FR), ("de", DE)] {
            for (key, message) in table {
                catalog.insert(lang, key, message);
            }
        }
        catalog
    }

    /// Add or replace one message.
    pub fn insert(&mut self, language: &str, key: &str, message: &str) {
        self.messages
            .entry(language.to_ascii_lowercase())
            .or_default()
            .insert(key.to_string(), message.to_string());
    }

    /// Whether every status has a message in `language`.
    pub fn covers(&self, language: &str) -> bool {
        self.messages
            .get(&language.to_ascii_lowercase())
            .is_some_and(|m| StatusKind::ALL.iter().all(|s| m.contains_key(s.as_str())))
    }

    fn lookup(&self, language: &str, key: &str) -> Option<&str> {
        let language = language.to_ascii_lowercase();
        self.messages
            .get(&language)
            .or_else(|| {
                language
                    .split('-')
                    .next()
                    .and_then(|primary| self.messages.get(primary))
            })
            .and_then(|m| m.get(key))
            .map(String::as_str)
    }
}

impl Localize for Catalog {
    fn resolve(&self, default_language: &str, accept_language: Option<&str>, key: &str) -> String {
        accept_language
            .map(parse_accept_language)
            .unwrap_or_default()
            .iter()
            .map(String::as_str)
            .chain([default_language, "en"])
            .find_map(|lang| self.lookup(lang, key))
            .unwrap_or(key)
            .to_string()
    }
}

/// Language tags of an `Accept-Language` header, best first.
///
/// Entries with `q=0`, wildcards, and malformed quality values are dropped.
/// Equal qualities keep header order.
pub fn parse_accept_language(header: &str) -> Vec<String> {
    let mut ranked: Vec<(f32, String)> = header
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let tag = parts.next()?.trim();
            if tag.is_empty() || tag == "*" {
                return None;
            }
            let mut quality = 1.0_f32;
            for param in parts {
                if let Some(q) = param.trim().strip_prefix("q=") {
                    quality = q.trim().parse().ok()?;
                }
            }
            (quality > 0.0).then(|| (quality, tag.to_string()))
        })
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
    ranked.into_iter().map(|(_, tag)| tag).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_covers_every_status() {
        let catalog = Catalog::builtin();
        for lang in ["en", "fr", "de"] {
            assert!(catalog.covers(lang), "{lang}");
        }
    }

    #[test]
    fn accept_language_is_ranked_by_quality() {
        assert_eq!(
            parse_accept_language("fr;q=0.5, de-CH, en;q=0.8, *;q=0.1"),
            vec!["de-CH", "en", "fr"]
        );
        assert!(parse_accept_language("fr;q=0").is_empty());
        assert!(parse_accept_language("fr;q=abc").is_empty());
    }

    #[test]
    fn resolves_primary_subtag() {
        let catalog = Catalog::builtin();
        assert_eq!(
            catalog.resolve("en", Some("fr-CA,fr;q=0.9"), "revoked"),
            "La licence a été révoquée."
        );
    }

    #[test]
    fn unknown_language_falls_back_to_default_then_english() {
        let catalog = Catalog::builtin();
        assert_eq!(
            catalog.resolve("de", Some("ja"), "active"),
            "Die Lizenz ist aktiv."
        );
        assert_eq!(
            catalog.resolve("xx", None, "active"),
            "The license is active."
        );
    }

    #[test]
    fn unknown_key_renders_as_itself() {
        assert_eq!(Catalog::empty().resolve("en", Some("fr"), "ready"), "ready");
    }
}
