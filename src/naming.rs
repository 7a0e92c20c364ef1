//! Resource and attribute naming policy.
//!
//! Everything that turns a resource name into a wire type, a cache key segment or an
//! attribute key goes through [`NameMapper`], so the policy can be swapped per
//! deployment and tested on its own.

use convert_case::{Case, Casing};

pub trait NameMapper: Send + Sync {
    /// `widget` -> `widgets`, `blog-post` -> `blog-posts`
    fn plural(&self, word: &str) -> String;

    /// `widgets` -> `widget`
    fn singular(&self, word: &str) -> String;

    /// `created_at` / `createdAt` -> `created-at`
    fn dasherize(&self, word: &str) -> String;

    /// `created-at` / `createdAt` -> `created_at`
    fn underscore(&self, word: &str) -> String;

    /// `blog-posts` -> `blog post`, used in client-facing messages
    fn humanize(&self, word: &str) -> String {
        self.underscore(&self.singular(word)).replace('_', " ").to_lowercase()
    }

    /// Wire type for a resource name: plural, dasherized
    fn resource_type(&self, name: &str) -> String {
        self.plural(&self.dasherize(name))
    }
}

/// Default English naming: convert_case for casing, a small rule table for number.
#[derive(Debug, Clone, Copy, Default)]
pub struct InflectorNames;

const UNCOUNTABLE: &[&str] = &[
    "equipment", "information", "rice", "money", "species", "series", "fish", "sheep",
    "news", "data", "metadata", "feedback", "media",
];

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("man", "men"),
    ("woman", "women"),
    ("child", "children"),
    ("tooth", "teeth"),
    ("foot", "feet"),
    ("mouse", "mice"),
    ("goose", "geese"),
];

impl InflectorNames {
    /// Split `blog-post` into (`blog-`, `post`) so only the last word is inflected
    fn split_last(word: &str) -> (&str, &str) {
        match word.rfind(['-', '_', ' ']) {
            Some(idx) => word.split_at(idx + 1),
            None => ("", word),
        }
    }

    fn pluralize_word(word: &str) -> String {
        let lower = word.to_lowercase();
        if UNCOUNTABLE.contains(&lower.as_str()) {
            return word.to_string();
        }
        if let Some((_, plural)) = IRREGULAR.iter().find(|(single, _)| *single == lower) {
            return plural.to_string();
        }
        if IRREGULAR.iter().any(|(_, plural)| *plural == lower) {
            return word.to_string();
        }

        if lower.ends_with("ss")
            || lower.ends_with("us")
            || lower.ends_with("sh")
            || lower.ends_with("ch")
            || lower.ends_with('x')
            || lower.ends_with('z')
        {
            return format!("{}es", word);
        }
        if let Some(stem) = word.strip_suffix('y') {
            if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) && !stem.is_empty() {
                return format!("{}ies", stem);
            }
        }
        if lower.ends_with('s') {
            // already plural
            return word.to_string();
        }
        format!("{}s", word)
    }

    fn singularize_word(word: &str) -> String {
        let lower = word.to_lowercase();
        if UNCOUNTABLE.contains(&lower.as_str()) {
            return word.to_string();
        }
        if let Some((single, _)) = IRREGULAR.iter().find(|(_, plural)| *plural == lower) {
            return single.to_string();
        }
        if IRREGULAR.iter().any(|(single, _)| *single == lower) {
            return word.to_string();
        }

        if let Some(stem) = word.strip_suffix("ies") {
            return format!("{}y", stem);
        }
        // bus/buses, status/statuses; house/houses and cause/causes keep their `e`
        if lower.ends_with("uses") && !lower.ends_with("ouses") && !lower.ends_with("auses") && lower.len() > 4 {
            return word[..word.len() - 2].to_string();
        }
        for suffix in ["sses", "shes", "ches", "xes", "zes"] {
            if lower.ends_with(suffix) {
                return word[..word.len() - 2].to_string();
            }
        }
        if lower.ends_with("ss") || lower.ends_with("us") || lower.ends_with("is") {
            return word.to_string();
        }
        match word.strip_suffix('s') {
            Some(stem) if !stem.is_empty() => stem.to_string(),
            _ => word.to_string(),
        }
    }
}

impl NameMapper for InflectorNames {
    fn plural(&self, word: &str) -> String {
        let (head, last) = Self::split_last(word);
        format!("{}{}", head, Self::pluralize_word(last))
    }

    fn singular(&self, word: &str) -> String {
        let (head, last) = Self::split_last(word);
        format!("{}{}", head, Self::singularize_word(last))
    }

    fn dasherize(&self, word: &str) -> String {
        word.to_case(Case::Kebab)
    }

    fn underscore(&self, word: &str) -> String {
        word.to_case(Case::Snake)
    }
}
