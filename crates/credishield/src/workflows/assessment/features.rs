//! Mapping between explanation feature identifiers and form fields.
//!
//! Explanation payloads may carry a transformer namespace (`num__duration`,
//! `cat__purpose`). Everything that compares or labels features goes through
//! [`normalize_feature`] first.

use std::borrow::Cow;

use super::domain::FormField;

const NAMESPACE_SEPARATOR: &str = "__";

/// Strip a leading `namespace__` prefix, if any.
pub fn normalize_feature(raw: &str) -> &str {
    let trimmed = raw.trim();
    match trimmed.split_once(NAMESPACE_SEPARATOR) {
        Some((namespace, rest)) if !namespace.is_empty() && !rest.is_empty() => rest,
        _ => trimmed,
    }
}

/// Resolve an explanation identifier to the form field it describes.
pub fn canonical_field(raw: &str) -> Option<FormField> {
    FormField::from_key(normalize_feature(raw))
}

/// Human-readable label; unmapped identifiers are de-prefixed and title-cased.
pub fn feature_label(raw: &str) -> Cow<'static, str> {
    if let Some(field) = canonical_field(raw) {
        return Cow::Borrowed(field.display_label());
    }

    let spaced = normalize_feature(raw).replace('_', " ");
    let spaced = spaced.trim();
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => Cow::Owned(first.to_uppercase().chain(chars).collect()),
        None => Cow::Owned(String::new()),
    }
}
