//! Canonical forms for JSON documents.
//!
//! Remote services rarely echo a JSON document back byte-for-byte: keys come
//! back in a different order, whitespace changes, and set-like arrays are
//! reordered. Comparing raw strings would report drift on every refresh, so
//! document attributes are compared through their [`NormalizedDocument`].
//!
//! Normalization is idempotent. Object key order and insignificant whitespace
//! never matter. Arrays keep their order unless their key is registered as
//! set-valued in [`NormalizeOptions`].

use std::collections::BTreeSet;
use std::fmt;

use serde_json::{Map, Value};

use crate::error::ProviderError;

/// Canonical form of the empty or absent document.
pub const EMPTY_DOCUMENT: &str = "{}";

/// A canonical JSON string, used only for comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedDocument(String);

impl NormalizedDocument {
    /// The canonical text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the canonical text.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-document-kind normalization rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    set_keys: BTreeSet<String>,
    collapse_singletons: bool,
}

impl NormalizeOptions {
    /// Options with no set-valued keys: only key order and whitespace are
    /// canonicalized.
    pub fn new() -> Self {
        Self::default()
    }

    /// IAM-style policy documents.
    ///
    /// `Action`, `NotAction`, `Resource` and `NotResource` are sets, and a
    /// one-element set is the same as its scalar. `Statement` stays ordered.
    pub fn iam_policy() -> Self {
        Self::new()
            .with_set_key("Action")
            .with_set_key("NotAction")
            .with_set_key("Resource")
            .with_set_key("NotResource")
            .with_collapse_singletons()
    }

    /// Treat arrays stored under `key` as unordered sets.
    pub fn with_set_key(mut self, key: impl Into<String>) -> Self {
        self.set_keys.insert(key.into());
        self
    }

    /// Collapse one-element sets to their only element.
    pub fn with_collapse_singletons(mut self) -> Self {
        self.collapse_singletons = true;
        self
    }

    fn is_set_key(&self, key: Option<&str>) -> bool {
        key.is_some_and(|k| self.set_keys.contains(k))
    }
}

/// Which string to store in state when local and remote documents agree.
///
/// This encodes a per-API quirk, so it is configured per document attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExposurePolicy {
    /// Store the remote document, re-normalized.
    #[default]
    PreferRemote,
    /// The server silently drops empty objects. When the only difference is
    /// empty objects present locally, keep the local document.
    RemoteDropsEmptyObjects,
}

/// Normalize with default options.
pub fn normalize(raw: &str) -> Result<NormalizedDocument, ProviderError> {
    normalize_with(raw, &NormalizeOptions::default())
}

/// Normalize `raw` into its canonical form.
///
/// Empty or whitespace-only input yields [`EMPTY_DOCUMENT`].
pub fn normalize_with(
    raw: &str,
    options: &NormalizeOptions,
) -> Result<NormalizedDocument, ProviderError> {
    if raw.trim().is_empty() {
        return Ok(NormalizedDocument(EMPTY_DOCUMENT.to_string()));
    }

    let value: Value = serde_json::from_str(raw)
        .map_err(|e| ProviderError::Parse(format!("invalid JSON document: {}", e)))?;

    Ok(canonical_document(value, options))
}

/// Whether two documents are equivalent under default options.
pub fn are_equivalent(a: &str, b: &str) -> bool {
    are_equivalent_with(a, b, &NormalizeOptions::default())
}

/// Whether two documents are equivalent.
///
/// If either side fails to parse, falls back to exact string equality.
pub fn are_equivalent_with(a: &str, b: &str, options: &NormalizeOptions) -> bool {
    match (normalize_with(a, options), normalize_with(b, options)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Pick the document string to store in state after a read.
///
/// When the documents are equivalent the remote form wins, re-normalized, so
/// that state mirrors what the server persisted. Under
/// [`ExposurePolicy::RemoteDropsEmptyObjects`] the local string is kept when
/// it differs from the remote only by empty objects. When the documents are
/// not equivalent the remote form is returned: that is real drift.
pub fn choose_canonical_for_exposure(
    local: &str,
    remote: &str,
    options: &NormalizeOptions,
    policy: ExposurePolicy,
) -> String {
    let remote_norm = match normalize_with(remote, options) {
        Ok(doc) => doc,
        Err(_) => return remote.to_string(),
    };
    let local_value = match serde_json::from_str::<Value>(local) {
        Ok(value) => value,
        Err(_) => return remote_norm.into_string(),
    };

    let local_norm = canonical_document(local_value.clone(), options);
    if local_norm == remote_norm {
        return remote_norm.into_string();
    }

    if policy == ExposurePolicy::RemoteDropsEmptyObjects
        && canonical_document(strip_empty_objects(local_value), options) == remote_norm
    {
        return local.to_string();
    }

    remote_norm.into_string()
}

fn canonical_document(value: Value, options: &NormalizeOptions) -> NormalizedDocument {
    NormalizedDocument(canonicalize(value, options, None).to_string())
}

fn canonicalize(value: Value, options: &NormalizeOptions, key: Option<&str>) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            let mut out = Map::new();
            for (k, v) in entries {
                let v = canonicalize(v, options, Some(&k));
                out.insert(k, v);
            }
            Value::Object(out)
        },
        Value::Array(items) => {
            let items: Vec<Value> = items
                .into_iter()
                .map(|item| canonicalize(item, options, None))
                .collect();

            if !options.is_set_key(key) {
                return Value::Array(items);
            }

            let mut keyed: Vec<(String, Value)> =
                items.into_iter().map(|v| (v.to_string(), v)).collect();
            keyed.sort_by(|a, b| a.0.cmp(&b.0));
            keyed.dedup_by(|a, b| a.0 == b.0);

            let mut items: Vec<Value> = keyed.into_iter().map(|(_, v)| v).collect();
            if options.collapse_singletons && items.len() == 1 && !items[0].is_array() {
                return items.remove(0);
            }
            Value::Array(items)
        },
        other => other,
    }
}

/// Remove empty objects at any depth.
pub fn strip_empty_objects(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, strip_empty_objects(v)))
                .filter(|(_, v)| !matches!(v, Value::Object(m) if m.is_empty()))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_empty_objects).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_key_order_and_whitespace_ignored() {
        assert!(are_equivalent(r#"{"A":1,"B":2}"#, "{ \"B\": 2,\n  \"A\": 1 }"));
        assert_eq!(
            normalize(r#"{"b":{"d":1,"c":2},"a":[]}"#).unwrap().as_str(),
            r#"{"a":[],"b":{"c":2,"d":1}}"#
        );
    }

    #[test]
    fn test_ordered_arrays_keep_order() {
        let a = r#"{"Statement":[{"Sid":"one"},{"Sid":"two"}]}"#;
        let b = r#"{"Statement":[{"Sid":"two"},{"Sid":"one"}]}"#;
        assert!(!are_equivalent_with(a, b, &NormalizeOptions::iam_policy()));
    }

    #[test]
    fn test_set_keys_ignore_order_and_duplicates() {
        let options = NormalizeOptions::iam_policy();
        let a = r#"{"Statement":[{"Action":["logs:PutLogEvents","logs:CreateLogStream"]}]}"#;
        let b = r#"{"Statement":[{"Action":["logs:CreateLogStream","logs:PutLogEvents","logs:PutLogEvents"]}]}"#;
        assert!(are_equivalent_with(a, b, &options));
        assert!(!are_equivalent(a, b));
    }

    #[test]
    fn test_singleton_sets_collapse() {
        let options = NormalizeOptions::iam_policy();
        assert!(are_equivalent_with(
            r#"{"Resource":["*"]}"#,
            r#"{"Resource":"*"}"#,
            &options
        ));
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(normalize("").unwrap().as_str(), EMPTY_DOCUMENT);
        assert_eq!(normalize("  \n").unwrap().as_str(), EMPTY_DOCUMENT);
        assert!(are_equivalent("", "{}"));
    }

    #[test]
    fn test_parse_error_falls_back_to_string_equality() {
        assert!(matches!(normalize("{oops"), Err(ProviderError::Parse(_))));
        assert!(are_equivalent("{oops", "{oops"));
        assert!(!are_equivalent("{oops", "{}"));
    }

    #[test]
    fn test_exposure_prefers_remote_when_equivalent() {
        let chosen = choose_canonical_for_exposure(
            r#"{"A":1,"B":2}"#,
            r#"{ "B": 2, "A": 1 }"#,
            &NormalizeOptions::new(),
            ExposurePolicy::PreferRemote,
        );
        assert_eq!(chosen, r#"{"A":1,"B":2}"#);
    }

    #[test]
    fn test_exposure_keeps_local_when_remote_drops_empty_objects() {
        let local = r#"{"Statement":[{"Effect":"Allow","Condition":{}}]}"#;
        let remote = r#"{"Statement":[{"Effect":"Allow"}]}"#;

        let chosen = choose_canonical_for_exposure(
            local,
            remote,
            &NormalizeOptions::iam_policy(),
            ExposurePolicy::RemoteDropsEmptyObjects,
        );
        assert_eq!(chosen, local);

        let chosen = choose_canonical_for_exposure(
            local,
            remote,
            &NormalizeOptions::iam_policy(),
            ExposurePolicy::PreferRemote,
        );
        assert_eq!(chosen, r#"{"Statement":[{"Effect":"Allow"}]}"#);
    }

    #[test]
    fn test_exposure_returns_remote_on_drift() {
        let chosen = choose_canonical_for_exposure(
            r#"{"A":1}"#,
            r#"{"A":2}"#,
            &NormalizeOptions::new(),
            ExposurePolicy::RemoteDropsEmptyObjects,
        );
        assert_eq!(chosen, r#"{"A":2}"#);
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z*:]{0,8}".prop_map(Value::from),
        ];
        leaf.prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..5).prop_map(Value::Array),
                prop::collection::btree_map(
                    prop_oneof![
                        Just("Action".to_string()),
                        Just("Resource".to_string()),
                        "[A-Za-z]{1,6}"
                    ],
                    inner,
                    0..5
                )
                .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(doc in arb_json()) {
            for options in [NormalizeOptions::new(), NormalizeOptions::iam_policy()] {
                let once = normalize_with(&doc.to_string(), &options).unwrap();
                let twice = normalize_with(once.as_str(), &options).unwrap();
                prop_assert_eq!(once, twice);
            }
        }

        #[test]
        fn document_is_equivalent_to_its_normal_form(doc in arb_json()) {
            let raw = serde_json::to_string_pretty(&doc).unwrap();
            let normal = normalize(&raw).unwrap();
            prop_assert!(are_equivalent(&raw, normal.as_str()));
        }
    }
}
