//! Pre-flight validation of desired specs.
//!
//! The controller validates every spec against the resource schema before it
//! issues a remote call, so malformed input fails fast with diagnostics that
//! point at the offending attribute.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_logs::schema::{Attribute, Schema};
//! use hemmer_provider_logs::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("retention_in_days", Attribute::optional_int64());
//!
//! assert!(validate(&schema, &json!({"name": "app", "retention_in_days": 7})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"name": "app", "retention_in_days": "7"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("retention_in_days".to_string()));
//! ```

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::ProviderError;
use crate::normalizer;
use crate::schema::{Attribute, AttributeType, Diagnostic, Schema};

/// Validate a spec against a schema.
///
/// Returns an empty list when the spec is valid.
///
/// - Required attributes must be present and non-null.
/// - Computed-only attributes are skipped; the remote service owns them.
/// - Attributes not declared in the schema are rejected.
/// - JSON document attributes must hold parseable JSON text.
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match value {
        Value::Object(map) => map,
        other => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(other))),
            );
            return diagnostics;
        },
    };

    for (name, attr) in &schema.attributes {
        validate_attribute(attr, obj.get(name), name, &mut diagnostics);
    }

    for name in obj.keys() {
        if !schema.attributes.contains_key(name) {
            diagnostics.push(
                Diagnostic::error(format!("Unsupported attribute '{}'", name))
                    .with_attribute(name.as_str()),
            );
        }
    }

    diagnostics
}

/// Validate a spec, folding any error diagnostics into a single
/// [`ProviderError::Validation`].
pub fn validate_spec(schema: &Schema, value: &Value) -> Result<(), ProviderError> {
    let errors: Vec<String> = validate(schema, value)
        .into_iter()
        .filter(Diagnostic::is_error)
        .map(|d| match d.detail {
            Some(detail) => format!("{}: {}", d.summary, detail),
            None => d.summary,
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ProviderError::Validation(errors.join("; ")))
    }
}

/// Check if a spec is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.is_computed_only() {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(v) => validate_type(&attr.attr_type, v, path, diagnostics),
    }
}

fn validate_type(ty: &AttributeType, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    match ty {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Int64 => {
            if value.as_i64().is_none() {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Float64 => {
            if !value.is_number() {
                diagnostics.push(type_error(path, "float64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::JsonDocument => match value.as_str() {
            Some(raw) => {
                if let Err(e) = normalizer::normalize(raw) {
                    diagnostics.push(
                        Diagnostic::error(format!("Invalid JSON document in '{}'", path))
                            .with_detail(e.to_string())
                            .with_attribute(path),
                    );
                }
            },
            None => diagnostics.push(type_error(path, "JSON document string", value)),
        },
        AttributeType::List(element_type) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    validate_type(element_type, item, &format!("{}.{}", path, i), diagnostics);
                }
            },
            None => diagnostics.push(type_error(path, "list", value)),
        },
        AttributeType::Map(value_type) => match value.as_object() {
            Some(map) => {
                for (key, item) in map {
                    validate_type(value_type, item, &format!("{}.{}", path, key), diagnostics);
                }
            },
            None => diagnostics.push(type_error(path, "map", value)),
        },
        AttributeType::Object(attrs) => match value.as_object() {
            Some(map) => validate_object(attrs, map, path, diagnostics),
            None => diagnostics.push(type_error(path, "object", value)),
        },
    }
}

fn validate_object(
    attrs: &BTreeMap<String, AttributeType>,
    obj: &serde_json::Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for (name, ty) in attrs {
        if let Some(value) = obj.get(name).filter(|v| !v.is_null()) {
            validate_type(ty, value, &format!("{}.{}", path, name), diagnostics);
        }
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter_schema() -> Schema {
        Schema::v0()
            .with_attribute("name", Attribute::required_string().with_force_new())
            .with_attribute("log_group_name", Attribute::required_string())
            .with_attribute("pattern", Attribute::optional_string())
            .with_attribute("id", Attribute::computed_string())
    }

    #[test]
    fn test_validate_required_string() {
        let schema = filter_schema();

        assert!(validate(&schema, &json!({"name": "f", "log_group_name": "g"})).is_empty());

        let diagnostics = validate(&schema, &json!({"log_group_name": "g"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("name".to_string()));

        let diagnostics = validate(&schema, &json!({"name": null, "log_group_name": "g"}));
        assert_eq!(diagnostics.len(), 1);

        let diagnostics = validate(&schema, &json!({"name": 1, "log_group_name": "g"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_computed_attribute_skipped() {
        let schema = filter_schema();
        let spec = json!({"name": "f", "log_group_name": "g", "id": 42});
        assert!(validate(&schema, &spec).is_empty());
    }

    #[test]
    fn test_validate_unsupported_attribute() {
        let schema = filter_schema();
        let config = json!({"name": "f", "log_group_name": "g", "nope": 1});
        let diagnostics = validate(&schema, &config);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("nope".to_string()));
    }

    #[test]
    fn test_validate_int64_rejects_fraction() {
        let schema = Schema::v0().with_attribute("retention_in_days", Attribute::optional_int64());
        assert!(is_valid(&schema, &json!({"retention_in_days": 30})));
        assert!(!is_valid(&schema, &json!({"retention_in_days": 1.5})));
    }

    #[test]
    fn test_validate_document() {
        let schema = Schema::v0().with_attribute("policy_document", Attribute::required_document());

        assert!(is_valid(&schema, &json!({"policy_document": r#"{"Version":"2012-10-17"}"#})));

        let diagnostics = validate(&schema, &json!({"policy_document": "{not json"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid JSON document"));

        let diagnostics = validate(&schema, &json!({"policy_document": {"a": 1}}));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_validate_nested_object_list() {
        let schema = Schema::v0().with_attribute(
            "metric_transformation",
            Attribute::new(
                AttributeType::list(AttributeType::object([
                    ("name", AttributeType::String),
                    ("value", AttributeType::String),
                ])),
                crate::schema::AttributeFlags::required(),
            ),
        );

        assert!(is_valid(
            &schema,
            &json!({"metric_transformation": [{"name": "n", "value": "1"}]})
        ));

        let diagnostics = validate(&schema, &json!({"metric_transformation": [{"name": 3}]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].attribute,
            Some("metric_transformation.0.name".to_string())
        );
    }

    #[test]
    fn test_validate_root_not_object() {
        let diagnostics = validate(&filter_schema(), &json!("string"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "Expected object");
    }

    #[test]
    fn test_validate_spec_folds_errors() {
        let err = validate_spec(&filter_schema(), &json!({})).unwrap_err();
        match err {
            ProviderError::Validation(msg) => {
                assert!(msg.contains("'name'"));
                assert!(msg.contains("'log_group_name'"));
            },
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
