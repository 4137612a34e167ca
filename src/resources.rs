//! The log-management resource catalog.
//!
//! Each resource type has a typed spec struct that maps to and from the JSON
//! attribute map the orchestrator works with, and a [`ResourceKind`]
//! describing how the controller reconciles it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::controller::{DocumentField, ResourceKind, WriteMode, ID_ATTRIBUTE};
use crate::error::ProviderError;
use crate::finder::Lookup;
use crate::identity::{Arn, IdentityScheme};
use crate::normalizer::{ExposurePolicy, NormalizeOptions};
use crate::remote::Attributes;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};

/// Log group resource type.
pub const LOG_GROUP: &str = "logs_log_group";
/// Log stream resource type.
pub const LOG_STREAM: &str = "logs_log_stream";
/// Metric filter resource type.
pub const METRIC_FILTER: &str = "logs_metric_filter";
/// Subscription filter resource type.
pub const SUBSCRIPTION_FILTER: &str = "logs_subscription_filter";
/// Resource policy resource type.
pub const RESOURCE_POLICY: &str = "logs_resource_policy";
/// Account policy resource type.
pub const ACCOUNT_POLICY: &str = "logs_account_policy";
/// Data protection policy resource type.
pub const DATA_PROTECTION_POLICY: &str = "logs_data_protection_policy";
/// Transformer resource type.
pub const TRANSFORMER: &str = "logs_transformer";
/// Delivery resource type.
pub const DELIVERY: &str = "logs_delivery";

/// Retention periods accepted for log groups, in days.
pub const RETENTION_DAYS: &[i64] = &[
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922,
    3288, 3653,
];

/// A typed resource spec.
pub trait LogsResource: Serialize + DeserializeOwned {
    /// Resource type name.
    const TYPE_NAME: &'static str;

    /// How the controller reconciles this type.
    fn kind() -> ResourceKind;

    /// Checks that the schema cannot express.
    fn check(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Convert to an attribute map.
    fn to_attributes(&self) -> Result<Attributes, ProviderError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(ProviderError::Sdk(format!(
                "{} did not serialize to an object: {}",
                Self::TYPE_NAME,
                other
            ))),
        }
    }

    /// Parse an attribute map.
    fn from_attributes(attributes: &Attributes) -> Result<Self, ProviderError> {
        serde_json::from_value(Value::Object(attributes.clone()))
            .map_err(|e| ProviderError::Validation(format!("{}: {}", Self::TYPE_NAME, e)))
    }
}

fn check<T: LogsResource>(attributes: &Attributes) -> Result<(), ProviderError> {
    T::from_attributes(attributes)?.check()
}

fn id() -> Attribute {
    Attribute::computed_string().with_description("Encoded identity")
}

fn optional_computed_string() -> Attribute {
    Attribute::new(AttributeType::String, AttributeFlags::optional_computed())
}

/// A log group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogGroup {
    /// Log group name.
    pub name: String,
    /// Days to keep events; unset keeps them forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_in_days: Option<i64>,
    /// KMS key encrypting the group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_id: Option<String>,
    /// Storage class, chosen by the service when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_group_class: Option<String>,
    /// Keep the remote group when the resource is destroyed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_destroy: Option<bool>,
    /// ARN assigned by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    /// Creation time in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<i64>,
    /// Encoded identity, set once the object exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl LogsResource for LogGroup {
    const TYPE_NAME: &'static str = LOG_GROUP;

    fn kind() -> ResourceKind {
        let schema = Schema::v0()
            .with_description("A log group")
            .with_attribute("name", Attribute::required_string().with_force_new())
            .with_attribute(
                "retention_in_days",
                Attribute::optional_int64()
                    .with_description("Days to keep events; unset keeps them forever"),
            )
            .with_attribute("kms_key_id", Attribute::optional_string())
            .with_attribute("log_group_class", optional_computed_string().with_force_new())
            .with_attribute(
                "skip_destroy",
                Attribute::optional_bool().with_description("Keep the log group on destroy"),
            )
            .with_attribute("arn", Attribute::computed_string())
            .with_attribute("creation_time", Attribute::computed_int64())
            .with_attribute(ID_ATTRIBUTE, id());

        ResourceKind::new(LOG_GROUP, schema, IdentityScheme::simple("name"))
            .with_lookup(Lookup::list(Vec::<String>::new(), Some("name")))
            .with_update_group("retention", ["retention_in_days"])
            .with_update_group("kms", ["kms_key_id"])
            .with_retain_field("skip_destroy")
            .with_check(check::<LogGroup>)
    }

    fn check(&self) -> Result<(), ProviderError> {
        match self.retention_in_days {
            Some(days) if !RETENTION_DAYS.contains(&days) => Err(ProviderError::Validation(format!(
                "retention_in_days must be one of {:?}, got {}",
                RETENTION_DAYS, days
            ))),
            _ => Ok(()),
        }
    }
}

/// A log stream inside a log group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogStream {
    /// Owning log group.
    pub log_group_name: String,
    /// Stream name.
    pub name: String,
    /// ARN assigned by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    /// Creation time in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<i64>,
    /// Encoded identity, set once the object exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl LogsResource for LogStream {
    const TYPE_NAME: &'static str = LOG_STREAM;

    fn kind() -> ResourceKind {
        let schema = Schema::v0()
            .with_attribute("log_group_name", Attribute::required_string().with_force_new())
            .with_attribute("name", Attribute::required_string().with_force_new())
            .with_attribute("arn", Attribute::computed_string())
            .with_attribute("creation_time", Attribute::computed_int64())
            .with_attribute(ID_ATTRIBUTE, id());

        ResourceKind::new(
            LOG_STREAM,
            schema,
            IdentityScheme::composite(["log_group_name", "name"], ':'),
        )
        .with_lookup(Lookup::list(["log_group_name"], Some("name")))
        .with_parent("log_group_name")
        .with_check(check::<LogStream>)
    }

    fn check(&self) -> Result<(), ProviderError> {
        if self.name.contains(':') {
            return Err(ProviderError::Validation(format!(
                "log stream name {:?} must not contain ':'",
                self.name
            )));
        }
        Ok(())
    }
}

/// How a metric filter turns matches into metric values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricTransformation {
    /// Metric name.
    pub name: String,
    /// Metric namespace.
    pub namespace: String,
    /// Value published for each match.
    pub value: String,
    /// Value published when nothing matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

/// A metric filter on a log group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricFilter {
    /// Log group the filter watches.
    pub log_group_name: String,
    /// Filter name, unique within the group.
    pub name: String,
    /// Filter pattern.
    pub pattern: String,
    /// Metric the filter publishes.
    pub metric_transformation: MetricTransformation,
    /// Encoded identity, set once the object exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl LogsResource for MetricFilter {
    const TYPE_NAME: &'static str = METRIC_FILTER;

    fn kind() -> ResourceKind {
        let transformation = AttributeType::object([
            ("name", AttributeType::String),
            ("namespace", AttributeType::String),
            ("value", AttributeType::String),
            ("default_value", AttributeType::String),
        ]);
        let schema = Schema::v0()
            .with_attribute("log_group_name", Attribute::required_string().with_force_new())
            .with_attribute("name", Attribute::required_string().with_force_new())
            .with_attribute("pattern", Attribute::required_string())
            .with_attribute(
                "metric_transformation",
                Attribute::new(transformation, AttributeFlags::required()),
            )
            .with_attribute(ID_ATTRIBUTE, id());

        ResourceKind::new(
            METRIC_FILTER,
            schema,
            IdentityScheme::composite(["log_group_name", "name"], ':'),
        )
        .with_write_mode(WriteMode::Upsert)
        .with_lookup(Lookup::list(["log_group_name"], Some("name")))
        .with_parent("log_group_name")
        .with_check(check::<MetricFilter>)
    }
}

/// A subscription filter streaming a log group to a destination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionFilter {
    /// Log group the filter watches.
    pub log_group_name: String,
    /// Filter name, unique within the group.
    pub name: String,
    /// Filter pattern; empty matches every event.
    pub filter_pattern: String,
    /// Stream, function or delivery stream receiving events.
    pub destination_arn: String,
    /// Role the service assumes to write to the destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    /// How events spread over destination shards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<String>,
    /// Encoded identity, set once the object exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl LogsResource for SubscriptionFilter {
    const TYPE_NAME: &'static str = SUBSCRIPTION_FILTER;

    fn kind() -> ResourceKind {
        let schema = Schema::v0()
            .with_attribute("log_group_name", Attribute::required_string().with_force_new())
            .with_attribute("name", Attribute::required_string().with_force_new())
            .with_attribute("filter_pattern", Attribute::required_string())
            .with_attribute("destination_arn", Attribute::required_string())
            .with_attribute("role_arn", Attribute::optional_string())
            .with_attribute("distribution", optional_computed_string())
            .with_attribute(ID_ATTRIBUTE, id());

        ResourceKind::new(
            SUBSCRIPTION_FILTER,
            schema,
            IdentityScheme::composite(["log_group_name", "name"], '|'),
        )
        .with_write_mode(WriteMode::Upsert)
        .with_lookup(Lookup::list(["log_group_name"], Some("name")))
        .with_parent("log_group_name")
        .with_check(check::<SubscriptionFilter>)
    }

    fn check(&self) -> Result<(), ProviderError> {
        self.destination_arn.parse::<Arn>()?;
        if let Some(role) = &self.role_arn {
            role.parse::<Arn>()?;
        }
        match self.distribution.as_deref() {
            None | Some("Random") | Some("ByLogStream") => Ok(()),
            Some(other) => Err(ProviderError::Validation(format!(
                "distribution must be Random or ByLogStream, got {:?}",
                other
            ))),
        }
    }
}

/// A resource policy granting services access to write logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourcePolicy {
    /// Policy name.
    pub policy_name: String,
    /// JSON policy document.
    pub policy_document: String,
    /// Encoded identity, set once the object exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl LogsResource for ResourcePolicy {
    const TYPE_NAME: &'static str = RESOURCE_POLICY;

    fn kind() -> ResourceKind {
        let schema = Schema::v0()
            .with_attribute("policy_name", Attribute::required_string().with_force_new())
            .with_attribute("policy_document", Attribute::required_document())
            .with_attribute(ID_ATTRIBUTE, id());

        ResourceKind::new(RESOURCE_POLICY, schema, IdentityScheme::simple("policy_name"))
            .with_write_mode(WriteMode::Upsert)
            .with_document(
                DocumentField::new("policy_document")
                    .with_options(NormalizeOptions::iam_policy())
                    .with_exposure(ExposurePolicy::RemoteDropsEmptyObjects),
            )
            .with_check(check::<ResourcePolicy>)
    }
}

/// Account policy types.
pub const ACCOUNT_POLICY_TYPES: &[&str] = &[
    "DATA_PROTECTION_POLICY",
    "SUBSCRIPTION_FILTER_POLICY",
    "FIELD_INDEX_POLICY",
    "TRANSFORMER_POLICY",
];

/// An account-wide policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountPolicy {
    /// Policy name.
    pub policy_name: String,
    /// One of [`ACCOUNT_POLICY_TYPES`].
    pub policy_type: String,
    /// JSON policy document.
    pub policy_document: String,
    /// Policy scope, `ALL` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Which log groups the policy applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_criteria: Option<String>,
    /// Encoded identity, set once the object exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl LogsResource for AccountPolicy {
    const TYPE_NAME: &'static str = ACCOUNT_POLICY;

    fn kind() -> ResourceKind {
        let schema = Schema::v0()
            .with_attribute("policy_name", Attribute::required_string().with_force_new())
            .with_attribute("policy_type", Attribute::required_string().with_force_new())
            .with_attribute("policy_document", Attribute::required_document())
            .with_attribute("scope", optional_computed_string())
            .with_attribute("selection_criteria", Attribute::optional_string())
            .with_attribute(ID_ATTRIBUTE, id());

        ResourceKind::new(
            ACCOUNT_POLICY,
            schema,
            IdentityScheme::composite(["policy_name", "policy_type"], ':'),
        )
        .with_write_mode(WriteMode::Upsert)
        .with_document(DocumentField::new("policy_document"))
        .with_check(check::<AccountPolicy>)
    }

    fn check(&self) -> Result<(), ProviderError> {
        if !ACCOUNT_POLICY_TYPES.contains(&self.policy_type.as_str()) {
            return Err(ProviderError::Validation(format!(
                "policy_type must be one of {:?}, got {:?}",
                ACCOUNT_POLICY_TYPES, self.policy_type
            )));
        }
        Ok(())
    }
}

/// A data protection policy attached to one log group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataProtectionPolicy {
    /// Protected log group.
    pub log_group_name: String,
    /// JSON data protection document.
    pub policy_document: String,
    /// Encoded identity, set once the object exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl LogsResource for DataProtectionPolicy {
    const TYPE_NAME: &'static str = DATA_PROTECTION_POLICY;

    fn kind() -> ResourceKind {
        let schema = Schema::v0()
            .with_attribute("log_group_name", Attribute::required_string().with_force_new())
            .with_attribute("policy_document", Attribute::required_document())
            .with_attribute(ID_ATTRIBUTE, id());

        ResourceKind::new(
            DATA_PROTECTION_POLICY,
            schema,
            IdentityScheme::simple("log_group_name"),
        )
        .with_write_mode(WriteMode::Upsert)
        .with_document(
            DocumentField::new("policy_document")
                .with_options(NormalizeOptions::new().with_set_key("DataIdentifier")),
        )
        .with_check(check::<DataProtectionPolicy>)
    }
}

/// A log transformer. Processor order is significant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transformer {
    /// Name or ARN of the transformed log group.
    pub log_group_identifier: String,
    /// JSON array of processors.
    pub transformer_config: String,
    /// Encoded identity, set once the object exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl LogsResource for Transformer {
    const TYPE_NAME: &'static str = TRANSFORMER;

    fn kind() -> ResourceKind {
        let schema = Schema::v0()
            .with_attribute("log_group_identifier", Attribute::required_string().with_force_new())
            .with_attribute(
                "transformer_config",
                Attribute::required_document().with_description("Ordered list of processors"),
            )
            .with_attribute(ID_ATTRIBUTE, id());

        ResourceKind::new(TRANSFORMER, schema, IdentityScheme::simple("log_group_identifier"))
            .with_write_mode(WriteMode::Upsert)
            .with_document(DocumentField::new("transformer_config"))
            .eventually_consistent()
            .with_check(check::<Transformer>)
    }
}

/// A delivery connecting a delivery source to a destination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Delivery {
    /// Delivery source name.
    pub delivery_source_name: String,
    /// Delivery destination ARN.
    pub delivery_destination_arn: String,
    /// Delimiter between record fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_delimiter: Option<String>,
    /// Record fields to deliver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_fields: Option<Vec<String>>,
    /// ARN assigned by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    /// Encoded identity, set once the object exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl LogsResource for Delivery {
    const TYPE_NAME: &'static str = DELIVERY;

    fn kind() -> ResourceKind {
        let schema = Schema::v0()
            .with_attribute("delivery_source_name", Attribute::required_string().with_force_new())
            .with_attribute(
                "delivery_destination_arn",
                Attribute::required_string().with_force_new(),
            )
            .with_attribute("field_delimiter", Attribute::optional_string())
            .with_attribute(
                "record_fields",
                Attribute::new(
                    AttributeType::list(AttributeType::String),
                    AttributeFlags::optional(),
                ),
            )
            .with_attribute("arn", Attribute::computed_string())
            .with_attribute(ID_ATTRIBUTE, id());

        ResourceKind::new(DELIVERY, schema, IdentityScheme::opaque(ID_ATTRIBUTE))
            .with_update_group("configuration", ["field_delimiter", "record_fields"])
            .with_check(check::<Delivery>)
    }

    fn check(&self) -> Result<(), ProviderError> {
        self.delivery_destination_arn.parse::<Arn>().map(|_| ())
    }
}

/// Every shipped resource kind.
pub fn catalog() -> Vec<ResourceKind> {
    vec![
        LogGroup::kind(),
        LogStream::kind(),
        MetricFilter::kind(),
        SubscriptionFilter::kind(),
        ResourcePolicy::kind(),
        AccountPolicy::kind(),
        DataProtectionPolicy::kind(),
        Transformer::kind(),
        Delivery::kind(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_catalog_names_are_unique() {
        let mut names: Vec<String> = catalog().into_iter().map(|k| k.type_name).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
        assert!(names.contains(&LOG_GROUP.to_string()));
    }

    #[test]
    fn test_every_kind_has_computed_id() {
        for kind in catalog() {
            assert!(
                kind.schema.is_computed_only(ID_ATTRIBUTE),
                "{} lacks a computed id",
                kind.type_name
            );
        }
    }

    #[test]
    fn test_typed_round_trip_through_attributes() {
        let group = LogGroup {
            name: "/app/web".to_string(),
            retention_in_days: Some(14),
            ..Default::default()
        };
        let attributes = group.to_attributes().unwrap();
        assert_eq!(attributes.get("retention_in_days"), Some(&json!(14)));
        assert!(!attributes.contains_key("kms_key_id"));
        assert_eq!(LogGroup::from_attributes(&attributes).unwrap(), group);
    }

    #[test]
    fn test_log_group_retention_is_checked() {
        let kind = LogGroup::kind();
        let ok = json!({"name": "g", "retention_in_days": 30});
        let bad = json!({"name": "g", "retention_in_days": 31});
        assert!(kind.validate(ok.as_object().unwrap()).is_ok());
        assert!(matches!(
            kind.validate(bad.as_object().unwrap()),
            Err(ProviderError::Validation(_))
        ));
    }

    #[test]
    fn test_subscription_filter_checks() {
        let kind = SubscriptionFilter::kind();
        let mut spec = json!({
            "log_group_name": "g",
            "name": "f",
            "filter_pattern": "",
            "destination_arn": "arn:aws:kinesis:us-east-1:123456789012:stream/s",
            "distribution": "ByLogStream"
        });
        assert!(kind.validate(spec.as_object().unwrap()).is_ok());

        spec["distribution"] = json!("Sideways");
        assert!(kind.validate(spec.as_object().unwrap()).is_err());

        spec["distribution"] = json!("Random");
        spec["destination_arn"] = json!("kinesis-stream");
        assert!(matches!(
            kind.validate(spec.as_object().unwrap()),
            Err(ProviderError::Format(_))
        ));
    }

    #[test]
    fn test_account_policy_type_is_checked() {
        let kind = AccountPolicy::kind();
        let spec = json!({
            "policy_name": "p",
            "policy_type": "NOT_A_TYPE",
            "policy_document": "{}"
        });
        assert!(kind.validate(spec.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_state_fields_are_accepted() {
        let state = json!({
            "id": "g:s",
            "log_group_name": "g",
            "name": "s",
            "arn": "arn:aws:logs:us-east-1:123456789012:log-group:g:log-stream:s",
            "creation_time": 1
        });
        assert!(LogStream::kind().validate(state.as_object().unwrap()).is_ok());
    }
}
