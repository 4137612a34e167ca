//! The remote service boundary.
//!
//! The reconciliation engine never speaks a wire protocol itself. It drives a
//! [`RemoteService`] implementation, which maps these calls onto the concrete
//! control-plane API and reports absent objects as
//! [`ProviderError::NotFound`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::identity::Identity;

/// Attribute map shared by desired specs and remote objects.
pub type Attributes = Map<String, Value>;

/// The remote representation of one resource instance.
///
/// Attributes may be a superset of the desired spec (server-computed fields
/// such as `arn` or `creation_time`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteObject {
    /// All attributes reported by the remote service.
    pub attributes: Attributes,
}

impl RemoteObject {
    /// Wrap an attribute map.
    pub fn new(attributes: Attributes) -> Self {
        Self { attributes }
    }

    /// Build from a JSON object.
    pub fn from_value(value: Value) -> Result<Self, ProviderError> {
        match value {
            Value::Object(attributes) => Ok(Self { attributes }),
            other => Err(ProviderError::InvalidRequest(format!(
                "remote object must be a JSON object, got {}",
                other
            ))),
        }
    }

    /// Set an attribute.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Look up an attribute.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Look up a string attribute.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Convert into a JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.attributes)
    }
}

/// Server-side filter for list calls.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListFilter {
    /// Attributes that must equal the given value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub equals: BTreeMap<String, String>,
    /// An attribute that must start with the given prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<(String, String)>,
    /// Maximum items per page, when the caller wants to bound it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl ListFilter {
    /// A filter that matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `attribute == value`.
    pub fn with_equals(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.equals.insert(attribute.into(), value.into());
        self
    }

    /// Require `attribute` to start with `prefix`.
    pub fn with_prefix(mut self, attribute: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.prefix = Some((attribute.into(), prefix.into()));
        self
    }

    /// Bound the page size.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `object` passes this filter.
    pub fn matches(&self, object: &RemoteObject) -> bool {
        let equals = self
            .equals
            .iter()
            .all(|(k, v)| object.get_str(k) == Some(v.as_str()));
        let prefix = match &self.prefix {
            Some((k, p)) => object.get_str(k).is_some_and(|s| s.starts_with(p.as_str())),
            None => true,
        };
        equals && prefix
    }
}

/// One page of a list call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    /// Objects on this page.
    pub items: Vec<RemoteObject>,
    /// Token for the next page; `None` on the last page.
    pub next_token: Option<String>,
}

impl Page {
    /// The last page.
    pub fn last(items: Vec<RemoteObject>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }
}

/// An in-place update of one group of mutable attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    /// The update group, when the kind splits updates across several calls.
    pub group: Option<String>,
    /// Attributes that changed within the group.
    pub changed: Vec<String>,
    /// The full new desired spec.
    pub spec: Attributes,
}

/// Control-plane operations of the remote system.
///
/// Implementations must report a missing object as
/// [`ProviderError::NotFound`] from `read`, `update` and `delete`, and should
/// report throttling and outages as retryable errors
/// ([`ProviderError::Throttled`], [`ProviderError::Unavailable`]).
#[async_trait::async_trait]
pub trait RemoteService: Send + Sync + 'static {
    /// Create a new object.
    async fn create(
        &self,
        resource_type: &str,
        spec: &Attributes,
    ) -> Result<RemoteObject, ProviderError>;

    /// Create or replace an object in one call.
    ///
    /// Defaults to [`RemoteService::create`] for services whose create is
    /// already an upsert.
    async fn put(
        &self,
        resource_type: &str,
        spec: &Attributes,
    ) -> Result<RemoteObject, ProviderError> {
        self.create(resource_type, spec).await
    }

    /// Get one object by key.
    async fn read(
        &self,
        resource_type: &str,
        key: &Identity,
    ) -> Result<RemoteObject, ProviderError> {
        let _ = key;
        Err(ProviderError::Unimplemented(format!(
            "direct read is not supported for {}",
            resource_type
        )))
    }

    /// Update one group of attributes in place.
    async fn update(
        &self,
        resource_type: &str,
        key: &Identity,
        request: &UpdateRequest,
    ) -> Result<RemoteObject, ProviderError> {
        let _ = (key, request);
        Err(ProviderError::Unimplemented(format!(
            "in-place update is not supported for {}",
            resource_type
        )))
    }

    /// Delete one object.
    async fn delete(&self, resource_type: &str, key: &Identity) -> Result<(), ProviderError>;

    /// List objects, one page at a time.
    async fn list(
        &self,
        resource_type: &str,
        filter: &ListFilter,
        page_token: Option<&str>,
    ) -> Result<Page, ProviderError> {
        let _ = (filter, page_token);
        Err(ProviderError::Unimplemented(format!(
            "listing is not supported for {}",
            resource_type
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn group(name: &str) -> RemoteObject {
        RemoteObject::default()
            .with("name", name)
            .with("retention_in_days", 7)
    }

    #[test]
    fn test_filter_matches() {
        let filter = ListFilter::new().with_prefix("name", "/app/");
        assert!(filter.matches(&group("/app/web")));
        assert!(!filter.matches(&group("/infra/db")));

        let filter = ListFilter::new()
            .with_equals("name", "/app/web")
            .with_prefix("name", "/app");
        assert!(filter.matches(&group("/app/web")));
        assert!(!filter.matches(&group("/app/worker")));

        assert!(ListFilter::new().matches(&group("anything")));
    }

    #[test]
    fn test_remote_object_from_value() {
        let object = RemoteObject::from_value(json!({"name": "g", "arn": "arn:x"})).unwrap();
        assert_eq!(object.get_str("arn"), Some("arn:x"));
        assert!(RemoteObject::from_value(json!([1])).is_err());
        assert_eq!(object.into_value()["name"], "g");
    }

    #[test]
    fn test_remote_object_serializes_flat() {
        let object = group("g");
        assert_eq!(
            serde_json::to_value(&object).unwrap(),
            json!({"name": "g", "retention_in_days": 7})
        );
    }
}
