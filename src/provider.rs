//! The orchestrator-facing provider interface.
//!
//! [`ProviderService`] is what an orchestrator drives: plan, apply, refresh,
//! import and data source reads over plain JSON. [`LogsProvider`] implements
//! it for the log-management catalog by dispatching each call to a
//! [`ResourceController`] for the requested type.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::ProviderConfig;
use crate::controller::{
    DeleteOutcome, ReadOutcome, ResourceController, ResourceKind, UpdateOutcome,
};
use crate::error::{Action, ProviderError};
use crate::identity::Identity;
use crate::remote::{Attributes, ListFilter, RemoteService};
use crate::resources;
use crate::retry::OperationContext;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, ProviderSchema, Schema};
use crate::types::{ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities};
use crate::validation;

/// Singular log group data source.
pub const LOG_GROUP_DATA_SOURCE: &str = "logs_log_group";
/// Log group listing data source.
pub const LOG_GROUPS_DATA_SOURCE: &str = "logs_log_groups";

/// Trait that provider implementations must implement.
///
/// State and configuration travel as `serde_json::Value` objects. A `read`
/// that returns `Value::Null` tells the orchestrator the resource is gone.
///
/// # Example
///
/// ```ignore
/// use hemmer_provider_logs::{ProviderService, ProviderError, PlanResult, ProviderSchema};
/// use hemmer_provider_logs::schema::{Schema, Attribute, Diagnostic};
///
/// struct MyProvider;
///
/// #[async_trait::async_trait]
/// impl ProviderService for MyProvider {
///     fn schema(&self) -> ProviderSchema {
///         ProviderSchema::new()
///             .with_resource("example_resource", Schema::v0()
///                 .with_attribute("name", Attribute::required_string()))
///     }
///
///     async fn configure(
///         &self,
///         config: serde_json::Value,
///     ) -> Result<Vec<Diagnostic>, ProviderError> {
///         Ok(vec![])
///     }
///
///     // ... implement other methods
/// }
/// ```
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Return the provider's schema including all resources and data sources.
    fn schema(&self) -> ProviderSchema;

    /// Return provider metadata.
    /// By default, this is derived from the schema.
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        ProviderMetadata {
            resources: schema.resources.keys().cloned().collect(),
            data_sources: schema.data_sources.keys().cloned().collect(),
            capabilities: Default::default(),
        }
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate the provider configuration before configuring.
    /// Returns diagnostics (errors and warnings).
    async fn validate_provider_config(
        &self,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Configure the provider.
    /// Returns diagnostics (errors and warnings).
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider gracefully.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource's configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Plan changes for a resource. A null `proposed_state` plans a destroy.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a new resource.
    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Read the current state of a resource.
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource.
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError>;

    /// Import existing infrastructure into management.
    async fn import_resource(
        &self,
        resource_type: &str,
        _id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Err(ProviderError::Unimplemented(format!(
            "Import not supported for resource type: {}",
            resource_type
        )))
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    /// Validate a data source's configuration.
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (data_source_type, config);
        Ok(vec![])
    }

    /// Read data from an external source.
    async fn read_data_source(
        &self,
        data_source_type: &str,
        _config: Value,
    ) -> Result<Value, ProviderError> {
        Err(ProviderError::UnknownResource(format!(
            "Unknown data source type: {}",
            data_source_type
        )))
    }
}

/// The log-management provider.
///
/// Every operation runs under a child of the provider's shutdown token, so
/// [`ProviderService::stop`] aborts in-flight work.
pub struct LogsProvider<R> {
    remote: Arc<R>,
    kinds: BTreeMap<String, Arc<ResourceKind>>,
    config: RwLock<ProviderConfig>,
    shutdown: CancellationToken,
}

impl<R: RemoteService> LogsProvider<R> {
    /// A provider serving every kind in [`resources::catalog`].
    pub fn new(remote: Arc<R>) -> Self {
        let kinds = resources::catalog()
            .into_iter()
            .map(|kind| (kind.type_name.clone(), Arc::new(kind)))
            .collect();
        Self {
            remote,
            kinds,
            config: RwLock::new(ProviderConfig::default()),
            shutdown: CancellationToken::new(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> ProviderConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn kind(&self, resource_type: &str) -> Result<&Arc<ResourceKind>, ProviderError> {
        self.kinds
            .get(resource_type)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    fn controller(&self, resource_type: &str) -> Result<ResourceController<R>, ProviderError> {
        let config = self.config();
        let kind = Arc::clone(self.kind(resource_type)?);
        Ok(ResourceController::new(Arc::clone(&self.remote), kind)
            .with_retry(config.retry_options())
            .with_page_size(config.page_size))
    }

    fn context(&self) -> OperationContext {
        OperationContext::new().with_cancellation(self.shutdown.child_token())
    }

    fn identity(
        &self,
        action: Action,
        resource_type: &str,
        state: &Attributes,
    ) -> Result<Identity, ProviderError> {
        self.kind(resource_type)?.identity_of(state).map_err(|e| {
            let id = state.get("id").and_then(Value::as_str).unwrap_or("<unknown>");
            e.context(action, resource_type, id)
        })
    }

    fn data_source_schemas() -> [(&'static str, Schema); 2] {
        let computed_list = || {
            Attribute::new(AttributeType::list(AttributeType::String), AttributeFlags::computed())
        };
        [
            (
                LOG_GROUP_DATA_SOURCE,
                Schema::v0()
                    .with_description("Look up one log group by name")
                    .with_attribute("name", Attribute::required_string())
                    .with_attribute("arn", Attribute::computed_string())
                    .with_attribute("retention_in_days", Attribute::computed_int64())
                    .with_attribute("kms_key_id", Attribute::computed_string())
                    .with_attribute("log_group_class", Attribute::computed_string())
                    .with_attribute("creation_time", Attribute::computed_int64())
                    .with_attribute("id", Attribute::computed_string()),
            ),
            (
                LOG_GROUPS_DATA_SOURCE,
                Schema::v0()
                    .with_description("List log groups, optionally by name prefix")
                    .with_attribute("name_prefix", Attribute::optional_string())
                    .with_attribute("names", computed_list())
                    .with_attribute("arns", computed_list()),
            ),
        ]
    }

    fn data_source_schema(data_source_type: &str) -> Result<Schema, ProviderError> {
        Self::data_source_schemas()
            .into_iter()
            .find(|(name, _)| *name == data_source_type)
            .map(|(_, schema)| schema)
            .ok_or_else(|| {
                ProviderError::UnknownResource(format!(
                    "Unknown data source type: {}",
                    data_source_type
                ))
            })
    }

    async fn read_log_group(&self, config: &Attributes) -> Result<Value, ProviderError> {
        let name = config.get("name").and_then(Value::as_str).unwrap_or_default();
        let controller = self.controller(resources::LOG_GROUP)?;
        let identity = controller.kind().identity.decode(name)?;

        match controller.read(&self.context(), &identity, &Map::new()).await? {
            ReadOutcome::Present { state, .. } => Ok(Value::Object(state)),
            ReadOutcome::Removed => {
                Err(ProviderError::not_found(format!("log group {} not found", name)).context(
                    Action::Reading,
                    LOG_GROUP_DATA_SOURCE,
                    name,
                ))
            },
        }
    }

    async fn list_log_groups(&self, config: &Attributes) -> Result<Value, ProviderError> {
        let prefix = config.get("name_prefix").and_then(Value::as_str);
        let filter = match prefix {
            Some(prefix) => ListFilter::new().with_prefix("name", prefix),
            None => ListFilter::new(),
        };

        let groups = self
            .controller(resources::LOG_GROUP)?
            .list(&self.context(), &filter)
            .await?;
        debug!(count = groups.len(), "listed log groups");

        let column = |field: &str| -> Vec<Value> {
            groups
                .iter()
                .filter_map(|g| g.get(field).cloned())
                .collect()
        };
        let mut result = Map::new();
        if let Some(prefix) = prefix {
            result.insert("name_prefix".to_string(), Value::String(prefix.to_string()));
        }
        result.insert("names".to_string(), Value::Array(column("name")));
        result.insert("arns".to_string(), Value::Array(column("arn")));
        Ok(Value::Object(result))
    }
}

fn object(value: Value, what: &str) -> Result<Attributes, ProviderError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ProviderError::InvalidRequest(format!(
            "{} must be a JSON object, got {}",
            what, other
        ))),
    }
}

fn error_diagnostics(err: &ProviderError) -> Vec<Diagnostic> {
    vec![Diagnostic::error(err.to_string())]
}

#[async_trait::async_trait]
impl<R: RemoteService> ProviderService for LogsProvider<R> {
    fn schema(&self) -> ProviderSchema {
        let schema = self
            .kinds
            .iter()
            .fold(ProviderSchema::new(), |schema, (name, kind)| {
                schema.with_resource(name.as_str(), kind.schema.clone())
            })
            .with_provider_config(ProviderConfig::schema());
        Self::data_source_schemas()
            .into_iter()
            .fold(schema, |schema, (name, ds)| schema.with_data_source(name, ds))
    }

    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        ProviderMetadata {
            resources: schema.resources.keys().cloned().collect(),
            data_sources: schema.data_sources.keys().cloned().collect(),
            capabilities: ServerCapabilities { plan_destroy: true },
        }
    }

    #[instrument(skip(self, config), name = "provider.validate_provider_config")]
    async fn validate_provider_config(
        &self,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(match ProviderConfig::from_value(config) {
            Ok(config) => config.diagnostics(),
            Err(e) => error_diagnostics(&e),
        })
    }

    #[instrument(skip(self, config), name = "provider.configure")]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let config = match ProviderConfig::from_value(config) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "rejected provider configuration");
                return Ok(error_diagnostics(&e));
            },
        };

        let diagnostics = config.diagnostics();
        if diagnostics.iter().any(Diagnostic::is_error) {
            warn!(diagnostics = diagnostics.len(), "rejected provider configuration");
        } else {
            info!(
                timeout_secs = config.timeout_secs,
                page_size = ?config.page_size,
                "configured"
            );
            *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        }
        Ok(diagnostics)
    }

    #[instrument(skip(self), name = "provider.stop")]
    async fn stop(&self) -> Result<(), ProviderError> {
        info!("stopping, cancelling in-flight operations");
        self.shutdown.cancel();
        Ok(())
    }

    #[instrument(skip(self, config), name = "provider.validate_resource_config")]
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let kind = self.kind(resource_type)?;
        let mut diagnostics = validation::validate(&kind.schema, &config);
        if diagnostics.iter().any(Diagnostic::is_error) {
            return Ok(diagnostics);
        }

        if let (Some(check), Value::Object(spec)) = (kind.check, &config) {
            if let Err(e) = check(spec) {
                diagnostics.push(Diagnostic::error(e.message()));
            }
        }
        Ok(diagnostics)
    }

    #[instrument(skip(self, prior_state, proposed_state, _config), name = "provider.plan")]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let prior = match prior_state {
            Some(Value::Null) | None => None,
            Some(state) => Some(object(state, "prior state")?),
        };
        let proposed = match proposed_state {
            Value::Null => None,
            state => Some(object(state, "proposed state")?),
        };

        let plan = self
            .controller(resource_type)?
            .plan(prior.as_ref(), proposed.as_ref())?;
        debug!(
            changes = plan.changes.len(),
            requires_replace = plan.requires_replace,
            destroy = plan.is_destroy(),
            has_changes = plan.has_changes(),
            "planned"
        );
        Ok(plan)
    }

    #[instrument(skip(self, planned_state), name = "provider.create")]
    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let spec = object(planned_state, "planned state")?;
        let applied = self
            .controller(resource_type)?
            .create(&self.context(), &spec)
            .await?;
        Ok(applied.into_value())
    }

    #[instrument(skip(self, current_state), name = "provider.read")]
    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        let state = object(current_state, "current state")?;
        let identity = self.identity(Action::Reading, resource_type, &state)?;

        match self
            .controller(resource_type)?
            .read(&self.context(), &identity, &state)
            .await?
        {
            ReadOutcome::Present { state, .. } => Ok(Value::Object(state)),
            ReadOutcome::Removed => Ok(Value::Null),
        }
    }

    #[instrument(skip(self, prior_state, planned_state), name = "provider.update")]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let prior = object(prior_state, "prior state")?;
        let planned = object(planned_state, "planned state")?;
        let identity = self.identity(Action::Updating, resource_type, &prior)?;

        match self
            .controller(resource_type)?
            .update(&self.context(), &identity, &planned, &prior)
            .await?
        {
            UpdateOutcome::Unchanged => Ok(Value::Object(prior)),
            UpdateOutcome::Updated(applied) => Ok(applied.into_value()),
            UpdateOutcome::ReplacementRequired { attributes } => {
                Err(ProviderError::FailedPrecondition(format!(
                    "must be replaced, changed: {}",
                    attributes.join(", ")
                ))
                .context(Action::Updating, resource_type, identity.encode()))
            },
        }
    }

    #[instrument(skip(self, current_state), name = "provider.delete")]
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let state = object(current_state, "current state")?;
        let identity = self.identity(Action::Deleting, resource_type, &state)?;

        let outcome = self
            .controller(resource_type)?
            .delete(&self.context(), &identity, &state)
            .await?;
        if outcome == DeleteOutcome::Retained {
            info!(id = %identity, "{} left in place", resource_type);
        }
        Ok(())
    }

    #[instrument(skip(self), name = "provider.import_resource")]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let applied = self
            .controller(resource_type)?
            .import(&self.context(), id)
            .await?;
        Ok(vec![ImportedResource::new(resource_type, applied.into_value())])
    }

    #[instrument(skip(self, config), name = "provider.validate_data_source_config")]
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let schema = Self::data_source_schema(data_source_type)?;
        Ok(validation::validate(&schema, &config))
    }

    #[instrument(skip(self, config), name = "provider.read_data_source")]
    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let schema = Self::data_source_schema(data_source_type)?;
        validation::validate_spec(&schema, &config)?;
        let config = object(config, "data source configuration")?;

        match data_source_type {
            LOG_GROUP_DATA_SOURCE => self.read_log_group(&config).await,
            _ => self.list_log_groups(&config).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteObject;
    use crate::testing::{assert_removed, MemoryRemote, ProviderTester};
    use serde_json::json;

    fn provider() -> (Arc<MemoryRemote>, ProviderTester<LogsProvider<MemoryRemote>>) {
        let remote = Arc::new(MemoryRemote::new());
        let tester = ProviderTester::new(LogsProvider::new(Arc::clone(&remote)));
        (remote, tester)
    }

    fn group(name: &str) -> RemoteObject {
        RemoteObject::default()
            .with("name", name)
            .with("arn", format!("arn:aws:logs:us-east-1:123456789012:log-group:{}", name))
    }

    #[test]
    fn test_schema_covers_catalog_and_data_sources() {
        let (_, tester) = provider();
        let resources = tester.resource_types();
        assert_eq!(resources.len(), resources::catalog().len());
        assert!(resources.contains(&resources::DELIVERY.to_string()));
        assert_eq!(
            tester.data_source_types(),
            vec![LOG_GROUP_DATA_SOURCE.to_string(), LOG_GROUPS_DATA_SOURCE.to_string()]
        );
        assert!(tester.provider().metadata().capabilities.plan_destroy);
        assert!(tester.schema().provider.attributes.contains_key("page_size"));
    }

    #[tokio::test]
    async fn test_configure() {
        let (_, tester) = provider();
        tester
            .configure(json!({"timeout_secs": 3, "page_size": 25}))
            .await
            .unwrap();
        assert_eq!(tester.provider().config().page_size, Some(25));

        let err = tester.configure(json!({"retries": 3})).await.unwrap_err();
        assert!(err.to_string().contains("retries"));
        assert_eq!(tester.provider().config().timeout_secs, 3);

        assert!(tester
            .validate_provider_config(json!({"multiplier": 0.5}))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_validate_resource_config() {
        let (_, tester) = provider();
        let valid = json!({"name": "g", "retention_in_days": 7});
        tester
            .validate_resource_config(resources::LOG_GROUP, valid)
            .await
            .unwrap();

        let invalid = json!({"name": "g", "retention_in_days": 8});
        let err = tester
            .validate_resource_config(resources::LOG_GROUP, invalid)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("retention_in_days"));

        let err = tester
            .validate_resource_config("logs_nope", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::testing::TestError::Provider(ProviderError::UnknownResource(_))
        ));
    }

    #[tokio::test]
    async fn test_read_of_removed_resource_is_null() {
        let (remote, tester) = provider();
        let state = tester
            .lifecycle_create(resources::LOG_GROUP, json!({"name": "/app/gone"}))
            .await
            .unwrap();

        assert!(remote.remove(resources::LOG_GROUP, "/app/gone"));
        assert_removed(&tester.read(resources::LOG_GROUP, state).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_needing_replacement_is_refused() {
        let (_, tester) = provider();
        let state = tester
            .lifecycle_create(resources::LOG_GROUP, json!({"name": "/app/a"}))
            .await
            .unwrap();

        let err = tester
            .update(resources::LOG_GROUP, state, json!({"name": "/app/b"}))
            .await
            .unwrap_err();
        assert!(matches!(err.root(), ProviderError::FailedPrecondition(_)));
        assert!(err.to_string().contains("name"));
    }

    #[tokio::test]
    async fn test_unchanged_update_returns_prior() {
        let (remote, tester) = provider();
        let state = tester
            .lifecycle_create(
                resources::LOG_GROUP,
                json!({"name": "/app/same", "retention_in_days": 7}),
            )
            .await
            .unwrap();

        let updated = tester
            .update(resources::LOG_GROUP, state.clone(), state.clone())
            .await
            .unwrap();
        assert_eq!(updated, state);
        assert_eq!(remote.call_count("update", resources::LOG_GROUP), 0);
    }

    #[tokio::test]
    async fn test_import() {
        let (remote, tester) = provider();
        remote.insert(resources::LOG_GROUP, group("/app/imported").with("retention_in_days", 30));

        let imported = tester
            .import_resource(resources::LOG_GROUP, "/app/imported")
            .await
            .unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].resource_type, resources::LOG_GROUP);
        assert_eq!(imported[0].state["id"], "/app/imported");
        assert_eq!(imported[0].state["retention_in_days"], 30);
    }

    #[tokio::test]
    async fn test_log_group_data_source() {
        let (remote, tester) = provider();
        remote.insert(resources::LOG_GROUP, group("/app/web"));
        remote.insert(resources::LOG_GROUP, group("/app/web-2"));

        let found = tester
            .read_data_source(LOG_GROUP_DATA_SOURCE, json!({"name": "/app/web"}))
            .await
            .unwrap();
        assert_eq!(found["name"], "/app/web");
        assert!(found["arn"].as_str().unwrap().ends_with(":/app/web"));

        let err = tester
            .read_data_source(LOG_GROUP_DATA_SOURCE, json!({"name": "/app/none"}))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = tester
            .read_data_source(LOG_GROUP_DATA_SOURCE, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[tokio::test]
    async fn test_log_groups_data_source_pages() {
        let (remote, tester) = provider();
        tester.configure(json!({"page_size": 1})).await.unwrap();
        for name in ["/app/a", "/app/b", "/app/c", "/infra/d"] {
            remote.insert(resources::LOG_GROUP, group(name));
        }

        let listed = tester
            .read_data_source(LOG_GROUPS_DATA_SOURCE, json!({"name_prefix": "/app/"}))
            .await
            .unwrap();
        assert_eq!(listed["names"], json!(["/app/a", "/app/b", "/app/c"]));
        assert_eq!(listed["arns"].as_array().unwrap().len(), 3);
        assert_eq!(remote.list_calls(resources::LOG_GROUP), 3);

        let empty = tester
            .read_data_source(LOG_GROUPS_DATA_SOURCE, json!({"name_prefix": "/nothing/"}))
            .await
            .unwrap();
        assert_eq!(empty["names"], json!([]));
    }

    #[tokio::test]
    async fn test_retained_delete_keeps_remote() {
        let (remote, tester) = provider();
        let state = tester
            .lifecycle_create(
                resources::LOG_GROUP,
                json!({"name": "/app/keep", "skip_destroy": true}),
            )
            .await
            .unwrap();

        tester.lifecycle_delete(resources::LOG_GROUP, state).await.unwrap();
        assert_eq!(remote.len(resources::LOG_GROUP), 1);
        assert_eq!(remote.call_count("delete", resources::LOG_GROUP), 0);
    }

    #[tokio::test]
    async fn test_stop_cancels_new_work() {
        let (remote, tester) = provider();
        tester.stop().await.unwrap();

        let err = tester
            .create(resources::LOG_GROUP, json!({"name": "/app/late"}))
            .await
            .unwrap_err();
        assert!(matches!(err.root(), ProviderError::DeadlineExceeded(_)));
        assert_eq!(remote.mutation_count(resources::LOG_GROUP), 0);
    }

    #[tokio::test]
    async fn test_non_object_state_is_rejected() {
        let (_, tester) = provider();
        let err = tester.create(resources::LOG_GROUP, json!("x")).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_undecodable_state_id_names_the_operation() {
        let (remote, tester) = provider();
        let state = json!({"id": "no-separator"});

        let err = tester
            .read(resources::LOG_STREAM, state.clone())
            .await
            .unwrap_err();
        match &err {
            ProviderError::Operation { action, resource_type, id, .. } => {
                assert_eq!(*action, Action::Reading);
                assert_eq!(resource_type, resources::LOG_STREAM);
                assert_eq!(id, "no-separator");
            },
            other => panic!("expected operation context, got {:?}", other),
        }
        assert!(matches!(err.root(), ProviderError::Format(_)));

        let err = tester
            .delete(resources::LOG_STREAM, state)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Operation { action: Action::Deleting, .. }));
        assert_eq!(remote.call_count("list", resources::LOG_STREAM), 0);
    }
}
