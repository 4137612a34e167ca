//! Test harnesses for the logs provider.
//!
//! - [`ProviderTester`] drives a [`ProviderService`] through plan, apply,
//!   refresh, import and destroy the way the orchestrator would.
//! - [`MemoryRemote`] is an in-memory [`RemoteService`] with paging, read
//!   lag, latency, fault injection and a journal of mutating calls.
//! - The `assert_*` helpers check plans and diagnostics.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use hemmer_provider_logs::testing::{MemoryRemote, ProviderTester};
//! use hemmer_provider_logs::LogsProvider;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let remote = Arc::new(MemoryRemote::new());
//! let tester = ProviderTester::new(LogsProvider::new(Arc::clone(&remote)));
//!
//! let state = tester
//!     .lifecycle_create("logs_log_group", json!({"name": "/app/web", "retention_in_days": 7}))
//!     .await
//!     .unwrap();
//! assert_eq!(state["id"], "/app/web");
//! assert_eq!(remote.len("logs_log_group"), 1);
//! # });
//! ```

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;

use crate::error::ProviderError;
use crate::identity::{Identity, IdentityScheme};
use crate::provider::ProviderService;
use crate::remote::{Attributes, ListFilter, Page, RemoteObject, RemoteService, UpdateRequest};
use crate::resources;
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::types::{ImportedResource, PlanResult};

/// A test harness for provider implementations.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Get the list of data source type names.
    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    /// Validate provider configuration.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(
                resource_type,
                Some(prior_state),
                proposed_state.clone(),
                proposed_state,
            )
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create a new resource.
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Refresh a resource. `Value::Null` means it no longer exists.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Read data from a data source.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .read_data_source(data_source_type, config)
            .await
    }

    /// Run a full create lifecycle: plan, create, read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read(resource_type, created).await
    }

    /// Run a full update lifecycle: plan, update, read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        let updated = self
            .update(resource_type, prior_state, plan.planned_state)
            .await?;
        self.read(resource_type, updated).await
    }

    /// Run a full delete lifecycle: plan, delete.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.plan_delete(resource_type, current_state.clone()).await?;
        self.delete(resource_type, current_state).await
    }

    /// Run create, update and delete in sequence.
    ///
    /// Returns the state after the update.
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, ProviderError> {
        let created = self.lifecycle_create(resource_type, initial_config).await?;
        let updated = self
            .lifecycle_update(resource_type, created, updated_config)
            .await?;
        self.lifecycle_delete(resource_type, updated.clone()).await?;
        Ok(updated)
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

/// Assert that a plan creates a resource.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(!plan.requires_replace, "Expected plan to create, not replace");
}

/// Assert that a plan has no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        !plan.has_changes(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan destroys the resource.
///
/// # Panics
///
/// Panics if the plan keeps a planned state.
pub fn assert_plan_destroys(plan: &PlanResult) {
    assert!(
        plan.is_destroy(),
        "Expected plan to destroy, but got planned state {}",
        plan.planned_state
    );
}

/// Assert that a plan requires replacement.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan updates in place.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(!plan.changes.is_empty(), "Expected plan to have changes");
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it requires replacement"
    );
}

/// Assert that a plan changes `path`.
///
/// # Panics
///
/// Panics if the plan does not change the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "Expected plan to change attribute '{}'. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan leaves `path` alone.
///
/// # Panics
///
/// Panics if the plan changes the given path.
pub fn assert_plan_does_not_change_attribute(plan: &PlanResult, path: &str) {
    assert!(
        !plan.changes.iter().any(|c| c.path == path),
        "Expected plan to not change attribute '{}', but it was changed",
        path
    );
}

/// Assert that a refresh found the resource gone.
///
/// # Panics
///
/// Panics if `state` is not null.
pub fn assert_removed(state: &Value) {
    assert!(state.is_null(), "Expected resource to be removed, got state {}", state);
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain an error whose summary contains `substring`.
///
/// # Panics
///
/// Panics if no error diagnostic matches.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let found = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error) && d.summary.contains(substring));

    assert!(
        found,
        "Expected an error containing '{}'. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}

/// Whether a journaled call was starting or finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The call was received.
    Start,
    /// The call completed.
    End,
}

/// One entry of the mutation journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// `create`, `put`, `update` or `delete`.
    pub op: &'static str,
    /// Resource type.
    pub resource_type: String,
    /// Encoded key of the object, or `new` when not yet known.
    pub key: String,
    /// Start or end.
    pub phase: Phase,
}

type Rewrite = Box<dyn Fn(&mut Attributes) + Send + Sync>;

struct Stored {
    key: String,
    object: RemoteObject,
    hidden_reads: u32,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<String, Vec<Stored>>,
    faults: Vec<(String, ProviderError)>,
    calls: BTreeMap<(String, String), usize>,
    journal: Vec<JournalEntry>,
    next_id: u64,
}

impl Inner {
    fn record(&mut self, op: &str, resource_type: &str) -> Result<(), ProviderError> {
        *self
            .calls
            .entry((op.to_string(), resource_type.to_string()))
            .or_default() += 1;
        match self.faults.iter().position(|(o, _)| o == op) {
            Some(i) => Err(self.faults.remove(i).1),
            None => Ok(()),
        }
    }

    fn position(&self, resource_type: &str, key: &str) -> Option<usize> {
        self.objects
            .get(resource_type)
            .and_then(|items| items.iter().position(|s| s.key == key))
    }
}

/// An in-memory remote service.
///
/// Objects are keyed by the identity scheme of their resource type; every
/// type in [`resources::catalog`] is known up front. Deleting a log group
/// also deletes the streams and filters that name it.
pub struct MemoryRemote {
    inner: Mutex<Inner>,
    schemes: BTreeMap<String, IdentityScheme>,
    cascades: Vec<(String, String, String)>,
    rewrites: BTreeMap<String, Rewrite>,
    page_size: usize,
    read_lag: u32,
    latency: Option<Duration>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    /// An empty remote that knows every catalog type.
    pub fn new() -> Self {
        let mut schemes = BTreeMap::new();
        let mut cascades = Vec::new();
        for kind in resources::catalog() {
            if let Some(field) = &kind.parent_field {
                cascades.push((
                    resources::LOG_GROUP.to_string(),
                    kind.type_name.clone(),
                    field.clone(),
                ));
            }
            schemes.insert(kind.type_name, kind.identity);
        }

        Self {
            inner: Mutex::new(Inner::default()),
            schemes,
            cascades,
            rewrites: BTreeMap::new(),
            page_size: 50,
            read_lag: 0,
            latency: None,
        }
    }

    /// Register another resource type.
    pub fn with_scheme(mut self, resource_type: impl Into<String>, scheme: IdentityScheme) -> Self {
        self.schemes.insert(resource_type.into(), scheme);
        self
    }

    /// Maximum items per list page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Hide each written object from the next `reads` lookups.
    pub fn with_read_lag(mut self, reads: u32) -> Self {
        self.read_lag = reads;
        self
    }

    /// Delay every mutating call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Transform attributes of `resource_type` as the server stores them.
    pub fn with_rewrite<F>(mut self, resource_type: impl Into<String>, rewrite: F) -> Self
    where
        F: Fn(&mut Attributes) + Send + Sync + 'static,
    {
        self.rewrites.insert(resource_type.into(), Box::new(rewrite));
        self
    }

    /// Fail the next `op` call (`create`, `put`, `read`, `update`,
    /// `delete` or `list`) with `err`. Failures queue up in order.
    pub fn fail_next(&self, op: &str, err: ProviderError) {
        self.state().faults.push((op.to_string(), err));
    }

    /// Store an object directly, bypassing call accounting.
    ///
    /// # Panics
    ///
    /// Panics if the identity cannot be derived from `object`.
    pub fn insert(&self, resource_type: &str, object: RemoteObject) {
        let key = match self.key_of(resource_type, &object.attributes) {
            Ok(key) => key,
            Err(e) => panic!("cannot insert {} object: {}", resource_type, e),
        };
        self.state()
            .objects
            .entry(resource_type.to_string())
            .or_default()
            .push(Stored {
                key,
                object,
                hidden_reads: 0,
            });
    }

    /// Look up an object by encoded key.
    pub fn get(&self, resource_type: &str, key: &str) -> Option<RemoteObject> {
        let inner = self.state();
        let i = inner.position(resource_type, key)?;
        inner.objects.get(resource_type).map(|items| items[i].object.clone())
    }

    /// Change an object out of band. Returns false if it does not exist.
    pub fn modify<F>(&self, resource_type: &str, key: &str, change: F) -> bool
    where
        F: FnOnce(&mut Attributes),
    {
        let mut inner = self.state();
        let Some(i) = inner.position(resource_type, key) else {
            return false;
        };
        match inner.objects.get_mut(resource_type) {
            Some(items) => {
                change(&mut items[i].object.attributes);
                true
            },
            None => false,
        }
    }

    /// Delete an object out of band, with cascades. Returns false if it did
    /// not exist.
    pub fn remove(&self, resource_type: &str, key: &str) -> bool {
        let mut inner = self.state();
        self.remove_locked(&mut *inner, resource_type, key)
    }

    /// Number of stored objects of `resource_type`.
    pub fn len(&self, resource_type: &str) -> usize {
        self.state().objects.get(resource_type).map_or(0, Vec::len)
    }

    /// Whether nothing of `resource_type` is stored.
    pub fn is_empty(&self, resource_type: &str) -> bool {
        self.len(resource_type) == 0
    }

    /// Number of `op` calls received for `resource_type`, including failed
    /// ones.
    pub fn call_count(&self, op: &str, resource_type: &str) -> usize {
        self.state()
            .calls
            .get(&(op.to_string(), resource_type.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Number of list calls received for `resource_type`.
    pub fn list_calls(&self, resource_type: &str) -> usize {
        self.call_count("list", resource_type)
    }

    /// Number of mutating calls received for `resource_type`.
    pub fn mutation_count(&self, resource_type: &str) -> usize {
        ["create", "put", "update", "delete"]
            .iter()
            .map(|op| self.call_count(op, resource_type))
            .sum()
    }

    /// Start and end of every mutating call, in order.
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.state().journal.clone()
    }

    fn state(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key_of(
        &self,
        resource_type: &str,
        attributes: &Attributes,
    ) -> Result<String, ProviderError> {
        let scheme = self
            .schemes
            .get(resource_type)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))?;
        Ok(scheme.derive(attributes, None)?.encode())
    }

    fn stored_form(&self, resource_type: &str, spec: &Attributes) -> Attributes {
        let mut attributes = spec.clone();
        if let Some(rewrite) = self.rewrites.get(resource_type) {
            rewrite(&mut attributes);
        }
        attributes
    }

    fn not_found(resource_type: &str, key: &str) -> ProviderError {
        ProviderError::not_found(format!("{} {} does not exist", resource_type, key))
    }

    fn remove_locked(&self, inner: &mut Inner, resource_type: &str, key: &str) -> bool {
        let Some(i) = inner.position(resource_type, key) else {
            return false;
        };
        if let Some(items) = inner.objects.get_mut(resource_type) {
            items.remove(i);
        }
        for (parent, child, field) in &self.cascades {
            if parent == resource_type {
                if let Some(items) = inner.objects.get_mut(child) {
                    items.retain(|s| s.object.get_str(field) != Some(key));
                }
            }
        }
        true
    }

    async fn mutation<T, F>(
        &self,
        op: &'static str,
        resource_type: &str,
        key: &str,
        apply: F,
    ) -> Result<T, ProviderError>
    where
        F: FnOnce(&mut Inner) -> Result<T, ProviderError>,
    {
        {
            let mut inner = self.state();
            inner.record(op, resource_type)?;
            inner.journal.push(JournalEntry {
                op,
                resource_type: resource_type.to_string(),
                key: key.to_string(),
                phase: Phase::Start,
            });
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.state();
        let result = apply(&mut *inner);
        inner.journal.push(JournalEntry {
            op,
            resource_type: resource_type.to_string(),
            key: key.to_string(),
            phase: Phase::End,
        });
        result
    }
}

#[async_trait::async_trait]
impl RemoteService for MemoryRemote {
    async fn create(
        &self,
        resource_type: &str,
        spec: &Attributes,
    ) -> Result<RemoteObject, ProviderError> {
        let label = self.key_of(resource_type, spec).unwrap_or_else(|_| "new".to_string());
        let mut attributes = self.stored_form(resource_type, spec);
        let scheme = self.schemes.get(resource_type).cloned();
        let read_lag = self.read_lag;

        self.mutation("create", resource_type, &label, |inner| {
            inner.next_id += 1;
            let serial = inner.next_id;
            let short = resource_type.trim_start_matches("logs_").replace('_', "-");

            if let Some(IdentityScheme::Opaque { field }) = &scheme {
                attributes
                    .entry(field.clone())
                    .or_insert_with(|| Value::String(format!("{}-{:06}", short, serial)));
            }
            let key = self.key_of(resource_type, &attributes)?;
            if inner.position(resource_type, &key).is_some() {
                return Err(ProviderError::AlreadyExists(format!("{} {}", resource_type, key)));
            }

            attributes.entry("arn").or_insert_with(|| {
                Value::String(format!("arn:aws:logs:us-east-1:123456789012:{}:{}", short, key))
            });
            attributes
                .entry("creation_time")
                .or_insert_with(|| Value::from(serial));

            let object = RemoteObject::new(attributes);
            inner
                .objects
                .entry(resource_type.to_string())
                .or_default()
                .push(Stored {
                    key,
                    object: object.clone(),
                    hidden_reads: read_lag,
                });
            Ok(object)
        })
        .await
    }

    async fn put(
        &self,
        resource_type: &str,
        spec: &Attributes,
    ) -> Result<RemoteObject, ProviderError> {
        let key = self.key_of(resource_type, spec)?;
        let object = RemoteObject::new(self.stored_form(resource_type, spec));
        let read_lag = self.read_lag;

        self.mutation("put", resource_type, &key, |inner| {
            let stored = Stored {
                key: key.clone(),
                object: object.clone(),
                hidden_reads: read_lag,
            };
            match inner.position(resource_type, &key) {
                Some(i) => {
                    if let Some(items) = inner.objects.get_mut(resource_type) {
                        items[i] = stored;
                    }
                },
                None => inner
                    .objects
                    .entry(resource_type.to_string())
                    .or_default()
                    .push(stored),
            }
            Ok(object)
        })
        .await
    }

    async fn read(
        &self,
        resource_type: &str,
        key: &Identity,
    ) -> Result<RemoteObject, ProviderError> {
        let key = key.encode();
        let mut inner = self.state();
        inner.record("read", resource_type)?;

        let i = inner
            .position(resource_type, &key)
            .ok_or_else(|| Self::not_found(resource_type, &key))?;
        let stored = inner
            .objects
            .get_mut(resource_type)
            .map(|items| &mut items[i])
            .ok_or_else(|| Self::not_found(resource_type, &key))?;
        if stored.hidden_reads > 0 {
            stored.hidden_reads -= 1;
            return Err(Self::not_found(resource_type, &key));
        }
        Ok(stored.object.clone())
    }

    async fn update(
        &self,
        resource_type: &str,
        key: &Identity,
        request: &UpdateRequest,
    ) -> Result<RemoteObject, ProviderError> {
        let key = key.encode();
        let changed = self.stored_form(resource_type, &request.spec);

        self.mutation("update", resource_type, &key, |inner| {
            let i = inner
                .position(resource_type, &key)
                .ok_or_else(|| Self::not_found(resource_type, &key))?;
            let stored = inner
                .objects
                .get_mut(resource_type)
                .map(|items| &mut items[i])
                .ok_or_else(|| Self::not_found(resource_type, &key))?;

            for name in &request.changed {
                match changed.get(name) {
                    Some(value) => {
                        stored.object.attributes.insert(name.clone(), value.clone());
                    },
                    None => {
                        stored.object.attributes.remove(name);
                    },
                }
            }
            Ok(stored.object.clone())
        })
        .await
    }

    async fn delete(&self, resource_type: &str, key: &Identity) -> Result<(), ProviderError> {
        let key = key.encode();
        self.mutation("delete", resource_type, &key, |inner| {
            if self.remove_locked(inner, resource_type, &key) {
                Ok(())
            } else {
                Err(Self::not_found(resource_type, &key))
            }
        })
        .await
    }

    async fn list(
        &self,
        resource_type: &str,
        filter: &ListFilter,
        page_token: Option<&str>,
    ) -> Result<Page, ProviderError> {
        let offset = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| ProviderError::InvalidRequest(format!("bad page token {:?}", token)))?,
            None => 0,
        };
        let size = filter.limit.unwrap_or(self.page_size).clamp(1, self.page_size);

        let mut inner = self.state();
        inner.record("list", resource_type)?;

        let mut visible = Vec::new();
        if let Some(items) = inner.objects.get_mut(resource_type) {
            for stored in items.iter_mut().filter(|s| filter.matches(&s.object)) {
                if stored.hidden_reads > 0 {
                    stored.hidden_reads -= 1;
                } else {
                    visible.push(stored.object.clone());
                }
            }
        }

        let end = (offset + size).min(visible.len());
        let items = visible.get(offset..end).map(<[RemoteObject]>::to_vec).unwrap_or_default();
        let next_token = (end < visible.len()).then(|| end.to_string());
        Ok(Page { items, next_token })
    }
}
