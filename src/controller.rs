//! The resource lifecycle controller.
//!
//! A [`ResourceController`] drives one [`ResourceKind`] through its
//! lifecycle against a [`RemoteService`]:
//!
//! ```text
//! Absent --create/put--> Present --read--> Present | Removed
//!                        Present --update--> Present | ReplacementRequired
//!                        Present --delete--> Absent | Retained
//! ```
//!
//! Every write is followed by a read-back so the returned state mirrors what
//! the remote service persisted. A write whose read-back fails is reported as
//! [`ProviderError::Tainted`]: the object exists but its state is unverified.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::error::{Action, ProviderError};
use crate::finder::{Finder, Lookup};
use crate::identity::{Identity, IdentityScheme};
use crate::mutex::{KeyGuard, MutexKv};
use crate::normalizer::{self, ExposurePolicy, NormalizeOptions};
use crate::remote::{Attributes, ListFilter, RemoteObject, RemoteService, UpdateRequest};
use crate::retry::{retry_mutation, retry_while, OperationContext, RetryOptions};
use crate::schema::Schema;
use crate::types::{AttributeChange, PlanResult};
use crate::validation;

/// The attribute holding the encoded identity in persisted state.
pub const ID_ATTRIBUTE: &str = "id";

/// How desired state is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// One idempotent call creates or replaces the object.
    Upsert,
    /// Separate create and in-place update calls.
    #[default]
    CreateUpdate,
}

/// Read-after-write behavior of the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Consistency {
    /// A successful write is immediately visible.
    #[default]
    Strong,
    /// A successful write may briefly read as not found.
    Eventual,
}

/// An attribute holding a JSON document compared by equivalence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentField {
    /// Attribute name.
    pub name: String,
    /// Normalization rules for this document.
    pub options: NormalizeOptions,
    /// Which representation to keep in state.
    pub exposure: ExposurePolicy,
}

impl DocumentField {
    /// A document with default normalization that prefers the remote form.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: NormalizeOptions::default(),
            exposure: ExposurePolicy::default(),
        }
    }

    /// Set the normalization rules.
    pub fn with_options(mut self, options: NormalizeOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the exposure policy.
    pub fn with_exposure(mut self, exposure: ExposurePolicy) -> Self {
        self.exposure = exposure;
        self
    }

    /// Whether two documents mean the same thing.
    ///
    /// Under [`ExposurePolicy::RemoteDropsEmptyObjects`], empty objects are
    /// ignored on both sides.
    pub fn equivalent(&self, a: &str, b: &str) -> bool {
        if normalizer::are_equivalent_with(a, b, &self.options) {
            return true;
        }
        if self.exposure != ExposurePolicy::RemoteDropsEmptyObjects {
            return false;
        }
        match (serde_json::from_str::<Value>(a), serde_json::from_str::<Value>(b)) {
            (Ok(a), Ok(b)) => normalizer::are_equivalent_with(
                &normalizer::strip_empty_objects(a).to_string(),
                &normalizer::strip_empty_objects(b).to_string(),
                &self.options,
            ),
            _ => false,
        }
    }
}

/// Attributes updated together by one remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateGroup {
    /// Group name, passed to the remote service.
    pub name: String,
    /// Attributes in the group.
    pub attributes: Vec<String>,
}

/// Extra checks on a desired spec beyond its schema.
pub type SpecCheck = fn(&Attributes) -> Result<(), ProviderError>;

/// Everything the controller needs to know about one resource type.
#[derive(Debug, Clone)]
pub struct ResourceKind {
    /// Resource type name, e.g. `logs_log_group`.
    pub type_name: String,
    /// Attribute schema.
    pub schema: Schema,
    /// Identity scheme.
    pub identity: IdentityScheme,
    /// Write mode.
    pub write_mode: WriteMode,
    /// How objects are located.
    pub lookup: Lookup,
    /// Read-after-write behavior.
    pub consistency: Consistency,
    /// Attribute naming the shared parent whose lock serializes mutations.
    pub parent_field: Option<String>,
    /// Document attributes.
    pub documents: Vec<DocumentField>,
    /// In-place update groups. Changed attributes outside every group are
    /// sent in one ungrouped update.
    pub update_groups: Vec<UpdateGroup>,
    /// Boolean attribute that, when true, keeps the remote object on delete.
    pub retain_field: Option<String>,
    /// Whether existing objects can be imported.
    pub importable: bool,
    /// Typed checks run after schema validation.
    pub check: Option<SpecCheck>,
}

impl ResourceKind {
    /// A create/update kind with direct lookup and strong consistency.
    pub fn new(type_name: impl Into<String>, schema: Schema, identity: IdentityScheme) -> Self {
        Self {
            type_name: type_name.into(),
            schema,
            identity,
            write_mode: WriteMode::default(),
            lookup: Lookup::default(),
            consistency: Consistency::default(),
            parent_field: None,
            documents: Vec::new(),
            update_groups: Vec::new(),
            retain_field: None,
            importable: true,
            check: None,
        }
    }

    /// Set the write mode.
    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Set the lookup.
    pub fn with_lookup(mut self, lookup: Lookup) -> Self {
        self.lookup = lookup;
        self
    }

    /// Mark writes as eventually consistent.
    pub fn eventually_consistent(mut self) -> Self {
        self.consistency = Consistency::Eventual;
        self
    }

    /// Serialize mutations on the value of `field`.
    pub fn with_parent(mut self, field: impl Into<String>) -> Self {
        self.parent_field = Some(field.into());
        self
    }

    /// Declare a document attribute.
    pub fn with_document(mut self, document: DocumentField) -> Self {
        self.documents.push(document);
        self
    }

    /// Declare an update group.
    pub fn with_update_group<I, S>(mut self, name: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_groups.push(UpdateGroup {
            name: name.into(),
            attributes: attributes.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Keep the remote object on delete when `field` is true.
    pub fn with_retain_field(mut self, field: impl Into<String>) -> Self {
        self.retain_field = Some(field.into());
        self
    }

    /// Reject import.
    pub fn not_importable(mut self) -> Self {
        self.importable = false;
        self
    }

    /// Run `check` after schema validation.
    pub fn with_check(mut self, check: SpecCheck) -> Self {
        self.check = Some(check);
        self
    }

    fn document(&self, name: &str) -> Option<&DocumentField> {
        self.documents.iter().find(|d| d.name == name)
    }

    fn is_local_only(&self, name: &str) -> bool {
        self.retain_field.as_deref() == Some(name)
    }

    fn is_configurable(&self, name: &str) -> bool {
        name != ID_ATTRIBUTE && !self.schema.is_computed_only(name)
    }

    fn retains(&self, state: &Attributes) -> bool {
        self.retain_field
            .as_deref()
            .and_then(|f| state.get(f))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Validate a desired spec against the schema and typed checks.
    pub fn validate(&self, spec: &Attributes) -> Result<(), ProviderError> {
        validation::validate_spec(&self.schema, &Value::Object(spec.clone()))?;
        match self.check {
            Some(check) => check(spec),
            None => Ok(()),
        }
    }

    /// Compare one attribute, treating null and absent alike and documents
    /// by equivalence.
    pub fn values_equal(&self, name: &str, a: Option<&Value>, b: Option<&Value>) -> bool {
        let a = a.filter(|v| !v.is_null());
        let b = b.filter(|v| !v.is_null());
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => match (self.document(name), a.as_str(), b.as_str()) {
                (Some(doc), Some(a), Some(b)) => doc.equivalent(a, b),
                _ => a == b,
            },
            _ => false,
        }
    }

    /// Configurable attributes that differ between `old` and `new`.
    ///
    /// Optional-computed attributes left unset in `new` keep their prior
    /// value and are not changes.
    pub fn diff(&self, old: &Attributes, new: &Attributes) -> Vec<String> {
        self.schema
            .attributes
            .iter()
            .filter(|(name, _)| self.is_configurable(name))
            .filter(|(name, attr)| {
                let proposed = new.get(name.as_str()).filter(|v| !v.is_null());
                !(attr.flags.computed && proposed.is_none())
            })
            .filter(|(name, _)| {
                !self.values_equal(name, old.get(name.as_str()), new.get(name.as_str()))
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Attributes whose remote value no longer matches `prior`.
    ///
    /// Attributes unset in `prior` are left to the server.
    pub fn drift(&self, prior: &Attributes, object: &RemoteObject) -> Vec<String> {
        self.schema
            .attributes
            .keys()
            .filter(|name| self.is_configurable(name) && !self.is_local_only(name))
            .filter(|name| prior.get(name.as_str()).is_some_and(|v| !v.is_null()))
            .filter(|name| !self.values_equal(name, prior.get(name.as_str()), object.get(name)))
            .cloned()
            .collect()
    }

    /// The attributes sent to the remote service for `spec`.
    pub fn remote_spec(&self, spec: &Attributes) -> Attributes {
        spec.iter()
            .filter(|(name, value)| {
                !value.is_null()
                    && self.schema.attribute(name).is_some()
                    && self.is_configurable(name)
                    && !self.is_local_only(name)
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Build persisted state from the desired spec and the observed object.
    pub fn state(
        &self,
        identity: &Identity,
        desired: &Attributes,
        object: &RemoteObject,
    ) -> Attributes {
        let mut state = Map::new();
        for name in self.schema.attributes.keys() {
            let value = if self.is_local_only(name) {
                desired.get(name).cloned()
            } else if let Some(doc) = self.document(name) {
                let local = desired.get(name).and_then(Value::as_str);
                object.get_str(name).map(|remote| {
                    Value::String(match local {
                        Some(local) => normalizer::choose_canonical_for_exposure(
                            local,
                            remote,
                            &doc.options,
                            doc.exposure,
                        ),
                        None => normalizer::normalize_with(remote, &doc.options)
                            .map(|d| d.into_string())
                            .unwrap_or_else(|_| remote.to_string()),
                    })
                })
            } else {
                object.get(name).cloned()
            };

            if let Some(value) = value.filter(|v| !v.is_null()) {
                state.insert(name.clone(), value);
            }
        }
        state.insert(ID_ATTRIBUTE.to_string(), Value::String(identity.encode()));
        state
    }

    /// Split changed attributes into one update request per group.
    pub fn update_requests(&self, changed: &[String], spec: &Attributes) -> Vec<UpdateRequest> {
        let mut requests = Vec::new();
        let mut leftover: Vec<String> = changed.to_vec();

        for group in &self.update_groups {
            let touched: Vec<String> = changed
                .iter()
                .filter(|c| group.attributes.contains(c))
                .cloned()
                .collect();
            if touched.is_empty() {
                continue;
            }
            leftover.retain(|c| !touched.contains(c));
            requests.push(UpdateRequest {
                group: Some(group.name.clone()),
                changed: touched,
                spec: spec.clone(),
            });
        }

        if !leftover.is_empty() {
            requests.push(UpdateRequest {
                group: None,
                changed: leftover,
                spec: spec.clone(),
            });
        }
        requests
    }

    /// The encoded identity stored in `state`, or one derived from it.
    pub fn identity_of(&self, state: &Attributes) -> Result<Identity, ProviderError> {
        match state.get(ID_ATTRIBUTE).and_then(Value::as_str) {
            Some(id) if !id.is_empty() => self.identity.decode(id),
            _ => self.identity.derive(state, None),
        }
    }
}

/// A write that was applied and read back.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// Identity of the object.
    pub identity: Identity,
    /// The object as read back.
    pub object: RemoteObject,
    /// State to persist.
    pub state: Attributes,
}

impl Applied {
    /// Persisted state as a JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.state)
    }
}

/// Result of refreshing a resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// The object exists.
    Present {
        /// The object as read.
        object: RemoteObject,
        /// Refreshed state.
        state: Attributes,
        /// Attributes that drifted from the prior state.
        drifted: Vec<String>,
    },
    /// The object is gone; drop it from state.
    Removed,
}

/// Result of an update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Nothing to do; no remote call was made.
    Unchanged,
    /// Updated in place.
    Updated(Applied),
    /// A force-new attribute changed; the orchestrator must replace.
    ReplacementRequired {
        /// The force-new attributes that changed.
        attributes: Vec<String>,
    },
}

/// Result of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The remote object was deleted.
    Deleted,
    /// The remote object was already gone.
    AlreadyAbsent,
    /// The remote object was kept; only state is dropped.
    Retained,
}

/// Drives one resource kind against a remote service.
pub struct ResourceController<R: ?Sized> {
    remote: Arc<R>,
    kind: Arc<ResourceKind>,
    retry: RetryOptions,
    page_size: Option<usize>,
    locks: &'static MutexKv,
}

impl<R: ?Sized> Clone for ResourceController<R> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            kind: Arc::clone(&self.kind),
            retry: self.retry.clone(),
            page_size: self.page_size,
            locks: self.locks,
        }
    }
}

fn is_throttled(err: &ProviderError) -> bool {
    matches!(
        err.root(),
        ProviderError::Throttled(_) | ProviderError::ResourceExhausted(_)
    )
}

impl<R: RemoteService + ?Sized> ResourceController<R> {
    /// Create a controller with default retry options.
    pub fn new(remote: Arc<R>, kind: Arc<ResourceKind>) -> Self {
        Self {
            remote,
            kind,
            retry: RetryOptions::default(),
            page_size: None,
            locks: MutexKv::global(),
        }
    }

    /// Set retry options.
    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    /// Bound list page sizes.
    pub fn with_page_size(mut self, page_size: Option<usize>) -> Self {
        self.page_size = page_size;
        self
    }

    /// The managed kind.
    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    fn type_name(&self) -> &str {
        &self.kind.type_name
    }

    fn finder(&self) -> Finder<'_, R> {
        Finder::new(
            self.remote.as_ref(),
            &self.kind.type_name,
            &self.kind.identity,
            &self.kind.lookup,
        )
        .with_page_size(self.page_size)
    }

    fn label(&self, spec: &Attributes) -> String {
        self.kind
            .identity
            .derive(spec, None)
            .map(|i| i.encode())
            .unwrap_or_else(|_| "new".to_string())
    }

    async fn lock_key(&self, key: Option<&str>) -> Option<KeyGuard> {
        match key {
            Some(key) => Some(self.locks.lock(key).await),
            None => None,
        }
    }

    async fn lock_spec(&self, spec: &Attributes) -> Option<KeyGuard> {
        let key = self
            .kind
            .parent_field
            .as_deref()
            .and_then(|f| spec.get(f))
            .and_then(Value::as_str);
        self.lock_key(key).await
    }

    async fn lock_identity(&self, identity: &Identity) -> Result<Option<KeyGuard>, ProviderError> {
        let Some(field) = self.kind.parent_field.as_deref() else {
            return Ok(None);
        };
        let fields = self.kind.identity.fields(identity)?;
        let key = fields.iter().find(|(name, _)| name == field).map(|(_, v)| v.as_str());
        Ok(self.lock_key(key).await)
    }

    async fn find(
        &self,
        ctx: &OperationContext,
        identity: &Identity,
        retry_not_found: bool,
    ) -> Result<RemoteObject, ProviderError> {
        let finder = &self.finder();
        retry_while(
            ctx,
            &self.retry,
            "read",
            |e| e.is_retryable() || (retry_not_found && e.is_not_found()),
            move || finder.find_by_key(identity),
        )
        .await
    }

    async fn read_back(
        &self,
        ctx: &OperationContext,
        identity: &Identity,
        desired: &Attributes,
    ) -> Result<Applied, ProviderError> {
        let eventual = self.kind.consistency == Consistency::Eventual;
        match self.find(ctx, identity, eventual).await {
            Ok(object) => Ok(Applied {
                identity: identity.clone(),
                state: self.kind.state(identity, desired, &object),
                object,
            }),
            Err(err) => {
                warn!(id = %identity, error = %err, "read-back failed, marking tainted");
                Err(ProviderError::Tainted {
                    identity: identity.encode(),
                    source: Box::new(err),
                })
            },
        }
    }

    /// Write `spec` with one idempotent call and read it back.
    #[instrument(name = "controller.put", skip_all, fields(resource_type = %self.kind.type_name))]
    pub async fn put(
        &self,
        ctx: &OperationContext,
        spec: &Attributes,
    ) -> Result<Applied, ProviderError> {
        self.put_inner(ctx, spec)
            .await
            .map_err(|e| e.context(Action::Creating, self.type_name(), self.label(spec)))
    }

    async fn put_inner(
        &self,
        ctx: &OperationContext,
        spec: &Attributes,
    ) -> Result<Applied, ProviderError> {
        self.kind.validate(spec)?;
        let identity = self.kind.identity.derive(spec, None)?;
        let body = &self.kind.remote_spec(spec);

        let _guard = self.lock_spec(spec).await;
        let remote = self.remote.as_ref();
        let type_name = self.type_name();
        retry_mutation(ctx, &self.retry, "put", ProviderError::is_retryable, move || {
            remote.put(type_name, body)
        })
        .await?;
        info!(id = %identity, "put {}", type_name);

        self.read_back(ctx, &identity, spec).await
    }

    /// Create a new object from `spec` and read it back.
    ///
    /// Upsert kinds are written with [`ResourceController::put`].
    #[instrument(
        name = "controller.create",
        skip_all,
        fields(resource_type = %self.kind.type_name)
    )]
    pub async fn create(
        &self,
        ctx: &OperationContext,
        spec: &Attributes,
    ) -> Result<Applied, ProviderError> {
        if self.kind.write_mode == WriteMode::Upsert {
            return self.put(ctx, spec).await;
        }
        self.create_inner(ctx, spec)
            .await
            .map_err(|e| e.context(Action::Creating, self.type_name(), self.label(spec)))
    }

    async fn create_inner(
        &self,
        ctx: &OperationContext,
        spec: &Attributes,
    ) -> Result<Applied, ProviderError> {
        self.kind.validate(spec)?;
        let body = &self.kind.remote_spec(spec);

        let _guard = self.lock_spec(spec).await;
        let remote = self.remote.as_ref();
        let type_name = self.type_name();
        let created = retry_mutation(ctx, &self.retry, "create", is_throttled, move || {
            remote.create(type_name, body)
        })
        .await?;

        let identity = self
            .kind
            .identity
            .derive(spec, Some(&created.attributes))
            .map_err(|e| {
                ProviderError::UnknownState(format!(
                    "{} was created but its identity could not be determined: {}",
                    type_name, e
                ))
            })?;
        info!(id = %identity, "created {}", type_name);

        self.read_back(ctx, &identity, spec).await
    }

    /// Refresh the object behind `identity`.
    ///
    /// A missing object is [`ReadOutcome::Removed`], not an error. Drift is
    /// reported against `prior`.
    #[instrument(
        name = "controller.read",
        skip_all,
        fields(resource_type = %self.kind.type_name, id = %identity)
    )]
    pub async fn read(
        &self,
        ctx: &OperationContext,
        identity: &Identity,
        prior: &Attributes,
    ) -> Result<ReadOutcome, ProviderError> {
        match self.find(ctx, identity, false).await {
            Ok(object) => {
                let drifted = self.kind.drift(prior, &object);
                if !drifted.is_empty() {
                    info!(?drifted, "drift detected");
                }
                let state = self.kind.state(identity, prior, &object);
                Ok(ReadOutcome::Present {
                    object,
                    state,
                    drifted,
                })
            },
            Err(err) if err.is_not_found() => {
                warn!(error = %err, "{} not found, removing from state", self.type_name());
                Ok(ReadOutcome::Removed)
            },
            Err(err) => Err(err.context(Action::Reading, self.type_name(), identity.encode())),
        }
    }

    /// Converge the object behind `identity` from `old` to `new`.
    #[instrument(
        name = "controller.update",
        skip_all,
        fields(resource_type = %self.kind.type_name, id = %identity)
    )]
    pub async fn update(
        &self,
        ctx: &OperationContext,
        identity: &Identity,
        new: &Attributes,
        old: &Attributes,
    ) -> Result<UpdateOutcome, ProviderError> {
        self.update_inner(ctx, identity, new, old)
            .await
            .map_err(|e| e.context(Action::Updating, self.type_name(), identity.encode()))
    }

    async fn update_inner(
        &self,
        ctx: &OperationContext,
        identity: &Identity,
        new: &Attributes,
        old: &Attributes,
    ) -> Result<UpdateOutcome, ProviderError> {
        self.kind.validate(new)?;

        let changed = self.kind.diff(old, new);
        if changed.is_empty() {
            debug!("no changes");
            return Ok(UpdateOutcome::Unchanged);
        }

        let replace: Vec<String> = changed
            .iter()
            .filter(|name| self.kind.schema.is_force_new(name))
            .cloned()
            .collect();
        if !replace.is_empty() {
            info!(attributes = ?replace, "replacement required");
            return Ok(UpdateOutcome::ReplacementRequired {
                attributes: replace,
            });
        }

        let remote_changed: Vec<String> = changed
            .into_iter()
            .filter(|name| !self.kind.is_local_only(name))
            .collect();
        if remote_changed.is_empty() {
            let object = self.find(ctx, identity, false).await?;
            return Ok(UpdateOutcome::Updated(Applied {
                identity: identity.clone(),
                state: self.kind.state(identity, new, &object),
                object,
            }));
        }

        let body = &self.kind.remote_spec(new);
        let _guard = self.lock_identity(identity).await?;
        let remote = self.remote.as_ref();
        let type_name = self.type_name();

        match self.kind.write_mode {
            WriteMode::Upsert => {
                retry_mutation(ctx, &self.retry, "put", ProviderError::is_retryable, move || {
                    remote.put(type_name, body)
                })
                .await?;
            },
            WriteMode::CreateUpdate => {
                for request in &self.kind.update_requests(&remote_changed, body) {
                    debug!(group = ?request.group, changed = ?request.changed, "updating");
                    retry_mutation(
                        ctx,
                        &self.retry,
                        "update",
                        ProviderError::is_retryable,
                        move || remote.update(type_name, identity, request),
                    )
                    .await?;
                }
            },
        }
        info!(changed = ?remote_changed, "updated {}", type_name);

        self.read_back(ctx, identity, new).await.map(UpdateOutcome::Updated)
    }

    /// Delete the object behind `identity`.
    ///
    /// An object that is already gone counts as deleted. When `state` sets
    /// the kind's retain flag, the remote object is kept.
    #[instrument(
        name = "controller.delete",
        skip_all,
        fields(resource_type = %self.kind.type_name, id = %identity)
    )]
    pub async fn delete(
        &self,
        ctx: &OperationContext,
        identity: &Identity,
        state: &Attributes,
    ) -> Result<DeleteOutcome, ProviderError> {
        if self.kind.retains(state) {
            info!("retaining {} on destroy, removing from state only", self.type_name());
            return Ok(DeleteOutcome::Retained);
        }

        let remote = self.remote.as_ref();
        let type_name = self.type_name();
        let result = async {
            let _guard = self.lock_identity(identity).await?;
            retry_mutation(ctx, &self.retry, "delete", ProviderError::is_retryable, move || {
                remote.delete(type_name, identity)
            })
            .await
        }
        .await;

        match result {
            Ok(()) => {
                info!("deleted {}", type_name);
                Ok(DeleteOutcome::Deleted)
            },
            Err(err) if err.is_not_found() => {
                debug!(error = %err, "already deleted");
                Ok(DeleteOutcome::AlreadyAbsent)
            },
            Err(err) => Err(err.context(Action::Deleting, type_name, identity.encode())),
        }
    }

    /// Adopt an existing object by its external id.
    ///
    /// The id is validated before any remote call.
    #[instrument(
        name = "controller.import",
        skip_all,
        fields(resource_type = %self.kind.type_name, id = raw)
    )]
    pub async fn import(
        &self,
        ctx: &OperationContext,
        raw: &str,
    ) -> Result<Applied, ProviderError> {
        self.import_inner(ctx, raw)
            .await
            .map_err(|e| e.context(Action::Importing, self.type_name(), raw))
    }

    async fn import_inner(
        &self,
        ctx: &OperationContext,
        raw: &str,
    ) -> Result<Applied, ProviderError> {
        if !self.kind.importable {
            return Err(ProviderError::Unimplemented(format!(
                "{} does not support import",
                self.type_name()
            )));
        }

        let identity = self.kind.identity.decode(raw)?;
        let object = self.find(ctx, &identity, false).await?;

        let mut seed = object.attributes.clone();
        for (name, value) in self.kind.identity.fields(&identity)? {
            seed.insert(name, Value::String(value));
        }
        info!("imported {}", self.type_name());

        Ok(Applied {
            state: self.kind.state(&identity, &seed, &object),
            identity,
            object,
        })
    }

    /// Enumerate objects matching `filter`.
    #[instrument(name = "controller.list", skip_all, fields(resource_type = %self.kind.type_name))]
    pub async fn list(
        &self,
        ctx: &OperationContext,
        filter: &ListFilter,
    ) -> Result<Vec<RemoteObject>, ProviderError> {
        let finder = &self.finder();
        retry_while(ctx, &self.retry, "list", ProviderError::is_retryable, move || {
            finder.find_all(filter.clone())
        })
        .await
        .map_err(|e| e.context(Action::Listing, self.type_name(), "*"))
    }

    /// Compute the change set between `prior` and `proposed` state.
    ///
    /// `prior = None` plans a create; `proposed = None` plans a destroy.
    pub fn plan(
        &self,
        prior: Option<&Attributes>,
        proposed: Option<&Attributes>,
    ) -> Result<PlanResult, ProviderError> {
        let kind = &self.kind;
        match (prior, proposed) {
            (prior, None) => {
                let changes = prior
                    .into_iter()
                    .flatten()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(name, value)| AttributeChange::removed(name.as_str(), value.clone()))
                    .collect();
                Ok(PlanResult::with_changes(Value::Null, changes, false))
            },
            (None, Some(proposed)) => {
                kind.validate(proposed)?;
                let mut planned = proposed.clone();
                if kind.identity.derivable_from_spec() {
                    planned.insert(
                        ID_ATTRIBUTE.to_string(),
                        Value::String(kind.identity.derive(proposed, None)?.encode()),
                    );
                }
                let changes = planned
                    .iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(name, value)| AttributeChange::added(name.as_str(), value.clone()))
                    .collect();
                Ok(PlanResult::with_changes(Value::Object(planned), changes, false))
            },
            (Some(prior), Some(proposed)) => {
                kind.validate(proposed)?;
                let changed = kind.diff(prior, proposed);
                let requires_replace = changed.iter().any(|name| kind.schema.is_force_new(name));

                let mut planned = proposed.clone();
                for (name, attr) in &kind.schema.attributes {
                    let unset = planned.get(name).map_or(true, Value::is_null);
                    if attr.flags.computed && unset && !requires_replace {
                        if let Some(value) = prior.get(name) {
                            planned.insert(name.clone(), value.clone());
                        }
                    }
                }
                if requires_replace && kind.identity.derivable_from_spec() {
                    planned.insert(
                        ID_ATTRIBUTE.to_string(),
                        Value::String(kind.identity.derive(proposed, None)?.encode()),
                    );
                }

                let changes = changed
                    .iter()
                    .map(|name| {
                        let before = prior.get(name).filter(|v| !v.is_null()).cloned();
                        let after = proposed.get(name).filter(|v| !v.is_null()).cloned();
                        AttributeChange::new(name.as_str(), before, after)
                    })
                    .collect();
                Ok(PlanResult::with_changes(Value::Object(planned), changes, requires_replace))
            },
        }
    }
}
