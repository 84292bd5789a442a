//! Request validation stage
//!
//! Validators are registered per request type in a [`ValidatorRegistry`] at
//! start-up. For each call, every validator registered for the request's type
//! runs concurrently; the stage waits for all of them, merges their failures
//! into [`FieldErrors`] and short-circuits with a
//! [`FunctionalError::validation_failed`] when anything was reported.
//!
//! # Example
//!
//! ```rust,ignore
//! use api_pipeline::validation::{validator_fn, FieldFailure, ValidatorRegistry};
//!
//! let registry = ValidatorRegistry::new()
//!     .with::<CreateStudent, _>(validator_fn(|request: &CreateStudent| {
//!         let mut failures = Vec::new();
//!         if request.name.trim().is_empty() {
//!             failures.push(FieldFailure::new("name", "required"));
//!         }
//!         failures
//!     }));
//! ```

use std::any::{type_name, Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::RequestContext;
use crate::failure::FunctionalError;

/// A single failed rule reported by a validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFailure {
    /// Name of the offending field
    pub field: String,
    /// Caller-facing message
    pub message: String,
}

impl FieldFailure {
    /// Create a field failure
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Field name to distinct messages, in first-seen order per field
///
/// Fields are kept sorted so the serialized map is deterministic regardless
/// of which validator finished first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message for a field, ignoring exact duplicates
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        let message = message.into();
        let messages = self.0.entry(field.into()).or_default();
        if !messages.contains(&message) {
            messages.push(message);
        }
    }

    /// Whether no failure was recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of fields with at least one message
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Messages recorded for a field
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Iterate over fields and their messages
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(field, messages)| (field.as_str(), messages.as_slice()))
    }

    /// Convert into a JSON object for error details
    pub fn into_value(self) -> Value {
        let map: Map<String, Value> = self
            .0
            .into_iter()
            .map(|(field, messages)| {
                let messages = messages.into_iter().map(Value::String).collect();
                (field, Value::Array(messages))
            })
            .collect();
        Value::Object(map)
    }
}

impl FromIterator<FieldFailure> for FieldErrors {
    fn from_iter<I: IntoIterator<Item = FieldFailure>>(iter: I) -> Self {
        let mut errors = Self::new();
        for failure in iter {
            errors.add(failure.field, failure.message);
        }
        errors
    }
}

/// A rule set checked against one request type
///
/// Validators must not mutate shared state: they run concurrently with the
/// other validators of the same request.
#[async_trait]
pub trait Validator<R>: Send + Sync {
    /// Return every failed rule, or an empty vector when the request is valid
    async fn validate(&self, request: &R, ctx: &RequestContext) -> Vec<FieldFailure>;
}

/// Validator backed by a synchronous closure, built with [`validator_fn`]
#[derive(Clone)]
pub struct FnValidator<F> {
    f: F,
}

impl<F> fmt::Debug for FnValidator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnValidator")
            .field("f", &type_name::<F>())
            .finish()
    }
}

/// Wrap a closure as a [`Validator`]
pub fn validator_fn<R, F>(f: F) -> FnValidator<F>
where
    F: Fn(&R) -> Vec<FieldFailure> + Send + Sync,
{
    FnValidator { f }
}

#[async_trait]
impl<R, F> Validator<R> for FnValidator<F>
where
    R: Sync,
    F: Fn(&R) -> Vec<FieldFailure> + Send + Sync,
{
    async fn validate(&self, request: &R, _ctx: &RequestContext) -> Vec<FieldFailure> {
        (self.f)(request)
    }
}

type ValidatorList<R> = Vec<Arc<dyn Validator<R>>>;

/// Validators keyed by request type, populated at start-up
#[derive(Default)]
pub struct ValidatorRegistry {
    validators: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ValidatorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validator for request type `R`
    ///
    /// Validators of the same type run in no particular order.
    pub fn register<R, V>(&mut self, validator: V)
    where
        R: Send + Sync + 'static,
        V: Validator<R> + 'static,
    {
        let entry = self
            .validators
            .entry(TypeId::of::<R>())
            .or_insert_with(|| Box::new(ValidatorList::<R>::new()));
        if let Some(list) = entry.downcast_mut::<ValidatorList<R>>() {
            list.push(Arc::new(validator));
        }
    }

    /// Builder form of [`ValidatorRegistry::register`]
    #[must_use]
    pub fn with<R, V>(mut self, validator: V) -> Self
    where
        R: Send + Sync + 'static,
        V: Validator<R> + 'static,
    {
        self.register::<R, V>(validator);
        self
    }

    /// Validators registered for request type `R`
    pub fn validators_for<R>(&self) -> &[Arc<dyn Validator<R>>]
    where
        R: Send + Sync + 'static,
    {
        self.validators
            .get(&TypeId::of::<R>())
            .and_then(|entry| entry.downcast_ref::<ValidatorList<R>>())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Run every validator for `R` and merge their failures
    ///
    /// Returns `Ok(())` immediately when no validator is registered for `R`.
    pub async fn validate<R>(
        &self,
        request: &R,
        ctx: &RequestContext,
    ) -> Result<(), FunctionalError>
    where
        R: Send + Sync + 'static,
    {
        let validators = self.validators_for::<R>();
        if validators.is_empty() {
            return Ok(());
        }

        let reports = join_all(
            validators
                .iter()
                .map(|validator| validator.validate(request, ctx)),
        )
        .await;

        let errors: FieldErrors = reports.into_iter().flatten().collect();
        if errors.is_empty() {
            return Ok(());
        }

        tracing::debug!(
            trace_id = %ctx.trace_id(),
            request_type = type_name::<R>(),
            fields = errors.len(),
            "Request failed validation"
        );
        Err(FunctionalError::validation_failed(errors))
    }
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("request_types", &self.validators.len())
            .finish()
    }
}
