//! Dispatch pipeline
//!
//! A [`Dispatcher`] routes each request to the single [`Handler`] registered
//! for its type. Before the handler runs, the request passes through a fixed
//! chain of [`Behavior`]s:
//!
//! 1. [`TracingBehavior`] logs entry, outcome and elapsed time
//! 2. [`ValidationBehavior`] runs every validator registered for the type
//! 3. the handler
//!
//! Each behavior receives the rest of the chain as a [`Next`] and may stop the
//! call by returning an error instead of running it.
//!
//! # Example
//!
//! ```rust,ignore
//! let dispatcher = Dispatcher::builder()
//!     .handler::<GetStudent, _>(GetStudentHandler::new(repo))?
//!     .validator::<GetStudent, _>(validator_fn(|r: &GetStudent| check_id(r.id)))
//!     .build();
//!
//! let student = dispatcher.dispatch(GetStudent { id: 7 }, &ctx).await?;
//! ```

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::envelope::IntoReply;
use crate::error::{Error, Result};
use crate::failure::PipelineError;
use crate::validation::{Validator, ValidatorRegistry};

/// Result of one pipeline call
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// A message routed to exactly one handler
pub trait Request: Send + Sync + 'static {
    /// What the handler produces on success
    type Response: IntoReply + Send + 'static;
}

/// Business logic for one request type
#[async_trait]
pub trait Handler<R: Request>: Send + Sync + 'static {
    /// Handle the request
    async fn handle(&self, request: R, ctx: &RequestContext) -> PipelineResult<R::Response>;
}

/// Handler backed by an async closure, built with [`handler_fn`]
#[derive(Clone)]
pub struct FnHandler<F> {
    f: F,
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler")
            .field("f", &type_name::<F>())
            .finish()
    }
}

/// Wrap an async closure as a [`Handler`]
///
/// The closure receives an owned clone of the context.
pub fn handler_fn<R, F, Fut>(f: F) -> FnHandler<F>
where
    R: Request,
    F: Fn(R, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = PipelineResult<R::Response>> + Send,
{
    FnHandler { f }
}

#[async_trait]
impl<R, F, Fut> Handler<R> for FnHandler<F>
where
    R: Request,
    F: Fn(R, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = PipelineResult<R::Response>> + Send,
{
    async fn handle(&self, request: R, ctx: &RequestContext) -> PipelineResult<R::Response> {
        (self.f)(request, ctx.clone()).await
    }
}

/// A stage wrapped around the handler
#[async_trait]
pub trait Behavior<R: Request>: Send + Sync {
    /// Run this stage; call `next.run` to continue the chain
    async fn handle(
        &self,
        request: R,
        ctx: &RequestContext,
        next: Next<'_, R>,
    ) -> PipelineResult<R::Response>;
}

/// Remainder of the chain after the current behavior
pub struct Next<'a, R: Request> {
    behaviors: &'a [&'a dyn Behavior<R>],
    handler: &'a dyn Handler<R>,
}

impl<'a, R: Request> Next<'a, R> {
    /// Chain made of `behaviors`, in order, ending at `handler`
    pub fn new(behaviors: &'a [&'a dyn Behavior<R>], handler: &'a dyn Handler<R>) -> Self {
        Self { behaviors, handler }
    }

    /// Run the next behavior, or the handler when none is left
    pub async fn run(self, request: R, ctx: &RequestContext) -> PipelineResult<R::Response> {
        match self.behaviors.split_first() {
            Some((behavior, rest)) => {
                behavior
                    .handle(request, ctx, Next::new(rest, self.handler))
                    .await
            }
            None => self.handler.handle(request, ctx).await,
        }
    }
}

/// Logs every dispatch with its trace ID, outcome and elapsed time
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingBehavior;

#[async_trait]
impl<R: Request> Behavior<R> for TracingBehavior {
    async fn handle(
        &self,
        request: R,
        ctx: &RequestContext,
        next: Next<'_, R>,
    ) -> PipelineResult<R::Response> {
        let request_type = type_name::<R>();
        let started = Instant::now();
        tracing::debug!(trace_id = %ctx.trace_id(), request_type, "Dispatching request");

        let result = next.run(request, ctx).await;

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match &result {
            Ok(_) => tracing::debug!(
                trace_id = %ctx.trace_id(),
                request_type,
                elapsed_ms,
                "Request handled"
            ),
            Err(err) => tracing::debug!(
                trace_id = %ctx.trace_id(),
                request_type,
                elapsed_ms,
                functional = err.is_functional(),
                "Request failed"
            ),
        }
        result
    }
}

/// Runs the registered validators and stops the call on any failure
#[derive(Debug, Clone, Default)]
pub struct ValidationBehavior {
    registry: Arc<ValidatorRegistry>,
}

impl ValidationBehavior {
    /// Create the stage over a validator registry
    pub fn new(registry: Arc<ValidatorRegistry>) -> Self {
        Self { registry }
    }

    /// The underlying registry
    pub fn registry(&self) -> &ValidatorRegistry {
        &self.registry
    }
}

#[async_trait]
impl<R: Request> Behavior<R> for ValidationBehavior {
    async fn handle(
        &self,
        request: R,
        ctx: &RequestContext,
        next: Next<'_, R>,
    ) -> PipelineResult<R::Response> {
        self.registry.validate(&request, ctx).await?;
        next.run(request, ctx).await
    }
}

/// One handler per request type, populated at start-up
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for request type `R`
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateHandler`] if `R` already has a handler.
    pub fn register<R, H>(&mut self, handler: H) -> Result<()>
    where
        R: Request,
        H: Handler<R>,
    {
        let key = TypeId::of::<R>();
        if self.handlers.contains_key(&key) {
            return Err(Error::DuplicateHandler {
                request_type: type_name::<R>(),
            });
        }

        let handler: Arc<dyn Handler<R>> = Arc::new(handler);
        self.handlers.insert(key, Box::new(handler));
        Ok(())
    }

    /// Handler registered for `R`
    pub fn get<R: Request>(&self) -> Option<&dyn Handler<R>> {
        self.handlers
            .get(&TypeId::of::<R>())
            .and_then(|entry| entry.downcast_ref::<Arc<dyn Handler<R>>>())
            .map(|handler| handler.as_ref())
    }

    /// Whether `R` has a handler
    pub fn contains<R: Request>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<R>())
    }

    /// Number of registered request types
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("request_types", &self.handlers.len())
            .finish()
    }
}

/// Routes requests through the behavior chain to their handler
///
/// Immutable once built; share it behind an `Arc`.
#[derive(Debug)]
pub struct Dispatcher {
    handlers: HandlerRegistry,
    tracing: TracingBehavior,
    validation: ValidationBehavior,
}

impl Dispatcher {
    /// Start building a dispatcher
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Dispatch a request
    ///
    /// A request type with no handler, and a call whose context is cancelled
    /// before the chain completes, are unexpected failures.
    pub async fn dispatch<R: Request>(
        &self,
        request: R,
        ctx: &RequestContext,
    ) -> PipelineResult<R::Response> {
        let Some(handler) = self.handlers.get::<R>() else {
            return Err(PipelineError::Unexpected(anyhow::anyhow!(
                "no handler registered for request type {}",
                type_name::<R>()
            )));
        };

        let behaviors: [&dyn Behavior<R>; 2] = [&self.tracing, &self.validation];
        let chain = Next::new(&behaviors, handler);

        tokio::select! {
            biased;
            () = ctx.cancellation().cancelled() => {
                tracing::debug!(
                    trace_id = %ctx.trace_id(),
                    request_type = type_name::<R>(),
                    "Request cancelled"
                );
                Err(PipelineError::Cancelled)
            }
            result = chain.run(request, ctx) => result,
        }
    }

    /// Handler registry
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Validator registry
    pub fn validators(&self) -> &ValidatorRegistry {
        self.validation.registry()
    }
}

/// Builder for [`Dispatcher`]
#[derive(Debug, Default)]
pub struct DispatcherBuilder {
    handlers: HandlerRegistry,
    validators: ValidatorRegistry,
}

impl DispatcherBuilder {
    /// Register the handler for `R`
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateHandler`] if `R` already has a handler.
    pub fn handler<R, H>(mut self, handler: H) -> Result<Self>
    where
        R: Request,
        H: Handler<R>,
    {
        self.handlers.register::<R, H>(handler)?;
        Ok(self)
    }

    /// Add a validator for `R`
    #[must_use]
    pub fn validator<R, V>(mut self, validator: V) -> Self
    where
        R: Request,
        V: Validator<R> + 'static,
    {
        self.validators.register::<R, V>(validator);
        self
    }

    /// Replace the validator registry
    #[must_use]
    pub fn validators(mut self, validators: ValidatorRegistry) -> Self {
        self.validators = validators;
        self
    }

    /// Finish building
    pub fn build(self) -> Dispatcher {
        tracing::debug!(handlers = self.handlers.len(), "Dispatcher built");
        Dispatcher {
            handlers: self.handlers,
            tracing: TracingBehavior,
            validation: ValidationBehavior::new(Arc::new(self.validators)),
        }
    }
}
