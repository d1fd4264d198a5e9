//! Middleware contracts and functional step adapters.
//!
//! A pipeline dispatches three shapes of executable step:
//!
//! - [`Middleware`] - an object with an `invoke(ctx, next, cancellation)`
//!   method, the classic onion contract.
//! - [`ChainStep`] - a decorator over the continuation that also receives the
//!   pipeline's resolver.
//! - [`DetachedChainStep`] - the same, without a resolver, so it stays usable
//!   in pipelines built without one.

use crate::cancellation::CancellationToken;
use crate::errors::PipelineError;
use crate::pipeline::Next;
use crate::resolver::Resolver;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Boxed future returned by functional steps.
pub type StepFuture<'a> = BoxFuture<'a, Result<(), PipelineError>>;

/// One unit of pipeline logic.
///
/// `invoke` runs its "before" half, optionally drives the rest of the chain
/// via [`Next::run`], then runs its "after" half. Dropping `next` without
/// running it short-circuits every step registered after this one.
#[async_trait]
pub trait Middleware<C: Send + Sync + 'static>: Send + Sync {
    /// Invokes the middleware against the shared context.
    async fn invoke(
        &self,
        ctx: &C,
        next: Next<'_, C>,
        cancellation: &CancellationToken,
    ) -> Result<(), PipelineError>;
}

#[async_trait]
impl<C, M> Middleware<C> for Arc<M>
where
    C: Send + Sync + 'static,
    M: Middleware<C> + ?Sized,
{
    async fn invoke(
        &self,
        ctx: &C,
        next: Next<'_, C>,
        cancellation: &CancellationToken,
    ) -> Result<(), PipelineError> {
        (**self).invoke(ctx, next, cancellation).await
    }
}

/// A resolver-aware decorator over the continuation.
///
/// Conditional, dependency-injecting and branching steps are all built on
/// this contract.
#[async_trait]
pub trait ChainStep<C: Send + Sync + 'static>: Send + Sync {
    /// Invokes the step with access to the pipeline's resolver.
    async fn invoke(
        &self,
        resolver: &Arc<dyn Resolver>,
        ctx: &C,
        next: Next<'_, C>,
        cancellation: &CancellationToken,
    ) -> Result<(), PipelineError>;
}

/// A decorator over the continuation that never needs a resolver.
#[async_trait]
pub trait DetachedChainStep<C: Send + Sync + 'static>: Send + Sync {
    /// Invokes the step.
    async fn invoke(
        &self,
        ctx: &C,
        next: Next<'_, C>,
        cancellation: &CancellationToken,
    ) -> Result<(), PipelineError>;
}

/// Adapter turning a plain function into a [`ChainStep`].
pub(crate) struct FnChainStep<F>(pub(crate) F);

#[async_trait]
impl<C, F> ChainStep<C> for FnChainStep<F>
where
    C: Send + Sync + 'static,
    F: for<'a> Fn(
            &'a Arc<dyn Resolver>,
            &'a C,
            Next<'a, C>,
            &'a CancellationToken,
        ) -> StepFuture<'a>
        + Send
        + Sync,
{
    async fn invoke(
        &self,
        resolver: &Arc<dyn Resolver>,
        ctx: &C,
        next: Next<'_, C>,
        cancellation: &CancellationToken,
    ) -> Result<(), PipelineError> {
        (self.0)(resolver, ctx, next, cancellation).await
    }
}

/// Adapter turning a plain function into a [`DetachedChainStep`].
pub(crate) struct FnDetachedStep<F>(pub(crate) F);

#[async_trait]
impl<C, F> DetachedChainStep<C> for FnDetachedStep<F>
where
    C: Send + Sync + 'static,
    F: for<'a> Fn(&'a C, Next<'a, C>, &'a CancellationToken) -> StepFuture<'a> + Send + Sync,
{
    async fn invoke(
        &self,
        ctx: &C,
        next: Next<'_, C>,
        cancellation: &CancellationToken,
    ) -> Result<(), PipelineError> {
        (self.0)(ctx, next, cancellation).await
    }
}
