//! Dependency-injecting step registration.
//!
//! Each step resolves its dependencies positionally at execution time, so a
//! missing registration surfaces as the resolver's own fault at the first
//! execution that reaches the step.

use crate::builder::PipelineBuilder;
use crate::cancellation::CancellationToken;
use crate::component::PipelineComponent;
use crate::errors::PipelineError;
use crate::middleware::{ChainStep, StepFuture};
use crate::pipeline::Next;
use crate::resolver::{Resolver, ResolverExt};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;

struct DepStep<D1, F> {
    step: F,
    _deps: PhantomData<fn() -> D1>,
}

#[async_trait]
impl<C, D1, F> ChainStep<C> for DepStep<D1, F>
where
    C: Send + Sync + 'static,
    D1: Send + Sync + 'static,
    F: for<'a> Fn(&'a C, Arc<D1>, Next<'a, C>, &'a CancellationToken) -> StepFuture<'a>
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
        let dep1 = resolver.get::<D1>()?;
        (self.step)(ctx, dep1, next, cancellation).await
    }
}

struct Deps2Step<D1, D2, F> {
    step: F,
    _deps: PhantomData<fn() -> (D1, D2)>,
}

#[async_trait]
impl<C, D1, D2, F> ChainStep<C> for Deps2Step<D1, D2, F>
where
    C: Send + Sync + 'static,
    D1: Send + Sync + 'static,
    D2: Send + Sync + 'static,
    F: for<'a> Fn(&'a C, Arc<D1>, Arc<D2>, Next<'a, C>, &'a CancellationToken) -> StepFuture<'a>
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
        let dep1 = resolver.get::<D1>()?;
        let dep2 = resolver.get::<D2>()?;
        (self.step)(ctx, dep1, dep2, next, cancellation).await
    }
}

struct Deps3Step<D1, D2, D3, F> {
    step: F,
    _deps: PhantomData<fn() -> (D1, D2, D3)>,
}

#[async_trait]
impl<C, D1, D2, D3, F> ChainStep<C> for Deps3Step<D1, D2, D3, F>
where
    C: Send + Sync + 'static,
    D1: Send + Sync + 'static,
    D2: Send + Sync + 'static,
    D3: Send + Sync + 'static,
    F: for<'a> Fn(
            &'a C,
            Arc<D1>,
            Arc<D2>,
            Arc<D3>,
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
        let dep1 = resolver.get::<D1>()?;
        let dep2 = resolver.get::<D2>()?;
        let dep3 = resolver.get::<D3>()?;
        (self.step)(ctx, dep1, dep2, dep3, next, cancellation).await
    }
}

impl<C: Send + Sync + 'static> PipelineBuilder<C> {
    /// Registers a functional step that receives one resolved dependency.
    pub fn register_with_dep<D1, F>(&mut self, step: F) -> &mut Self
    where
        D1: Send + Sync + 'static,
        F: for<'a> Fn(&'a C, Arc<D1>, Next<'a, C>, &'a CancellationToken) -> StepFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.push(PipelineComponent::ChainFn(Arc::new(DepStep::<D1, F> {
            step,
            _deps: PhantomData,
        })))
    }

    /// Registers a functional step that receives two resolved dependencies.
    pub fn register_with_deps2<D1, D2, F>(&mut self, step: F) -> &mut Self
    where
        D1: Send + Sync + 'static,
        D2: Send + Sync + 'static,
        F: for<'a> Fn(
                &'a C,
                Arc<D1>,
                Arc<D2>,
                Next<'a, C>,
                &'a CancellationToken,
            ) -> StepFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.push(PipelineComponent::ChainFn(Arc::new(
            Deps2Step::<D1, D2, F> {
                step,
                _deps: PhantomData,
            },
        )))
    }

    /// Registers a functional step that receives three resolved dependencies.
    pub fn register_with_deps3<D1, D2, D3, F>(&mut self, step: F) -> &mut Self
    where
        D1: Send + Sync + 'static,
        D2: Send + Sync + 'static,
        D3: Send + Sync + 'static,
        F: for<'a> Fn(
                &'a C,
                Arc<D1>,
                Arc<D2>,
                Arc<D3>,
                Next<'a, C>,
                &'a CancellationToken,
            ) -> StepFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.push(PipelineComponent::ChainFn(Arc::new(
            Deps3Step::<D1, D2, D3, F> {
                step,
                _deps: PhantomData,
            },
        )))
    }
}
