//! Predicate-gated step registration.

use crate::builder::PipelineBuilder;
use crate::cancellation::CancellationToken;
use crate::component::PipelineComponent;
use crate::errors::PipelineError;
use crate::middleware::{ChainStep, DetachedChainStep, Middleware};
use crate::pipeline::Next;
use crate::resolver::{Resolver, ResolverExt};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;

/// Gates a resolver-constructed middleware behind a context predicate.
struct WhenType<M, P> {
    predicate: P,
    _middleware: PhantomData<fn() -> M>,
}

#[async_trait]
impl<C, M, P> ChainStep<C> for WhenType<M, P>
where
    C: Send + Sync + 'static,
    M: Middleware<C> + 'static,
    P: Fn(&C) -> bool + Send + Sync,
{
    async fn invoke(
        &self,
        resolver: &Arc<dyn Resolver>,
        ctx: &C,
        next: Next<'_, C>,
        cancellation: &CancellationToken,
    ) -> Result<(), PipelineError> {
        if (self.predicate)(ctx) {
            let middleware = resolver.get::<M>()?;
            middleware.invoke(ctx, next, cancellation).await
        } else {
            next.run().await
        }
    }
}

/// Gates an arbitrary chain step behind a context predicate.
struct When<S, P> {
    predicate: P,
    step: S,
}

#[async_trait]
impl<C, S, P> ChainStep<C> for When<S, P>
where
    C: Send + Sync + 'static,
    S: ChainStep<C>,
    P: Fn(&C) -> bool + Send + Sync,
{
    async fn invoke(
        &self,
        resolver: &Arc<dyn Resolver>,
        ctx: &C,
        next: Next<'_, C>,
        cancellation: &CancellationToken,
    ) -> Result<(), PipelineError> {
        if (self.predicate)(ctx) {
            self.step.invoke(resolver, ctx, next, cancellation).await
        } else {
            next.run().await
        }
    }
}

/// Resolver-free flavour of [`When`].
struct WhenDetached<S, P> {
    predicate: P,
    step: S,
}

#[async_trait]
impl<C, S, P> DetachedChainStep<C> for WhenDetached<S, P>
where
    C: Send + Sync + 'static,
    S: DetachedChainStep<C>,
    P: Fn(&C) -> bool + Send + Sync,
{
    async fn invoke(
        &self,
        ctx: &C,
        next: Next<'_, C>,
        cancellation: &CancellationToken,
    ) -> Result<(), PipelineError> {
        if (self.predicate)(ctx) {
            self.step.invoke(ctx, next, cancellation).await
        } else {
            next.run().await
        }
    }
}

impl<C: Send + Sync + 'static> PipelineBuilder<C> {
    /// Registers a middleware type that runs only when `predicate` holds for
    /// the current context.
    ///
    /// The predicate is evaluated fresh on every execution; the false branch
    /// falls straight through to the rest of the chain.
    pub fn register_when_type<M, P>(&mut self, predicate: P) -> &mut Self
    where
        M: Middleware<C> + 'static,
        P: Fn(&C) -> bool + Send + Sync + 'static,
    {
        self.push(PipelineComponent::ChainFn(Arc::new(WhenType::<M, P> {
            predicate,
            _middleware: PhantomData,
        })))
    }

    /// Registers a chain step gated behind a context predicate.
    pub fn register_when<S, P>(&mut self, predicate: P, step: S) -> &mut Self
    where
        S: ChainStep<C> + 'static,
        P: Fn(&C) -> bool + Send + Sync + 'static,
    {
        self.push(PipelineComponent::ChainFn(Arc::new(When { predicate, step })))
    }

    /// Registers a resolver-free chain step gated behind a context predicate.
    pub fn register_when_detached<S, P>(&mut self, predicate: P, step: S) -> &mut Self
    where
        S: DetachedChainStep<C> + 'static,
        P: Fn(&C) -> bool + Send + Sync + 'static,
    {
        self.push(PipelineComponent::ChainFnDetached(Arc::new(WhenDetached {
            predicate,
            step,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{FnDetachedStep, StepFuture};
    use crate::resolver::ServiceRegistry;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct TestCtx {
        flagged: bool,
        trace: Mutex<String>,
    }

    impl TestCtx {
        fn flagged(flagged: bool) -> Self {
            Self {
                flagged,
                ..Self::default()
            }
        }

        fn append(&self, part: &str) {
            self.trace.lock().push_str(part);
        }
    }

    struct Marker;

    #[async_trait]
    impl Middleware<TestCtx> for Marker {
        async fn invoke(
            &self,
            ctx: &TestCtx,
            next: Next<'_, TestCtx>,
            _cancellation: &CancellationToken,
        ) -> Result<(), PipelineError> {
            ctx.append("Before_Marker");
            next.run().await?;
            ctx.append("After_Marker");
            Ok(())
        }
    }

    fn tail_step<'a>(
        ctx: &'a TestCtx,
        next: Next<'a, TestCtx>,
        _cancellation: &'a CancellationToken,
    ) -> StepFuture<'a> {
        Box::pin(async move {
            ctx.append("Tail");
            next.run().await
        })
    }

    #[tokio::test]
    async fn test_when_type_runs_only_on_matching_context() {
        let registry = Arc::new(ServiceRegistry::new());
        registry.add_transient(|| Marker);

        let mut builder = PipelineBuilder::<TestCtx>::new();
        builder
            .register_when_type::<Marker, _>(|ctx| ctx.flagged)
            .register_fn(tail_step);

        let pipeline = builder.build(registry);

        let hit = TestCtx::flagged(true);
        pipeline.execute(&hit).await.unwrap();
        assert_eq!(*hit.trace.lock(), "Before_MarkerTailAfter_Marker");

        let miss = TestCtx::flagged(false);
        pipeline.execute(&miss).await.unwrap();
        assert_eq!(*miss.trace.lock(), "Tail");
    }

    #[tokio::test]
    async fn test_when_detached_keeps_standalone_build() {
        let mut builder = PipelineBuilder::<TestCtx>::new();
        builder
            .register_when_detached(|ctx: &TestCtx| ctx.flagged, FnDetachedStep(tail_step))
            .register_instance(Marker);

        let pipeline = builder.build_standalone().unwrap();

        let hit = TestCtx::flagged(true);
        pipeline.execute(&hit).await.unwrap();
        assert_eq!(*hit.trace.lock(), "TailBefore_MarkerAfter_Marker");

        let miss = TestCtx::flagged(false);
        pipeline.execute(&miss).await.unwrap();
        assert_eq!(*miss.trace.lock(), "Before_MarkerAfter_Marker");
    }

    #[tokio::test]
    async fn test_when_gates_inner_chain_step() {
        let registry = Arc::new(ServiceRegistry::new());
        registry.add_transient(|| Marker);

        let mut builder = PipelineBuilder::<TestCtx>::new();
        builder.register_when(
            |ctx: &TestCtx| ctx.flagged,
            WhenType::<Marker, _> {
                predicate: |_: &TestCtx| true,
                _middleware: PhantomData,
            },
        );

        let pipeline = builder.build(registry);
        let hit = TestCtx::flagged(true);
        pipeline.execute(&hit).await.unwrap();
        assert_eq!(*hit.trace.lock(), "Before_MarkerAfter_Marker");
    }
}
