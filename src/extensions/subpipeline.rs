//! Nested sub-pipeline branches.
//!
//! A branch runs a separately-built pipeline against the same context and
//! cancellation token when its predicate matches, then always falls through
//! to the rest of the outer chain. Sub-pipelines compose hierarchically: a
//! branch target may itself contain branches.

use crate::builder::PipelineBuilder;
use crate::cancellation::CancellationToken;
use crate::component::PipelineComponent;
use crate::errors::PipelineError;
use crate::middleware::{ChainStep, DetachedChainStep};
use crate::pipeline::{Next, Pipeline};
use crate::resolver::Resolver;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::OnceLock;

struct Branch<C: Send + Sync + 'static, P> {
    predicate: P,
    pipeline: Arc<Pipeline<C>>,
}

#[async_trait]
impl<C, P> DetachedChainStep<C> for Branch<C, P>
where
    C: Send + Sync + 'static,
    P: Fn(&C) -> bool + Send + Sync,
{
    async fn invoke(
        &self,
        ctx: &C,
        next: Next<'_, C>,
        cancellation: &CancellationToken,
    ) -> Result<(), PipelineError> {
        if (self.predicate)(ctx) {
            self.pipeline.execute_with(ctx, cancellation).await?;
        }
        next.run().await
    }
}

struct LazyBranch<C: Send + Sync + 'static, P, B> {
    predicate: P,
    build: B,
    built: OnceLock<Arc<Pipeline<C>>>,
}

#[async_trait]
impl<C, P, B> ChainStep<C> for LazyBranch<C, P, B>
where
    C: Send + Sync + 'static,
    P: Fn(&C) -> bool + Send + Sync,
    B: Fn(&Arc<dyn Resolver>) -> Pipeline<C> + Send + Sync,
{
    async fn invoke(
        &self,
        resolver: &Arc<dyn Resolver>,
        ctx: &C,
        next: Next<'_, C>,
        cancellation: &CancellationToken,
    ) -> Result<(), PipelineError> {
        if (self.predicate)(ctx) {
            let pipeline = self
                .built
                .get_or_init(|| Arc::new((self.build)(resolver)));
            pipeline.execute_with(ctx, cancellation).await?;
        }
        next.run().await
    }
}

impl<C: Send + Sync + 'static> PipelineBuilder<C> {
    /// Registers a pre-built sub-pipeline gated behind a context predicate.
    ///
    /// The sub-pipeline is built at composition time, so the branch never
    /// needs the outer pipeline's resolver.
    pub fn register_branch<P>(&mut self, predicate: P, pipeline: Pipeline<C>) -> &mut Self
    where
        P: Fn(&C) -> bool + Send + Sync + 'static,
    {
        self.push(PipelineComponent::ChainFnDetached(Arc::new(Branch {
            predicate,
            pipeline: Arc::new(pipeline),
        })))
    }

    /// Registers a lazily-built sub-pipeline gated behind a context predicate.
    ///
    /// `build` runs once, on the first execution whose predicate matches, and
    /// the result is memoized for the lifetime of the outer pipeline.
    pub fn register_branch_lazy<P, B>(&mut self, predicate: P, build: B) -> &mut Self
    where
        P: Fn(&C) -> bool + Send + Sync + 'static,
        B: Fn(&Arc<dyn Resolver>) -> Pipeline<C> + Send + Sync + 'static,
    {
        self.push(PipelineComponent::ChainFn(Arc::new(LazyBranch {
            predicate,
            build,
            built: OnceLock::new(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{Middleware, StepFuture};
    use crate::resolver::ServiceRegistry;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TestCtx {
        domain: &'static str,
        trace: Mutex<String>,
    }

    impl TestCtx {
        fn for_domain(domain: &'static str) -> Self {
            Self {
                domain,
                ..Self::default()
            }
        }

        fn append(&self, part: &str) {
            self.trace.lock().push_str(part);
        }
    }

    struct DomainStep(&'static str);

    #[async_trait]
    impl Middleware<TestCtx> for DomainStep {
        async fn invoke(
            &self,
            ctx: &TestCtx,
            next: Next<'_, TestCtx>,
            _cancellation: &CancellationToken,
        ) -> Result<(), PipelineError> {
            ctx.append(self.0);
            next.run().await
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
    async fn test_branch_runs_only_on_matching_domain() {
        let mut sub = PipelineBuilder::<TestCtx>::new();
        sub.register_instance(DomainStep("Billing;"));
        let sub = sub.build_standalone().unwrap();

        let mut builder = PipelineBuilder::<TestCtx>::new();
        builder
            .register_branch(|ctx: &TestCtx| ctx.domain == "billing", sub)
            .register_fn(tail_step);

        let pipeline = builder.build_standalone().unwrap();

        let hit = TestCtx::for_domain("billing");
        pipeline.execute(&hit).await.unwrap();
        assert_eq!(*hit.trace.lock(), "Billing;Tail");

        let miss = TestCtx::for_domain("shipping");
        pipeline.execute(&miss).await.unwrap();
        assert_eq!(*miss.trace.lock(), "Tail");
    }

    #[tokio::test]
    async fn test_lazy_branch_builds_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let build_count = Arc::clone(&builds);

        let registry = Arc::new(ServiceRegistry::new());

        let mut builder = PipelineBuilder::<TestCtx>::new();
        builder.register_branch_lazy(
            |ctx: &TestCtx| ctx.domain == "billing",
            move |_resolver| {
                build_count.fetch_add(1, Ordering::SeqCst);
                let mut sub = PipelineBuilder::<TestCtx>::new();
                sub.register_instance(DomainStep("Billing;"));
                sub.build_standalone().unwrap()
            },
        );

        let pipeline = builder.build(registry);

        // A non-matching execution must not trigger the build.
        pipeline.execute(&TestCtx::for_domain("shipping")).await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 0);

        let first = TestCtx::for_domain("billing");
        pipeline.execute(&first).await.unwrap();
        let second = TestCtx::for_domain("billing");
        pipeline.execute(&second).await.unwrap();

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(*first.trace.lock(), "Billing;");
        assert_eq!(*second.trace.lock(), "Billing;");
    }

    #[tokio::test]
    async fn test_branches_nest_hierarchically() {
        let mut inner = PipelineBuilder::<TestCtx>::new();
        inner.register_instance(DomainStep("Inner;"));
        let inner = inner.build_standalone().unwrap();

        let mut middle = PipelineBuilder::<TestCtx>::new();
        middle
            .register_instance(DomainStep("Middle;"))
            .register_branch(|_: &TestCtx| true, inner);
        let middle = middle.build_standalone().unwrap();

        let mut builder = PipelineBuilder::<TestCtx>::new();
        builder.register_branch(|_: &TestCtx| true, middle);

        let pipeline = builder.build_standalone().unwrap();
        let ctx = TestCtx::for_domain("any");
        pipeline.execute(&ctx).await.unwrap();

        assert_eq!(*ctx.trace.lock(), "Middle;Inner;");
    }

    #[tokio::test]
    async fn test_branch_shares_cancellation_token() {
        struct TokenProbe;

        #[async_trait]
        impl Middleware<TestCtx> for TokenProbe {
            async fn invoke(
                &self,
                ctx: &TestCtx,
                next: Next<'_, TestCtx>,
                cancellation: &CancellationToken,
            ) -> Result<(), PipelineError> {
                if cancellation.is_cancelled() {
                    ctx.append("SubSawCancel;");
                }
                next.run().await
            }
        }

        let mut sub = PipelineBuilder::<TestCtx>::new();
        sub.register_instance(TokenProbe);
        let sub = sub.build_standalone().unwrap();

        let mut builder = PipelineBuilder::<TestCtx>::new();
        builder.register_branch(|_: &TestCtx| true, sub);

        let pipeline = builder.build_standalone().unwrap();
        let ctx = TestCtx::for_domain("any");
        let cancellation = CancellationToken::new();
        cancellation.cancel("test");

        pipeline.execute_with(&ctx, &cancellation).await.unwrap();
        assert_eq!(*ctx.trace.lock(), "SubSawCancel;");
    }
}
