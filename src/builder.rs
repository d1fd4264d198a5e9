//! Pipeline builder: ordered component registration with fluent chaining.

use crate::cancellation::CancellationToken;
use crate::component::{MiddlewareToken, PipelineComponent};
use crate::errors::PipelineError;
use crate::middleware::{
    ChainStep, DetachedChainStep, FnChainStep, FnDetachedStep, Middleware, StepFuture,
};
use crate::pipeline::{Next, Pipeline};
use crate::resolver::Resolver;
use std::sync::Arc;

/// Read-only access to a registered component list.
///
/// Lets a composition root discover what a builder accumulated without owning
/// the pipeline itself; [`Pipeline::from_accessor`] freezes straight from it.
pub trait ComponentAccessor<C: Send + Sync + 'static>: Send + Sync {
    /// Returns a snapshot of the registered components, in order.
    fn components(&self) -> Vec<Arc<PipelineComponent<C>>>;
}

/// Accumulates an ordered list of pipeline components.
///
/// Registration order is execution order for every step's "before" half and
/// the exact reverse for its "after" half. The builder is a single-writer
/// construction-time object; freeze it with [`PipelineBuilder::build`] or
/// [`PipelineBuilder::build_standalone`] before executing.
pub struct PipelineBuilder<C: Send + Sync + 'static> {
    components: Vec<Arc<PipelineComponent<C>>>,
}

impl<C: Send + Sync + 'static> PipelineBuilder<C> {
    /// Creates a new empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Registers a middleware type, resolved through the pipeline's resolver
    /// at dispatch time.
    ///
    /// The middleware contract is enforced by the trait bound; there is no
    /// runtime registration that can fail here.
    pub fn register_type<M>(&mut self) -> &mut Self
    where
        M: Middleware<C> + 'static,
    {
        self.push(PipelineComponent::ByType(MiddlewareToken::of::<M>()))
    }

    /// Registers a pre-built middleware instance.
    pub fn register_instance<M>(&mut self, middleware: M) -> &mut Self
    where
        M: Middleware<C> + 'static,
    {
        self.push(PipelineComponent::Instance(Arc::new(middleware)))
    }

    /// Registers a factory building a middleware from the context, invoked
    /// fresh on every execution.
    pub fn register_instance_factory<F>(&mut self, factory: F) -> &mut Self
    where
        F: Fn(&C) -> Arc<dyn Middleware<C>> + Send + Sync + 'static,
    {
        self.push(PipelineComponent::InstanceFactory(Box::new(factory)))
    }

    /// Registers a factory building a middleware from the resolver and the
    /// context, invoked fresh on every execution.
    pub fn register_resolver_instance_factory<F>(&mut self, factory: F) -> &mut Self
    where
        F: Fn(&Arc<dyn Resolver>, &C) -> Arc<dyn Middleware<C>> + Send + Sync + 'static,
    {
        self.push(PipelineComponent::ResolverInstanceFactory(Box::new(factory)))
    }

    /// Registers a resolver-aware chain step object.
    pub fn register_chain_step<S>(&mut self, step: S) -> &mut Self
    where
        S: ChainStep<C> + 'static,
    {
        self.push(PipelineComponent::ChainFn(Arc::new(step)))
    }

    /// Registers a resolver-aware functional step.
    pub fn register_chain_fn<F>(&mut self, step: F) -> &mut Self
    where
        F: for<'a> Fn(
                &'a Arc<dyn Resolver>,
                &'a C,
                Next<'a, C>,
                &'a CancellationToken,
            ) -> StepFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.push(PipelineComponent::ChainFn(Arc::new(FnChainStep(step))))
    }

    /// Registers a resolver-free chain step object.
    pub fn register_detached_step<S>(&mut self, step: S) -> &mut Self
    where
        S: DetachedChainStep<C> + 'static,
    {
        self.push(PipelineComponent::ChainFnDetached(Arc::new(step)))
    }

    /// Registers a resolver-free functional step.
    ///
    /// Plain `fn` items fit the signature directly:
    ///
    /// ```rust,ignore
    /// fn log_step<'a>(ctx: &'a Ctx, next: Next<'a, Ctx>, _: &'a CancellationToken) -> StepFuture<'a> {
    ///     Box::pin(async move {
    ///         // before
    ///         next.run().await
    ///         // after
    ///     })
    /// }
    ///
    /// builder.register_fn(log_step);
    /// ```
    pub fn register_fn<F>(&mut self, step: F) -> &mut Self
    where
        F: for<'a> Fn(&'a C, Next<'a, C>, &'a CancellationToken) -> StepFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.push(PipelineComponent::ChainFnDetached(Arc::new(FnDetachedStep(
            step,
        ))))
    }

    /// Freezes the current component list into a pipeline bound to `resolver`.
    ///
    /// The pipeline takes an independent snapshot: registering more components
    /// afterwards never affects it.
    #[must_use]
    pub fn build(&self, resolver: Arc<dyn Resolver>) -> Pipeline<C> {
        Pipeline::new(self.components.clone(), Some(resolver))
    }

    /// Freezes the current component list into a pipeline without a resolver.
    ///
    /// Fails with [`PipelineError::ResolverRequired`] if any registered
    /// component needs one.
    pub fn build_standalone(&self) -> Result<Pipeline<C>, PipelineError> {
        Pipeline::from_accessor(self, None)
    }

    /// Returns the registered components, in order.
    #[must_use]
    pub fn registered(&self) -> &[Arc<PipelineComponent<C>>] {
        &self.components
    }

    pub(crate) fn push(&mut self, component: PipelineComponent<C>) -> &mut Self {
        self.components.push(Arc::new(component));
        self
    }
}

impl<C: Send + Sync + 'static> Default for PipelineBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Send + Sync + 'static> ComponentAccessor<C> for PipelineBuilder<C> {
    fn components(&self) -> Vec<Arc<PipelineComponent<C>>> {
        self.components.clone()
    }
}

impl<C: Send + Sync + 'static> std::fmt::Debug for PipelineBuilder<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("components", &self.components.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct Ctx;

    struct Noop;

    #[async_trait]
    impl Middleware<Ctx> for Noop {
        async fn invoke(
            &self,
            _ctx: &Ctx,
            next: Next<'_, Ctx>,
            _cancellation: &CancellationToken,
        ) -> Result<(), PipelineError> {
            next.run().await
        }
    }

    fn noop_chain_step<'a>(
        _resolver: &'a Arc<dyn Resolver>,
        _ctx: &'a Ctx,
        next: Next<'a, Ctx>,
        _cancellation: &'a CancellationToken,
    ) -> StepFuture<'a> {
        next.run()
    }

    fn noop_detached_step<'a>(
        _ctx: &'a Ctx,
        next: Next<'a, Ctx>,
        _cancellation: &'a CancellationToken,
    ) -> StepFuture<'a> {
        next.run()
    }

    #[test]
    fn test_registration_order_is_preserved() {
        let mut builder = PipelineBuilder::<Ctx>::new();
        builder
            .register_type::<Noop>()
            .register_instance(Noop)
            .register_instance_factory(|_: &Ctx| -> Arc<dyn Middleware<Ctx>> { Arc::new(Noop) });

        let kinds: Vec<_> = builder.registered().iter().map(|c| c.kind()).collect();
        assert_eq!(kinds, vec!["type", "instance", "instance_factory"]);
    }

    #[test]
    fn test_chain_step_registrations_track_resolver_requirement() {
        let mut builder = PipelineBuilder::<Ctx>::new();
        builder
            .register_chain_step(FnChainStep(noop_chain_step))
            .register_detached_step(FnDetachedStep(noop_detached_step));

        let kinds: Vec<_> = builder.registered().iter().map(|c| c.kind()).collect();
        assert_eq!(kinds, vec!["chain_fn", "chain_fn_detached"]);

        let err = builder.build_standalone().unwrap_err();
        assert!(matches!(err, PipelineError::ResolverRequired(_)));
    }

    #[test]
    fn test_standalone_build_rejects_resolver_dependent_components() {
        let mut builder = PipelineBuilder::<Ctx>::new();
        builder.register_type::<Noop>();

        let err = builder.build_standalone().unwrap_err();
        assert!(matches!(err, PipelineError::ResolverRequired(_)));
    }

    #[test]
    fn test_standalone_build_accepts_resolver_free_components() {
        let mut builder = PipelineBuilder::<Ctx>::new();
        builder.register_instance(Noop);

        assert!(builder.build_standalone().is_ok());
    }

    #[test]
    fn test_accessor_snapshot_is_independent() {
        let mut builder = PipelineBuilder::<Ctx>::new();
        builder.register_instance(Noop);

        let snapshot = ComponentAccessor::components(&builder);
        builder.register_instance(Noop);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(builder.registered().len(), 2);
    }
}
