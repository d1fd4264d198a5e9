//! Frozen pipeline execution: the forward-and-unwind component walk.

use crate::builder::ComponentAccessor;
use crate::cancellation::CancellationToken;
use crate::component::PipelineComponent;
use crate::errors::PipelineError;
use crate::middleware::StepFuture;
use crate::resolver::Resolver;
use std::sync::Arc;
use tracing::trace;

/// The continuation handed to each step: "run everything after me".
///
/// Consumed by value, so a step can drive the rest of the chain at most once;
/// dropping it without running short-circuits every later step. Running past
/// the last component completes immediately.
pub struct Next<'a, C: Send + Sync + 'static> {
    components: &'a [Arc<PipelineComponent<C>>],
    index: usize,
    resolver: Option<&'a Arc<dyn Resolver>>,
    ctx: &'a C,
    cancellation: &'a CancellationToken,
}

impl<'a, C: Send + Sync + 'static> Next<'a, C> {
    /// Runs the remainder of the chain.
    ///
    /// Dispatches the component under the cursor, advancing the cursor first
    /// so that the dispatched step receives a continuation pointing past
    /// itself. Faults from steps and from the resolver propagate unchanged
    /// through every enclosing step's unwind path.
    pub fn run(mut self) -> StepFuture<'a> {
        Box::pin(async move {
            let components = self.components;
            let Some(component) = components.get(self.index) else {
                return Ok(());
            };
            self.index += 1;

            let ctx = self.ctx;
            let cancellation = self.cancellation;
            let resolver = self.resolver;

            trace!(component = component.kind(), index = self.index, "dispatching");

            match component.as_ref() {
                PipelineComponent::ByType(token) => {
                    let resolver = resolver
                        .ok_or_else(|| PipelineError::resolver_required(component.kind()))?;
                    let middleware = token.resolve(resolver)?;
                    middleware.invoke(ctx, self, cancellation).await
                }
                PipelineComponent::ChainFnDetached(step) => {
                    step.invoke(ctx, self, cancellation).await
                }
                PipelineComponent::ChainFn(step) => {
                    let resolver = resolver
                        .ok_or_else(|| PipelineError::resolver_required(component.kind()))?;
                    step.invoke(resolver, ctx, self, cancellation).await
                }
                PipelineComponent::InstanceFactory(factory) => {
                    let middleware = factory(ctx);
                    middleware.invoke(ctx, self, cancellation).await
                }
                PipelineComponent::ResolverInstanceFactory(factory) => {
                    let resolver = resolver
                        .ok_or_else(|| PipelineError::resolver_required(component.kind()))?;
                    let middleware = factory(resolver, ctx);
                    middleware.invoke(ctx, self, cancellation).await
                }
                PipelineComponent::Instance(middleware) => {
                    middleware.invoke(ctx, self, cancellation).await
                }
            }
        })
    }

    /// Returns how many components remain, including the one under the cursor.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.components.len().saturating_sub(self.index)
    }
}

/// An immutable, repeatedly-executable snapshot of a component list.
///
/// Cheap to clone and safe to share across tasks: per-execution state lives
/// entirely in the [`Next`] cursor allocated by each `execute` call.
pub struct Pipeline<C: Send + Sync + 'static> {
    components: Arc<[Arc<PipelineComponent<C>>]>,
    resolver: Option<Arc<dyn Resolver>>,
}

impl<C: Send + Sync + 'static> Pipeline<C> {
    pub(crate) fn new(
        components: Vec<Arc<PipelineComponent<C>>>,
        resolver: Option<Arc<dyn Resolver>>,
    ) -> Self {
        Self {
            components: components.into(),
            resolver,
        }
    }

    /// Freezes a pipeline straight from a component accessor.
    ///
    /// Re-validates the resolver requirement, mirroring the builder-side check
    /// for callers that wire pipelines through a composition root instead of
    /// [`crate::builder::PipelineBuilder::build_standalone`].
    pub fn from_accessor(
        accessor: &dyn ComponentAccessor<C>,
        resolver: Option<Arc<dyn Resolver>>,
    ) -> Result<Self, PipelineError> {
        let components = accessor.components();
        if resolver.is_none() {
            if let Some(component) = components.iter().find(|c| c.requires_resolver()) {
                return Err(PipelineError::resolver_required(component.kind()));
            }
        }
        Ok(Self::new(components, resolver))
    }

    /// Executes the chain against `ctx` with a fresh, never-cancelled token.
    pub async fn execute(&self, ctx: &C) -> Result<(), PipelineError> {
        let cancellation = CancellationToken::new();
        self.execute_with(ctx, &cancellation).await
    }

    /// Executes the chain against `ctx`, threading `cancellation` to every
    /// dispatched step.
    ///
    /// An empty pipeline completes immediately without touching the context.
    pub async fn execute_with(
        &self,
        ctx: &C,
        cancellation: &CancellationToken,
    ) -> Result<(), PipelineError> {
        if self.components.is_empty() {
            return Ok(());
        }

        trace!(components = self.components.len(), "executing pipeline");

        let next = Next {
            components: &self.components,
            index: 0,
            resolver: self.resolver.as_ref(),
            ctx,
            cancellation,
        };

        next.run().await
    }

    /// Returns the number of frozen components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns true if the pipeline has no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl<C: Send + Sync + 'static> Clone for Pipeline<C> {
    fn clone(&self) -> Self {
        Self {
            components: Arc::clone(&self.components),
            resolver: self.resolver.clone(),
        }
    }
}

impl<C: Send + Sync + 'static> std::fmt::Debug for Pipeline<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("components", &self.components.len())
            .field("has_resolver", &self.resolver.is_some())
            .finish()
    }
}
