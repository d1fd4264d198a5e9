//! Pipeline component descriptors.
//!
//! A [`PipelineComponent`] records one of the six ways a step can be supplied
//! to a builder. The enum is the whole validity story: exactly one variant is
//! always populated, so no separate "is valid" check exists anywhere.

use crate::errors::PipelineError;
use crate::middleware::{ChainStep, DetachedChainStep, Middleware};
use crate::resolver::{Resolver, ServiceKey};
use std::any::Any;
use std::sync::Arc;

/// Factory producing a middleware from the context, fresh per execution.
pub type InstanceFactory<C> = Box<dyn Fn(&C) -> Arc<dyn Middleware<C>> + Send + Sync>;

/// Factory producing a middleware from the resolver and the context.
pub type ResolverInstanceFactory<C> =
    Box<dyn Fn(&Arc<dyn Resolver>, &C) -> Arc<dyn Middleware<C>> + Send + Sync>;

/// One registered unit of pipeline work.
///
/// Created once at registration time, immutable thereafter, shared between the
/// builder's list and any frozen pipeline through an [`Arc`].
pub enum PipelineComponent<C: Send + Sync + 'static> {
    /// A middleware resolved by type through the resolver at dispatch time.
    ByType(MiddlewareToken<C>),
    /// A functional step that never needs a resolver.
    ChainFnDetached(Arc<dyn DetachedChainStep<C>>),
    /// A resolver-aware functional step.
    ChainFn(Arc<dyn ChainStep<C>>),
    /// A middleware built from the context, fresh per execution.
    InstanceFactory(InstanceFactory<C>),
    /// A middleware built from the resolver and the context.
    ResolverInstanceFactory(ResolverInstanceFactory<C>),
    /// A pre-built middleware object.
    Instance(Arc<dyn Middleware<C>>),
}

impl<C: Send + Sync + 'static> PipelineComponent<C> {
    /// Returns true if dispatching this component asks the resolver for
    /// anything.
    ///
    /// Evaluated at freeze time: a pipeline built without a resolver rejects
    /// any component for which this holds.
    #[must_use]
    pub fn requires_resolver(&self) -> bool {
        match self {
            Self::ByType(_) | Self::ChainFn(_) | Self::ResolverInstanceFactory(_) => true,
            Self::ChainFnDetached(_) | Self::InstanceFactory(_) | Self::Instance(_) => false,
        }
    }

    /// Returns the variant name, for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ByType(_) => "type",
            Self::ChainFnDetached(_) => "chain_fn_detached",
            Self::ChainFn(_) => "chain_fn",
            Self::InstanceFactory(_) => "instance_factory",
            Self::ResolverInstanceFactory(_) => "resolver_instance_factory",
            Self::Instance(_) => "instance",
        }
    }
}

impl<C: Send + Sync + 'static> std::fmt::Debug for PipelineComponent<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineComponent")
            .field("kind", &self.kind())
            .finish()
    }
}

/// Type token for resolver-based middleware registration.
///
/// Pairs the service key of a concrete middleware type with a monomorphized
/// cast back from the resolver's type-erased service.
pub struct MiddlewareToken<C: Send + Sync + 'static> {
    key: ServiceKey,
    cast: fn(Arc<dyn Any + Send + Sync>) -> Option<Arc<dyn Middleware<C>>>,
}

impl<C: Send + Sync + 'static> MiddlewareToken<C> {
    /// Creates a token for the middleware type `M`.
    #[must_use]
    pub fn of<M>() -> Self
    where
        M: Middleware<C> + 'static,
    {
        Self {
            key: ServiceKey::of::<M>(),
            cast: downcast_middleware::<C, M>,
        }
    }

    /// Returns the service key this token resolves through.
    #[must_use]
    pub fn key(&self) -> ServiceKey {
        self.key
    }

    /// Resolves the middleware instance behind this token.
    ///
    /// The downcast failure arm is unreachable through the public registration
    /// surface but is kept as a guard against a resolver handing back a
    /// service registered under the right key with the wrong type.
    pub(crate) fn resolve(
        &self,
        resolver: &Arc<dyn Resolver>,
    ) -> Result<Arc<dyn Middleware<C>>, PipelineError> {
        let service = resolver.resolve(self.key)?;
        (self.cast)(service).ok_or(PipelineError::ContractViolation {
            type_name: self.key.type_name(),
        })
    }
}

fn downcast_middleware<C, M>(
    service: Arc<dyn Any + Send + Sync>,
) -> Option<Arc<dyn Middleware<C>>>
where
    C: Send + Sync + 'static,
    M: Middleware<C> + 'static,
{
    let middleware = service.downcast::<M>().ok()?;
    Some(middleware)
}
