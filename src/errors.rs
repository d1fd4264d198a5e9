//! Error types for pipeline construction, resolution and execution.

use thiserror::Error;

/// The main error type for pipeline operations.
///
/// Faults raised by individual middlewares are carried opaquely in the
/// [`PipelineError::Middleware`] variant; the executor never catches or
/// reinterprets them.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A pipeline was built or executed without a resolver while at least one
    /// registered component needs one.
    #[error("a resolver is required: {0}")]
    ResolverRequired(String),

    /// A resolved service does not implement the middleware contract for the
    /// pipeline's context type.
    #[error("resolved service '{type_name}' does not implement the middleware contract for this context type")]
    ContractViolation {
        /// The offending service type name.
        type_name: &'static str,
    },

    /// The resolver could not produce a requested service.
    ///
    /// Propagated as-is, never wrapped or reinterpreted by the executor.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// A business-logic fault raised by an individual middleware.
    #[error(transparent)]
    Middleware(#[from] anyhow::Error),

    /// A middleware observed a cancelled token and chose to abort.
    #[error("pipeline cancelled: {0}")]
    Cancelled(String),
}

impl PipelineError {
    /// Builds the resolver-requirement error for a component kind.
    pub(crate) fn resolver_required(kind: &str) -> Self {
        Self::ResolverRequired(format!(
            "component '{kind}' needs a service resolver; \
             build the pipeline with a resolver or register only \
             resolver-independent components"
        ))
    }
}

/// Error raised when a resolver cannot locate or construct a service.
#[derive(Debug, Clone, Error)]
#[error("unable to resolve service '{type_name}'")]
pub struct ResolutionError {
    /// The requested service type name.
    pub type_name: String,
}

impl ResolutionError {
    /// Creates a new resolution error for the given service type.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolver_required_names_component_kind() {
        let err = PipelineError::resolver_required("type");
        assert!(err.to_string().contains("component 'type'"));
    }

    #[test]
    fn test_resolution_error_passes_through_transparently() {
        let err = PipelineError::from(ResolutionError::new("my::Service"));
        assert_eq!(err.to_string(), "unable to resolve service 'my::Service'");
    }

    #[test]
    fn test_middleware_fault_is_opaque() {
        let err = PipelineError::from(anyhow::anyhow!("boom"));
        assert_eq!(err.to_string(), "boom");
    }
}
