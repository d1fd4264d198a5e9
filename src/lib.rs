//! # Chainflow
//!
//! Composable middleware pipelines over an arbitrary context type.
//!
//! Chainflow generalizes the classic web-framework "onion" pattern: register
//! an ordered sequence of components against a shared context, freeze them
//! into an immutable [`pipeline::Pipeline`], and execute the whole set as one
//! forward-and-unwind call chain. Components can be supplied six ways -
//! resolver-backed types, pre-built instances, per-execution factories,
//! resolver-aware factories, and chain functions with or without resolver
//! access - and all of them share one execution order and fault model.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chainflow::prelude::*;
//!
//! let mut builder = PipelineBuilder::<RequestCtx>::new();
//! builder
//!     .register_instance(Timing)
//!     .register_type::<Validation>()
//!     .register_branch(|ctx| ctx.domain == "billing", billing_pipeline);
//!
//! let pipeline = builder.build(registry);
//! pipeline.execute(&ctx).await?;
//! ```
//!
//! Execution is strictly sequential per call; a frozen pipeline is cheap to
//! clone and safe to execute concurrently, because all per-call state lives
//! in a cursor allocated fresh for each execution.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod builder;
pub mod cancellation;
pub mod component;
pub mod errors;
mod extensions;
pub mod middleware;
pub mod pipeline;
pub mod resolver;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::builder::{ComponentAccessor, PipelineBuilder};
    pub use crate::cancellation::CancellationToken;
    pub use crate::component::{MiddlewareToken, PipelineComponent};
    pub use crate::errors::{PipelineError, ResolutionError};
    pub use crate::middleware::{ChainStep, DetachedChainStep, Middleware, StepFuture};
    pub use crate::pipeline::{Next, Pipeline};
    pub use crate::resolver::{
        install_pipeline, Resolver, ResolverExt, ServiceKey, ServiceRegistry,
    };
}
