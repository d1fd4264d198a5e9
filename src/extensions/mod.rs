//! Registration sugar built on the chain-step contract.
//!
//! Everything here lowers to ordinary chain components: predicate-gated steps,
//! dependency-injecting steps and nested sub-pipeline branches add no new
//! machinery to the executor.

mod conditional;
mod deps;
mod subpipeline;
