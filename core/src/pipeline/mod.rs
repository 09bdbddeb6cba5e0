// nfviz/src/pipeline/mod.rs

//! Defines the `Pipeline<TData, Err>` struct that implements a step as a
//! sequence of sub-steps, its handler registration and its execution logic.

pub mod definition;
pub mod execution;
pub mod hooks;

// Re-export the main Pipeline struct
pub use definition::Pipeline;
