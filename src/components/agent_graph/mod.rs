//! Paginated, force-directed view of an agent group's executions.

pub mod api;
mod component;
pub mod config;
pub mod error;
pub mod interaction;
pub mod layout;
pub mod pagination;
pub mod quadtree;
mod render;
pub mod sample;
pub mod state;
pub mod tooltip;
pub mod types;
pub mod viewport;

pub use api::{ExecutionSource, HttpExecutionSource, PageSource};
pub use component::AgentGraphCanvas;
pub use config::GraphConfig;
pub use sample::SampleSource;
