//! Building blocks for operators reconciling resources of an orchestration backend.

pub mod api;
pub mod error;
pub mod labels;
pub mod watcher;

pub use edgeplane_service_api::{Diff, Update};
