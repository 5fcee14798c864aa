//! Message routing for the edge hub: route conditions, routes and the hub's desired properties.

pub mod condition;
pub mod config;
pub mod message;
pub mod route;
pub mod router;

pub use condition::{Bool, CompilerFlags, Condition};
pub use message::{Message, MessageSource};
pub use route::{Endpoint, Route, Source};
pub use router::Router;
