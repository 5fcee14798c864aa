pub mod auth;
pub mod diff;
pub mod identity;
pub mod module;
pub mod version;

pub use diff::{Diff, Update};
pub use identity::*;
pub use module::*;

pub const PROJECT: &str = "Edgeplane";
