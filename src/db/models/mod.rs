//! Database models split into domain-specific modules.

pub mod application;
pub mod audit;
pub mod document;
pub mod finance;
pub mod lease;
pub mod organization;
pub mod property;
pub mod stats;
pub mod status;
pub mod user;

pub use application::*;
pub use audit::*;
pub use document::*;
pub use finance::*;
pub use lease::*;
pub use organization::*;
pub use property::*;
pub use stats::*;
pub use status::*;
pub use user::*;
