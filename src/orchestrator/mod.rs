//! Application-level orchestration.
//!
//! Pages own task lifecycle (admission, event delivery, cancellation) for one feature
//! each; the hub groups them. UI/CLI layers call into this module and never touch
//! executors directly.

#[cfg(feature = "tui")]
mod hub;
mod page;

#[cfg(feature = "tui")]
pub use hub::Hub;
pub use page::{PageController, PageInput};
