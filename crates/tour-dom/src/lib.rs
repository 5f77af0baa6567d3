//! Document access for the tour engine
//!
//! The engine never touches a browser directly. It talks to a [`DomPort`]:
//! a handle onto two search scopes (the main document and the editor's
//! embedded same-origin frame) with the handful of read, focus, scroll and
//! event operations that capture, resolution and completion watching need.
//!
//! [`MemoryDom`] is a complete in-process implementation with a CSS selector
//! subset, used by tests and by the CLI's fixture-driven commands.

pub mod errors;
pub mod fixture;
pub mod memory;
pub mod port;
pub mod selector;

pub use errors::DomError;
pub use fixture::{DomFixture, ElementSpec};
pub use memory::MemoryDom;
pub use port::*;
