//! Tourguide command line
//!
//! Loads configuration, installs logging and drives the tour engine crates
//! against page fixtures (a recorded document plus the editor block tree).

pub mod cli;
pub mod config;
pub mod page;

pub use config::Config;
pub use page::{LoadedPage, PageFixture};
