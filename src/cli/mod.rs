pub mod app;
pub mod commands;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod inspect;
pub mod output;
pub mod play;
pub mod runtime;
pub mod tours;
pub mod validate;

pub use config::{cmd_config, ConfigArgs};
pub use inspect::{cmd_capture, cmd_context, cmd_resolve, InspectArgs, ResolveArgs};
pub use play::{cmd_play, PlayArgs};
pub use tours::{cmd_tours, ToursArgs};
pub use validate::{cmd_validate, ValidateArgs};
