use clap::Subcommand;

use super::{ConfigArgs, InspectArgs, PlayArgs, ResolveArgs, ToursArgs, ValidateArgs};

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Check a tour file for structural problems
    Validate(ValidateArgs),

    /// Capture locators for an element of a page fixture
    Capture(InspectArgs),

    /// Describe an element the way the drafting service sees it
    Context(InspectArgs),

    /// Resolve a target against a page fixture
    Resolve(ResolveArgs),

    /// Play a tour against a page fixture
    Play(PlayArgs),

    /// Browse and generate tours on the tour service
    Tours(ToursArgs),

    /// Configuration management
    Config(ConfigArgs),
}
