//! Command dispatch: bridges CLI args -> controller calls -> output formatting.

pub mod config_cmd;
pub mod control;
pub mod devices;
pub mod locations;
pub mod state;
pub mod watch;

use neviweb_core::Controller;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a controller-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    controller: &Controller,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Locations => locations::handle(controller, global).await,
        Command::Devices(args) => devices::handle(controller, args, global),
        Command::State(args) => state::handle(controller, args, global).await,
        Command::Thermostat(args) => control::thermostat(controller, args, global).await,
        Command::Switch(args) => control::switch(controller, args, global).await,
        Command::Dimmer(args) => control::dimmer(controller, args, global).await,
        Command::Watch(args) => watch::handle(controller, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
