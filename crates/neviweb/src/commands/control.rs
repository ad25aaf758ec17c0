//! Attribute writes: thermostat, switch and dimmer control.

use neviweb_core::{Controller, SetpointMode};

use crate::cli::{
    DimmerArgs, DimmerCommand, GlobalOpts, SwitchArgs, SwitchCommand, ThermostatArgs,
    ThermostatCommand,
};
use crate::error::CliError;

fn done(global: &GlobalOpts, message: &str) {
    if !global.quiet {
        eprintln!("✓ {message}");
    }
}

/// Parse a user-supplied mode, refusing anything the provider does not
/// document as writable.
fn parse_mode(raw: &str) -> Result<SetpointMode, CliError> {
    match SetpointMode::from(raw) {
        SetpointMode::Other(other) => Err(CliError::Validation {
            field: "mode".into(),
            reason: format!(
                "unknown mode '{other}'. Valid modes: off, manual, auto, autoBypass, away, \
                 frostProtection"
            ),
        }),
        mode => Ok(mode),
    }
}

pub async fn thermostat(
    controller: &Controller,
    args: ThermostatArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        ThermostatCommand::Setpoint { id, celsius } => {
            controller.set_setpoint(id, celsius).await?;
            done(global, &format!("Setpoint of {id} set to {celsius:.1} °C"));
        }
        ThermostatCommand::Mode { id, mode } => {
            let mode = parse_mode(&mode)?;
            controller.set_setpoint_mode(id, mode.clone()).await?;
            done(global, &format!("Mode of {id} set to {mode}"));
        }
    }
    Ok(())
}

pub async fn switch(
    controller: &Controller,
    args: SwitchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (id, on) = match args.command {
        SwitchCommand::On { id } => (id, true),
        SwitchCommand::Off { id } => (id, false),
    };
    controller.set_switch(id, on).await?;
    done(global, &format!("Switch {id} turned {}", if on { "on" } else { "off" }));
    Ok(())
}

pub async fn dimmer(
    controller: &Controller,
    args: DimmerArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        DimmerCommand::On { id } => {
            controller.set_dimmer(id, true).await?;
            done(global, &format!("Dimmer {id} turned on"));
        }
        DimmerCommand::Off { id } => {
            controller.set_dimmer(id, false).await?;
            done(global, &format!("Dimmer {id} turned off"));
        }
        DimmerCommand::Set { id, intensity } => {
            controller.set_intensity(id, intensity).await?;
            done(global, &format!("Dimmer {id} set to {intensity}%"));
        }
    }
    Ok(())
}
