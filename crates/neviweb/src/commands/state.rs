//! Device state reads.

use neviweb_core::{Controller, DeviceState};

use crate::cli::{GlobalOpts, StateArgs};
use crate::error::CliError;
use crate::output;

fn celsius(value: Option<f64>) -> String {
    value.map_or_else(|| "-".into(), |v| format!("{v:.1} °C"))
}

/// Multi-line view of one state, used for the table format.
pub fn detail(state: &DeviceState, color: bool) -> String {
    match state {
        DeviceState::Thermostat(t) => {
            let mut lines = vec![
                format!("Temperature: {}", celsius(t.room_temperature)),
                format!("Setpoint:    {}", celsius(t.room_setpoint)),
                format!(
                    "Mode:        {}",
                    t.setpoint_mode
                        .as_ref()
                        .map_or_else(|| "-".into(), ToString::to_string)
                ),
                format!(
                    "Heating:     {}",
                    t.output_percent
                        .map_or_else(|| "-".into(), |p| format!("{p:.0}%"))
                ),
            ];
            if let Some(alarms) = t.alarms_active.filter(|a| *a != 0) {
                lines.push(format!("Alarms:      {alarms}"));
            }
            lines.join("\n")
        }
        DeviceState::Switch(s) => format!("Power:       {}", output::on_off(s.on, color)),
        DeviceState::Dimmer(d) => [
            format!("Power:       {}", output::on_off(d.on, color)),
            format!("Intensity:   {}%", d.intensity),
        ]
        .join("\n"),
    }
}

/// One-word summary for the plain format.
pub fn summary(state: &DeviceState) -> String {
    match state {
        DeviceState::Thermostat(t) => t
            .room_temperature
            .map_or_else(|| "-".into(), |v| format!("{v:.1}")),
        DeviceState::Switch(s) => output::on_off(s.on, false),
        DeviceState::Dimmer(d) if d.on => d.intensity.to_string(),
        DeviceState::Dimmer(_) => output::on_off(false, false),
    }
}

pub async fn handle(
    controller: &Controller,
    args: StateArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let state = if args.fresh {
        controller.fresh_state(args.id).await?
    } else {
        controller.state(args.id).await?
    };

    let color = output::should_color(&global.color);
    let out = output::render_single(&global.output, &state, |s| detail(s, color), summary)?;
    output::print_output(&out, global.quiet);
    Ok(())
}
