//! `watch`: stream state changes from the poll tasks until Ctrl-C.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use neviweb_core::{Controller, DeviceFamily, DeviceState};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct WatchEvent<'a> {
    at: DateTime<Utc>,
    device_id: i64,
    name: &'a str,
    state: &'a DeviceState,
}

fn one_line(state: &DeviceState, color: bool) -> String {
    match state {
        DeviceState::Thermostat(t) => {
            let temp = t
                .room_temperature
                .map_or_else(|| "-".into(), |v| format!("{v:.1} °C"));
            let target = t
                .room_setpoint
                .map_or_else(|| "-".into(), |v| format!("{v:.1} °C"));
            let mode = t
                .setpoint_mode
                .as_ref()
                .map_or_else(|| "-".into(), ToString::to_string);
            let heat = t.output_percent.unwrap_or(0.0);
            format!("{temp} -> {target} ({mode}), heating {heat:.0}%")
        }
        DeviceState::Switch(s) => output::on_off(s.on, color),
        DeviceState::Dimmer(d) => format!("{} {}%", output::on_off(d.on, color), d.intensity),
    }
}

fn print_event(global: &GlobalOpts, device_id: i64, name: &str, state: &DeviceState) {
    let event = WatchEvent {
        at: Utc::now(),
        device_id,
        name,
        state,
    };
    let line = match global.output {
        OutputFormat::Table => format!(
            "{}  {device_id:>8}  {name:<24}  {}",
            event.at.with_timezone(&Local).format("%H:%M:%S"),
            one_line(state, output::should_color(&global.color))
        ),
        OutputFormat::Plain => format!("{device_id} {}", super::state::summary(state)),
        // One document per line, whatever the structured format.
        OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => {
            serde_json::to_string(&event).unwrap_or_default()
        }
    };
    output::print_output(&line, global.quiet);
}

fn wanted(filter: Option<DeviceFamily>, family: DeviceFamily) -> bool {
    filter.is_none_or(|f| f == family)
}

pub async fn handle(
    controller: &Controller,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut changes = controller.subscribe();

    // Current states first; the poll tasks may already have published them.
    for device in controller.devices().iter() {
        if !wanted(args.family, device.family) {
            continue;
        }
        match controller.state(device.id).await {
            Ok(state) => print_event(global, device.id, &device.name, &state),
            Err(e) => tracing::warn!(device_id = device.id, error = %e, "initial read failed"),
        }
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            change = changes.recv() => match change {
                Ok(change) => {
                    // First reads were printed above.
                    if change.previous.is_none() || !wanted(args.family, change.current.family()) {
                        continue;
                    }
                    let name = controller
                        .device(change.device_id)
                        .map(|d| d.name.clone())
                        .unwrap_or_default();
                    print_event(global, change.device_id, &name, &change.current);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "watch fell behind, some changes were dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}
