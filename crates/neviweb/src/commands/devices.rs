//! Device command handlers.

use std::sync::Arc;

use tabled::Tabled;

use neviweb_core::{Controller, Device};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    family: String,
    #[tabled(rename = "SKU")]
    sku: String,
    #[tabled(rename = "Location")]
    location: String,
}

impl From<&Arc<Device>> for DeviceRow {
    fn from(d: &Arc<Device>) -> Self {
        Self {
            id: d.id,
            name: d.name.clone(),
            family: d.family.to_string(),
            sku: d.sku.clone(),
            location: d.location_id.map(|id| id.to_string()).unwrap_or_default(),
        }
    }
}

fn detail(d: &Arc<Device>) -> String {
    [
        format!("ID:         {}", d.id),
        format!("Name:       {}", d.name),
        format!("Type:       {}", d.family),
        format!("SKU:        {}", d.sku),
        format!("Vendor:     {}", d.vendor),
        format!("Identifier: {}", d.identifier),
        format!(
            "Gateway:    {}",
            d.parent_id.map_or_else(|| "-".into(), |id| id.to_string())
        ),
        format!(
            "Location:   {}",
            d.location_id.map_or_else(|| "-".into(), |id| id.to_string())
        ),
    ]
    .join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(
    controller: &Controller,
    args: DevicesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        DevicesCommand::List { family } => {
            let devices: Vec<Arc<Device>> = controller
                .devices()
                .iter()
                .filter(|d| family.is_none_or(|f| d.family == f))
                .cloned()
                .collect();
            let out = output::render_list(
                &global.output,
                &devices,
                |d| DeviceRow::from(d),
                |d| d.id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Get { id } => {
            let device = controller.device(id).ok_or_else(|| CliError::NotFound {
                resource_type: "device".into(),
                identifier: id.to_string(),
                list_command: "devices list".into(),
            })?;
            let out = output::render_single(&global.output, &device, detail, |d| d.id.to_string())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
