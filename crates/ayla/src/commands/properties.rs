//! `ayla properties <dsn>`: show a device's properties.

use ayla_core::{DeviceManager, Property};
use tabled::Tabled;

use crate::cli::{GlobalOpts, PropertiesArgs};
use crate::error::CliError;
use crate::output;

use super::find_device;

#[derive(Tabled)]
struct PropertyRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    base_type: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Dir")]
    direction: String,
    #[tabled(rename = "Updated")]
    updated: String,
    #[tabled(rename = "Source")]
    source: String,
}

impl From<&Property> for PropertyRow {
    fn from(p: &Property) -> Self {
        Self {
            name: p.name.clone(),
            base_type: p.base_type.to_string(),
            value: p
                .value
                .as_ref()
                .map_or_else(|| "-".into(), ToString::to_string),
            direction: p.direction.clone().unwrap_or_default(),
            updated: p.data_updated_at.clone().unwrap_or_default(),
            source: p
                .last_update_source
                .map(|s| s.to_string())
                .unwrap_or_default(),
        }
    }
}

pub async fn handle(
    args: PropertiesArgs,
    manager: &DeviceManager,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let device = find_device(manager, &args.dsn)?;

    let properties = if args.names.is_empty() {
        device.properties().await
    } else {
        device.fetch_properties(Some(&args.names)).await?
    };

    let rendered = output::render_list(
        global.output,
        &properties,
        |p: &Property| PropertyRow::from(p),
        |p| {
            format!(
                "{}={}",
                p.name,
                p.value.as_ref().map(ToString::to_string).unwrap_or_default()
            )
        },
    )?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}
