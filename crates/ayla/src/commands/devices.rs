//! `ayla devices`: list the account's devices.

use ayla_core::{DataSource, Device, DeviceFilter, DeviceInfo, DeviceManager, Property};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::{DevicesArgs, GlobalOpts, StatusFilter};
use crate::error::CliError;
use crate::output;

// ── Views ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct DeviceView {
    #[serde(flatten)]
    info: DeviceInfo,
    lan_active: bool,
    last_update_source: Option<DataSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    properties: Option<Vec<Property>>,
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "DSN")]
    dsn: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Type")]
    dtype: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "LAN IP")]
    lan_ip: String,
    #[tabled(rename = "Props")]
    properties: String,
}

impl DeviceRow {
    fn from_view(v: &DeviceView, color: bool) -> Self {
        Self {
            dsn: v.info.dsn.clone(),
            name: v.info.product_name.clone().unwrap_or_default(),
            model: v.info.oem_model.clone().unwrap_or_default(),
            dtype: v.info.device_type.to_string(),
            status: output::status_label(&v.info.connection_status.to_string(), color),
            lan_ip: v.info.lan_ip.clone().unwrap_or_default(),
            properties: v
                .properties
                .as_ref()
                .map(|p| p.len().to_string())
                .unwrap_or_default(),
        }
    }
}

async fn view(device: &Device, with_properties: bool) -> DeviceView {
    DeviceView {
        info: (*device.info()).clone(),
        lan_active: device.is_lan_active(),
        last_update_source: device.last_update_source().await,
        properties: if with_properties {
            Some(device.properties().await)
        } else {
            None
        },
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    args: DevicesArgs,
    manager: &DeviceManager,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let filter = match args.status {
        Some(StatusFilter::Online) => DeviceFilter::Online,
        Some(StatusFilter::Offline) => DeviceFilter::Offline,
        None => DeviceFilter::All,
    };

    let mut views = Vec::new();
    for device in manager.devices().iter().filter(|d| filter.matches(d)) {
        views.push(view(device, args.properties).await);
    }

    let color = output::should_color(global.color);
    let rendered = output::render_list(
        global.output,
        &views,
        |v| DeviceRow::from_view(v, color),
        |v| v.info.dsn.clone(),
    )?;
    output::print_output(&rendered, global.quiet);

    if !global.quiet {
        for (dsn, err) in manager.init_errors() {
            tracing::warn!(%dsn, error = %err, "device not fully initialized");
        }
    }
    Ok(())
}
