//! `ayla set <dsn> <property> <value>`: write a datapoint.

use std::collections::BTreeMap;

use ayla_core::{Datapoint, DeviceManager};

use crate::cli::{GlobalOpts, SetArgs};
use crate::error::CliError;
use crate::output;

use super::find_device;

/// JSON literals (`1`, `true`, `2.5`) pass through; anything else is sent
/// as a string and coerced by the property's base type.
pub(crate) fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_owned()))
}

fn detail(dp: &Datapoint) -> String {
    let mut lines = vec![format!("Value:    {}", dp.value)];
    if let Some(ref id) = dp.id {
        lines.push(format!("ID:       {id}"));
    }
    if let Some(ref at) = dp.created_at {
        lines.push(format!("Created:  {at}"));
    }
    if let Some(ref at) = dp.acked_at {
        lines.push(format!("Acked:    {at}"));
    }
    if let Some(status) = dp.ack_status {
        lines.push(format!("Status:   {status}"));
    }
    lines.join("\n")
}

pub async fn handle(
    args: SetArgs,
    manager: &DeviceManager,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let device = find_device(manager, &args.dsn)?;
    let metadata = (!args.metadata.is_empty())
        .then(|| args.metadata.into_iter().collect::<BTreeMap<_, _>>());

    let datapoint = device
        .create_datapoint(
            &args.property,
            parse_value(&args.value),
            metadata,
            args.ack_timeout,
        )
        .await?;

    let rendered = output::render_single(global.output, &datapoint, detail, |dp| {
        dp.value.to_string()
    })?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_literals_pass_through() {
        assert_eq!(parse_value("1"), serde_json::json!(1));
        assert_eq!(parse_value("true"), serde_json::json!(true));
        assert_eq!(parse_value("hello"), serde_json::json!("hello"));
        assert_eq!(parse_value("\"7\""), serde_json::json!("7"));
    }
}
