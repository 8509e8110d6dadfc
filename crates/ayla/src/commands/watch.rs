//! `ayla watch`: follow device changes until Ctrl-C.
//!
//! Every device channel is merged into one `StreamMap` keyed by DSN.
//! Devices added to the account later are picked up from the manager's
//! list events.

use ayla_core::{Change, DeviceEvent, DeviceManager, ManagerEvent};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::StreamExt;
use tokio_stream::StreamMap;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

// ── Event lines ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WatchLine {
    at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    dsn: Option<String>,
    kind: &'static str,
    detail: serde_json::Value,
}

impl WatchLine {
    fn new(dsn: Option<&str>, kind: &'static str, detail: serde_json::Value) -> Self {
        Self {
            at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            dsn: dsn.map(str::to_owned),
            kind,
            detail,
        }
    }

    fn text(&self, color: bool) -> String {
        let who = self.dsn.as_deref().unwrap_or("*");
        format!(
            "{} {who} {:<13} {}",
            output::dim(&self.at, color),
            self.kind,
            self.detail
        )
    }
}

fn describe_device_event(dsn: &str, event: &DeviceEvent) -> WatchLine {
    use serde_json::json;

    match event {
        DeviceEvent::Changed { change, source } => match change {
            Change::Property(pc) => WatchLine::new(
                Some(dsn),
                "property",
                json!({
                    "name": pc.name,
                    "value": pc.property.value,
                    "fields": pc.fields,
                    "source": source,
                }),
            ),
            Change::Field(fc) => WatchLine::new(
                Some(dsn),
                "device",
                json!({ "fields": fc.fields, "source": source }),
            ),
            Change::PropertyList(lc) => WatchLine::new(
                Some(dsn),
                "property_list",
                json!({ "added": lc.added, "removed": lc.removed }),
            ),
        },
        DeviceEvent::Error(err) => {
            WatchLine::new(Some(dsn), "error", json!({ "message": err.to_string() }))
        }
        DeviceEvent::LanStateChanged { active, error } => WatchLine::new(
            Some(dsn),
            "lan",
            json!({ "active": active, "error": error }),
        ),
        DeviceEvent::Acked { name, datapoint } => WatchLine::new(
            Some(dsn),
            "ack",
            json!({
                "name": name,
                "id": datapoint.id,
                "status": datapoint.ack_status,
                "message": datapoint.ack_message,
            }),
        ),
    }
}

fn describe_manager_event(event: &ManagerEvent) -> Option<WatchLine> {
    use serde_json::json;

    let line = match event {
        ManagerEvent::StateChanged { old, new } => {
            WatchLine::new(None, "state", json!({ "old": old, "new": new }))
        }
        ManagerEvent::DeviceListChanged(change) => WatchLine::new(
            None,
            "device_list",
            json!({ "added": change.added, "removed": change.removed }),
        ),
        ManagerEvent::Error(err) => {
            WatchLine::new(None, "error", json!({ "message": err.to_string() }))
        }
        ManagerEvent::InitComplete { .. } | ManagerEvent::InitFailed(_) => return None,
    };
    Some(line)
}

fn emit(line: &WatchLine, global: &GlobalOpts, color: bool) -> Result<(), CliError> {
    let rendered = match global.output {
        OutputFormat::Table | OutputFormat::Plain => line.text(color),
        // One JSON document per line, whatever the requested style.
        OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => {
            output::render_json(line, true)?
        }
    };
    output::print_output(&rendered, global.quiet);
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    args: WatchArgs,
    manager: &DeviceManager,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let wanted = |dsn: &str| args.dsns.is_empty() || args.dsns.iter().any(|d| d == dsn);
    let color = output::should_color(global.color);

    let mut devices: StreamMap<String, BroadcastStream<DeviceEvent>> = StreamMap::new();
    for device in manager.devices().iter().filter(|d| wanted(d.dsn())) {
        devices.insert(device.dsn().to_owned(), BroadcastStream::new(device.subscribe()));
    }
    debug!(devices = devices.len(), "watching");

    let mut manager_events = manager.subscribe();
    let mut stream_state = manager.context().subscribe_stream_state();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            biased;
            _ = &mut ctrl_c => break,
            event = manager_events.recv() => match event {
                Ok(event) => {
                    if let ManagerEvent::DeviceListChanged(ref change) = event {
                        for dsn in change.added.iter().filter(|d| wanted(d.as_str())) {
                            if let Some(device) = manager.device(dsn) {
                                devices.insert(dsn.clone(), BroadcastStream::new(device.subscribe()));
                            }
                        }
                        for dsn in &change.removed {
                            devices.remove(dsn);
                        }
                    }
                    if let Some(line) = describe_manager_event(&event) {
                        emit(&line, global, color)?;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "manager events dropped"),
                Err(RecvError::Closed) => break,
            },
            Ok(()) = stream_state.changed() => {
                let state = *stream_state.borrow_and_update();
                let line = WatchLine::new(None, "stream", serde_json::json!({ "state": state }));
                emit(&line, global, color)?;
            }
            Some((dsn, item)) = devices.next() => match item {
                Ok(event) => emit(&describe_device_event(&dsn, &event), global, color)?,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(%dsn, skipped, "device events dropped");
                }
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ayla_core::{CoreError, ListChange};

    use super::*;

    #[test]
    fn lan_events_carry_the_dsn() {
        let line = describe_device_event(
            "AC000W1",
            &DeviceEvent::LanStateChanged {
                active: false,
                error: Some("key exchange failed".into()),
            },
        );
        assert_eq!(line.kind, "lan");
        assert_eq!(line.dsn.as_deref(), Some("AC000W1"));
        assert_eq!(line.detail["active"], serde_json::json!(false));
    }

    #[test]
    fn list_changes_describe_members() {
        let line = describe_manager_event(&ManagerEvent::DeviceListChanged(ListChange {
            added: vec!["AC2".into()],
            removed: vec![],
        }))
        .unwrap_or_else(|| panic!("list change should be described"));
        assert_eq!(line.kind, "device_list");
        assert_eq!(line.detail["added"], serde_json::json!(["AC2"]));

        let errors = Arc::new(ayla_core::InitErrors::new());
        assert!(describe_manager_event(&ManagerEvent::InitComplete { errors }).is_none());
    }

    #[test]
    fn acks_carry_status() {
        let mut datapoint = ayla_core::Datapoint::new(serde_json::json!("on"), None);
        datapoint.ack_status = Some(200);
        let line = describe_device_event(
            "AC000W1",
            &DeviceEvent::Acked {
                name: "cmd".into(),
                datapoint,
            },
        );
        assert_eq!(line.kind, "ack");
        assert_eq!(line.detail["status"], serde_json::json!(200));
    }

    #[test]
    fn errors_render_as_text() {
        let line = describe_device_event(
            "AC000W1",
            &DeviceEvent::Error(Arc::new(CoreError::Network {
                message: "refused".into(),
            })),
        );
        assert!(line.text(false).contains("refused"));
    }
}
