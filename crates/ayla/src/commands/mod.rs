//! Command handlers. Each one drives a started `DeviceManager`.

pub mod devices;
pub mod properties;
pub mod set;
pub mod watch;

use ayla_core::{Device, DeviceManager};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

pub async fn dispatch(
    cmd: Command,
    manager: &DeviceManager,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Devices(args) => devices::handle(args, manager, global).await,
        Command::Properties(args) => properties::handle(args, manager, global).await,
        Command::Set(args) => set::handle(args, manager, global).await,
        Command::Watch(args) => watch::handle(args, manager, global).await,
        Command::Completions(_) => Ok(()),
    }
}

/// Look a device up by DSN in the manager's collection.
pub(crate) fn find_device(manager: &DeviceManager, dsn: &str) -> Result<Device, CliError> {
    manager
        .device(dsn)
        .ok_or_else(|| CliError::device_not_found(dsn))
}
