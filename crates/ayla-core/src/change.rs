// ── Change notifications ──
//
// Every mutation of a device or its properties produces at most one
// `Change`. Listeners receive them on the device's broadcast channel in
// mutation order.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::CoreError;
use crate::model::{DataSource, Datapoint, DeviceField, Property, PropertyField};

/// One or more descriptive device fields changed.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub fields: BTreeSet<DeviceField>,
}

/// A property changed. `property` is the state after the merge.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub name: String,
    pub fields: BTreeSet<PropertyField>,
    pub property: Property,
}

impl PropertyChange {
    pub fn contains(&self, field: PropertyField) -> bool {
        self.fields.contains(&field)
    }
}

/// Members were added to or removed from a collection (device list or a
/// device's property set).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListChange {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl ListChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Field(FieldChange),
    Property(PropertyChange),
    PropertyList(ListChange),
}

/// Events published on a device's channel.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Changed { change: Change, source: DataSource },
    /// A background operation (poll, forced fetch) failed.
    Error(Arc<CoreError>),
    /// LAN mode was entered or left. `error` explains an exit.
    LanStateChanged { active: bool, error: Option<String> },
    /// The device acknowledged a write over LAN. Published for every ack,
    /// whether or not the merge changed the property.
    Acked { name: String, datapoint: Datapoint },
}

impl DeviceEvent {
    /// The property change carried by this event, if any.
    pub fn property_change(&self) -> Option<&PropertyChange> {
        match self {
            Self::Changed {
                change: Change::Property(pc),
                ..
            } => Some(pc),
            _ => None,
        }
    }
}
