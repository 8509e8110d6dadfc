// ── Transport selection ──
//
// Routes reads and writes to LAN or cloud. LAN is chosen only when a
// session is active and every property involved can travel over LAN.

use crate::model::Property;
use crate::store::PropertyStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Transport {
    Lan,
    Cloud,
}

/// LAN only if the session is active, names were given, and every name is
/// a known LAN-capable property.
pub fn choose_read_transport(
    lan_active: bool,
    store: &PropertyStore,
    names: Option<&[String]>,
) -> Transport {
    let Some(names) = names else {
        return Transport::Cloud;
    };
    if !lan_active || names.is_empty() {
        return Transport::Cloud;
    }
    let all_lan = names
        .iter()
        .all(|n| store.get(n).is_some_and(Property::supports_lan));
    if all_lan { Transport::Lan } else { Transport::Cloud }
}

pub fn choose_write_transport(lan_active: bool, property: &Property) -> Transport {
    if lan_active && property.supports_lan() {
        Transport::Lan
    } else {
        Transport::Cloud
    }
}
