// ── Device domain types ──

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Cloud connectivity as last reported by the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum ConnectionStatus {
    Online,
    #[default]
    Offline,
}

impl ConnectionStatus {
    /// Anything other than `"Online"` counts as offline.
    pub fn from_wire(s: Option<&str>) -> Self {
        match s {
            Some("Online") => Self::Online,
            _ => Self::Offline,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum DeviceType {
    #[default]
    Wifi,
    Gateway,
    Node,
}

impl DeviceType {
    pub fn from_wire(s: Option<&str>) -> Self {
        match s {
            Some(t) if t.eq_ignore_ascii_case("gateway") => Self::Gateway,
            Some(t) if t.eq_ignore_ascii_case("node") => Self::Node,
            _ => Self::Wifi,
        }
    }
}

/// How the device was registered to the account.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
pub enum RegistrationType {
    #[default]
    None,
    #[strum(serialize = "Same-LAN")]
    SameLan,
    #[strum(serialize = "Button-Push")]
    ButtonPush,
    #[strum(serialize = "AP-Mode")]
    ApMode,
    Display,
    Dsn,
    Node,
    Local,
}

impl RegistrationType {
    /// Unknown strings fall back to `None`.
    pub fn from_wire(s: Option<&str>) -> Self {
        s.and_then(|s| s.parse().ok()).unwrap_or_default()
    }
}

/// Present when the device is shared with (not owned by) the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub user_id: Option<String>,
    pub operation: Option<String>,
    pub start_date_at: Option<String>,
    pub end_date_at: Option<String>,
    pub role: Option<String>,
}

/// Fields tracked by [`DeviceInfo::update_from`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceField {
    ConnectionStatus,
    ConnectedAt,
    Grant,
    SwVersion,
    ProductName,
    ModuleUpdatedAt,
    LanIp,
    Ip,
    LanEnabled,
    RegistrationType,
    HasProperties,
    TemplateId,
    Mac,
    Model,
    OemModel,
    DeviceType,
    Key,
    Dsn,
}

/// Descriptive attributes of a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub dsn: String,
    pub key: Option<u64>,
    pub connection_status: ConnectionStatus,
    pub connected_at: Option<String>,
    pub lan_ip: Option<String>,
    pub ip: Option<String>,
    pub mac: Option<String>,
    pub product_name: Option<String>,
    pub product_class: Option<String>,
    pub model: Option<String>,
    pub oem_model: Option<String>,
    pub sw_version: Option<String>,
    pub template_id: Option<u64>,
    pub device_type: DeviceType,
    pub lan_enabled: bool,
    pub has_properties: Option<bool>,
    pub registration_type: RegistrationType,
    pub grant: Option<Grant>,
    /// Last OTA update of the module.
    pub module_updated_at: Option<String>,
}

impl DeviceInfo {
    pub fn is_node(&self) -> bool {
        self.device_type == DeviceType::Node
    }

    /// Shared devices carry a grant.
    pub fn is_shared(&self) -> bool {
        self.grant.is_some()
    }

    pub fn declares_properties(&self) -> bool {
        self.has_properties == Some(true)
    }

    /// Copy every tracked field from `other` and report which ones
    /// differed. The DSN is only replaced when `other` knows one.
    pub fn update_from(&mut self, other: &DeviceInfo) -> BTreeSet<DeviceField> {
        let mut changed = BTreeSet::new();

        macro_rules! track {
            ($field:ident, $name:expr) => {
                if self.$field != other.$field {
                    self.$field.clone_from(&other.$field);
                    changed.insert($name);
                }
            };
            (copy $field:ident, $name:expr) => {
                if self.$field != other.$field {
                    self.$field = other.$field;
                    changed.insert($name);
                }
            };
        }

        track!(copy connection_status, DeviceField::ConnectionStatus);
        track!(connected_at, DeviceField::ConnectedAt);
        track!(grant, DeviceField::Grant);
        track!(sw_version, DeviceField::SwVersion);
        track!(product_name, DeviceField::ProductName);
        track!(module_updated_at, DeviceField::ModuleUpdatedAt);
        track!(lan_ip, DeviceField::LanIp);
        track!(ip, DeviceField::Ip);
        track!(copy lan_enabled, DeviceField::LanEnabled);
        track!(copy registration_type, DeviceField::RegistrationType);
        track!(copy has_properties, DeviceField::HasProperties);
        track!(copy template_id, DeviceField::TemplateId);
        track!(mac, DeviceField::Mac);
        track!(model, DeviceField::Model);
        track!(oem_model, DeviceField::OemModel);
        track!(copy device_type, DeviceField::DeviceType);
        track!(copy key, DeviceField::Key);

        if !other.dsn.is_empty() && other.dsn != self.dsn {
            self.dsn.clone_from(&other.dsn);
            changed.insert(DeviceField::Dsn);
        }

        changed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn info(dsn: &str) -> DeviceInfo {
        DeviceInfo {
            dsn: dsn.into(),
            key: Some(1),
            lan_enabled: true,
            ..DeviceInfo::default()
        }
    }

    #[test]
    fn update_from_reports_only_differing_fields() {
        let mut current = info("AC000W1");
        let mut incoming = current.clone();
        incoming.connection_status = ConnectionStatus::Online;
        incoming.sw_version = Some("1.2".into());

        let changed = current.update_from(&incoming);
        assert_eq!(
            changed.into_iter().collect::<Vec<_>>(),
            vec![DeviceField::ConnectionStatus, DeviceField::SwVersion]
        );
        assert_eq!(current.sw_version.as_deref(), Some("1.2"));

        assert!(current.update_from(&incoming).is_empty());
    }

    #[test]
    fn empty_dsn_does_not_overwrite() {
        let mut current = info("AC000W1");
        let mut incoming = current.clone();
        incoming.dsn = String::new();
        assert!(current.update_from(&incoming).is_empty());
        assert_eq!(current.dsn, "AC000W1");
    }

    #[test]
    fn registration_type_uses_service_strings() {
        assert_eq!(
            RegistrationType::from_wire(Some("Same-LAN")),
            RegistrationType::SameLan
        );
        assert_eq!(
            RegistrationType::from_wire(Some("AP-Mode")),
            RegistrationType::ApMode
        );
        assert_eq!(RegistrationType::from_wire(Some("Dsn")), RegistrationType::Dsn);
        assert_eq!(RegistrationType::from_wire(Some("bogus")), RegistrationType::None);
        assert_eq!(RegistrationType::SameLan.as_ref(), "Same-LAN");
    }

    #[test]
    fn connection_status_defaults_to_offline() {
        assert_eq!(ConnectionStatus::from_wire(Some("Online")), ConnectionStatus::Online);
        assert_eq!(ConnectionStatus::from_wire(Some("Initializing")), ConnectionStatus::Offline);
        assert_eq!(ConnectionStatus::from_wire(None), ConnectionStatus::Offline);
    }
}
