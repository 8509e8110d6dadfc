// ── Per-device property store ──
//
// Ordered map of property name -> property. Merges return the changes
// they produced; publishing them is the owning device's job.

use ayla_api::stream_service::types::EventType;
use indexmap::IndexMap;

use crate::change::{Change, ListChange, PropertyChange};
use crate::error::CoreError;
use crate::model::{DataSource, Datapoint, Property};

#[derive(Debug, Clone, Default)]
pub struct PropertyStore {
    properties: IndexMap<String, Property>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<Property> {
        self.properties.values().cloned().collect()
    }

    /// Clone the named properties, in the order given. Unknown names are
    /// skipped.
    pub fn select(&self, names: &[String]) -> Vec<Property> {
        names
            .iter()
            .filter_map(|n| self.properties.get(n).cloned())
            .collect()
    }

    // ── Merges ───────────────────────────────────────────────────────

    /// Merge whole properties from a cloud fetch or the cache. Existing
    /// names yield one `Property` change each when anything differed; new
    /// names are inserted and reported together as one list change.
    pub fn merge_properties(&mut self, incoming: Vec<Property>, source: DataSource) -> Vec<Change> {
        let mut changes = Vec::new();
        let mut added = Vec::new();

        for mut property in incoming {
            if let Some(existing) = self.properties.get_mut(&property.name) {
                let fields = existing.merge_property(&property, source);
                if !fields.is_empty() {
                    changes.push(Change::Property(PropertyChange {
                        name: existing.name.clone(),
                        fields,
                        property: existing.clone(),
                    }));
                }
            } else {
                property.last_update_source = Some(source);
                added.push(property.name.clone());
                self.properties.insert(property.name.clone(), property);
            }
        }

        if !added.is_empty() {
            changes.push(Change::PropertyList(ListChange {
                added,
                removed: Vec::new(),
            }));
        }
        changes
    }

    /// Merge one datapoint into a known property.
    pub fn merge_datapoint(
        &mut self,
        name: &str,
        dp: &Datapoint,
        source: DataSource,
    ) -> Result<Option<PropertyChange>, CoreError> {
        let property = self
            .properties
            .get_mut(name)
            .ok_or_else(|| CoreError::invalid_argument(format!("Unknown property {name}")))?;

        let fields = property.merge_datapoint(dp, source)?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(PropertyChange {
            name: name.to_owned(),
            fields,
            property: property.clone(),
        }))
    }

    /// Merge a batch of datapoints atomically: every entry is validated
    /// (known name, coercible value) before any is applied.
    pub fn merge_datapoints(
        &mut self,
        batch: &[(String, Datapoint)],
        source: DataSource,
    ) -> Result<Vec<PropertyChange>, CoreError> {
        for (name, dp) in batch {
            let property = self.properties.get(name).ok_or_else(|| {
                CoreError::invalid_argument(format!("Unknown property {name} received"))
            })?;
            property.validate_datapoint(dp)?;
        }

        let mut changes = Vec::new();
        for (name, dp) in batch {
            if let Some(change) = self.merge_datapoint(name, dp, source)? {
                changes.push(change);
            }
        }
        Ok(changes)
    }

    /// Merge a datapoint delivered by the push channel. Unknown names are
    /// ignored, as are plain datapoint events on ack-enabled properties
    /// (their state only moves on the ack event).
    pub fn merge_event(
        &mut self,
        name: &str,
        dp: &Datapoint,
        event_type: EventType,
    ) -> Result<Option<PropertyChange>, CoreError> {
        let Some(property) = self.properties.get(name) else {
            return Ok(None);
        };
        match event_type {
            EventType::Datapoint if property.ack_enabled => Ok(None),
            EventType::Datapoint | EventType::DatapointAck => {
                self.merge_datapoint(name, dp, DataSource::Dss)
            }
            EventType::Connectivity => Ok(None),
        }
    }
}
