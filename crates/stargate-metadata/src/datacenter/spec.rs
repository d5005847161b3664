use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CassandraDatacenterSpec {
    pub cluster_name: String,
    #[serde(default)]
    pub server_type: ServerType,
    #[serde(default)]
    pub server_version: String,
    #[serde(default)]
    pub size: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub racks: Vec<Rack>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    #[default]
    Cassandra,
    Dse,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rack {
    pub name: String,
    /// node labels pods of this rack are pinned to
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_affinity_labels: BTreeMap<String, String>,
    /// deprecated, maps to the `topology.kubernetes.io/zone` label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

pub const ZONE_LABEL: &str = "topology.kubernetes.io/zone";

impl Rack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_zone(name: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_affinity_labels: BTreeMap::from([(ZONE_LABEL.to_owned(), zone.into())]),
            zone: None,
        }
    }

    /// Effective node labels.
    ///
    /// The deprecated zone is used only when no explicit zone label is given.
    pub fn affinity_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.node_affinity_labels.clone();
        if let Some(zone) = &self.zone {
            labels
                .entry(ZONE_LABEL.to_owned())
                .or_insert_with(|| zone.clone());
        }
        labels
    }
}

impl CassandraDatacenterSpec {
    /// Cassandra major line used to pick the Stargate image, `3_11` or `4_0`
    pub fn cassandra_line(&self) -> &'static str {
        if self.server_version.starts_with('4') {
            "4_0"
        } else {
            "3_11"
        }
    }
}
