//!
//! # Desired resources
//!
//! Names, labels and desired state of every object owned by a Stargate
//!
mod deployment;
mod monitor;
mod patch;
mod service;

use std::collections::BTreeMap;

use k8_types::{InputObjectMeta, K8Obj, ObjectMeta};
use sha2::{Digest, Sha256};

use stargate_metadata::datacenter::CassandraDatacenterSpec;
use stargate_metadata::deployment::LabelSelector;
use stargate_metadata::stargate::{STARGATE_LABEL, StargateSpec};

use crate::config::OperatorConfig;

pub use deployment::*;
pub use patch::*;

pub const RACK_LABEL: &str = "k8ssandra.io/rack";
pub const RESOURCE_HASH_ANNOTATION: &str = "k8ssandra.io/resource-hash";

const NAME_LABEL: &str = "app.kubernetes.io/name";
const PART_OF_LABEL: &str = "app.kubernetes.io/part-of";
const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// lowercase, with `_` and `.` mapped to `-`
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '_' | '.' => '-',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

pub fn deployment_name(cluster: &str, datacenter: &str, partition: &str) -> String {
    sanitize(&format!("{cluster}-{datacenter}-{partition}-stargate"))
}

pub fn service_name(cluster: &str, datacenter: &str) -> String {
    sanitize(&format!("{cluster}-{datacenter}-stargate-service"))
}

pub fn service_monitor_name(stargate: &str) -> String {
    sanitize(&format!("{stargate}-stargate-servicemonitor"))
}

/// labels put on every object owned by the Stargate
pub fn stargate_labels(stargate: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (STARGATE_LABEL.to_owned(), stargate.to_owned()),
        (NAME_LABEL.to_owned(), "stargate".to_owned()),
        (PART_OF_LABEL.to_owned(), "k8ssandra".to_owned()),
        (MANAGED_BY_LABEL.to_owned(), "stargate-operator".to_owned()),
    ])
}

/// selects every object owned by the Stargate
pub fn stargate_selector(stargate: &str) -> LabelSelector {
    LabelSelector::new_labels([(STARGATE_LABEL, stargate)])
}

pub fn is_owned_by(metadata: &ObjectMeta, owner: &ObjectMeta) -> bool {
    metadata
        .owner_references
        .iter()
        .any(|reference| reference.uid == owner.uid)
}

/// sha256 of the serialized value, hex encoded
pub fn resource_hash<T: serde::Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Everything the desired state of a Stargate depends on.
#[derive(Debug, Clone)]
pub struct StargateResources {
    stargate: K8Obj<StargateSpec>,
    datacenter_name: String,
    datacenter: CassandraDatacenterSpec,
    config: OperatorConfig,
}

impl StargateResources {
    pub fn new(
        stargate: K8Obj<StargateSpec>,
        datacenter: &K8Obj<CassandraDatacenterSpec>,
        config: OperatorConfig,
    ) -> Self {
        Self {
            stargate,
            datacenter_name: datacenter.metadata.name.clone(),
            datacenter: datacenter.spec.clone(),
            config,
        }
    }

    pub fn stargate(&self) -> &K8Obj<StargateSpec> {
        &self.stargate
    }

    pub fn name(&self) -> &str {
        &self.stargate.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.stargate.metadata.namespace
    }

    pub fn datacenter(&self) -> &CassandraDatacenterSpec {
        &self.datacenter
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    pub fn deployment_name(&self, partition: &str) -> String {
        deployment_name(&self.datacenter.cluster_name, &self.datacenter_name, partition)
    }

    pub fn service_name(&self) -> String {
        service_name(&self.datacenter.cluster_name, &self.datacenter_name)
    }

    pub fn service_monitor_name(&self) -> String {
        service_monitor_name(self.name())
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        stargate_labels(self.name())
    }

    pub fn selector(&self) -> LabelSelector {
        stargate_selector(self.name())
    }

    pub fn owns(&self, metadata: &ObjectMeta) -> bool {
        is_owned_by(metadata, &self.stargate.metadata)
    }

    /// metadata for a new object controlled by the Stargate
    fn owned_meta(
        &self,
        name: String,
        labels: BTreeMap<String, String>,
        annotations: BTreeMap<String, String>,
    ) -> InputObjectMeta {
        let owner_ref = self.stargate.metadata.make_owner_reference::<StargateSpec>();
        InputObjectMeta {
            name,
            namespace: self.namespace().to_owned(),
            labels: labels.into_iter().collect(),
            annotations: annotations.into_iter().collect(),
            owner_references: vec![owner_ref],
            ..Default::default()
        }
    }
}

#[cfg(test)]
pub(crate) mod fixture {

    use k8_types::K8Obj;

    use stargate_metadata::datacenter::{CassandraDatacenterSpec, Rack};
    use stargate_metadata::stargate::StargateSpec;

    use crate::config::OperatorConfig;

    use super::StargateResources;

    pub fn stargate(name: &str, spec: StargateSpec) -> K8Obj<StargateSpec> {
        let mut obj = K8Obj::new(name, spec);
        obj.metadata.namespace = "default".to_owned();
        obj.metadata.uid = format!("{name}-uid");
        obj
    }

    pub fn single_rack() -> StargateResources {
        let datacenter = K8Obj::new(
            "dc1",
            CassandraDatacenterSpec {
                cluster_name: "test".to_owned(),
                server_version: "3.11.10".to_owned(),
                size: 1,
                ..Default::default()
            },
        );
        StargateResources::new(
            stargate("dc1-stargate", StargateSpec::new("dc1", 1)),
            &datacenter,
            OperatorConfig::default(),
        )
    }

    pub fn multi_rack() -> StargateResources {
        let datacenter = K8Obj::new(
            "dc2",
            CassandraDatacenterSpec {
                cluster_name: "cluster1".to_owned(),
                server_version: "3.11.10".to_owned(),
                size: 9,
                racks: vec![
                    Rack::with_zone("rack1", "us-east-1a"),
                    Rack::with_zone("rack2", "us-east-1b"),
                    Rack::with_zone("rack3", "us-east-1c"),
                ],
                ..Default::default()
            },
        );
        StargateResources::new(
            stargate("dc2-stargate", StargateSpec::new("dc2", 3)),
            &datacenter,
            OperatorConfig::default(),
        )
    }
}
