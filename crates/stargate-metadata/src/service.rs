use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::k8_types::{Crd, DefaultHeader, Spec, Status};
use crate::deployment::default_protocol;

use crd::SERVICE_API;
mod crd {

    use crate::k8_types::{Crd, CrdNames};

    pub const SERVICE_API: Crd = Crd {
        group: "core",
        version: "v1",
        names: CrdNames {
            kind: "Service",
            plural: "services",
            singular: "service",
        },
    };
}

impl Spec for ServiceSpec {
    type Status = ServiceStatus;
    type Header = DefaultHeader;
    fn metadata() -> &'static Crd {
        &SERVICE_API
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
pub struct ServiceStatus {}

impl Status for ServiceStatus {}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// assigned by the api server, never set by the operator
    #[serde(rename = "clusterIP", default, skip_serializing_if = "Option::is_none")]
    pub cluster_ip: Option<String>,
    #[serde(default)]
    pub ports: Vec<ServicePort>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    pub name: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u16>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

impl ServicePort {
    pub fn tcp(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
            target_port: None,
            protocol: default_protocol(),
        }
    }
}

impl ServiceSpec {
    /// true if the managed fields are the same, ignoring fields assigned by the cluster
    pub fn same_routing(&self, other: &Self) -> bool {
        self.selector == other.selector && self.ports == other.ports
    }
}
