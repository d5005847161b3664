//!
//! # ServiceMonitor
//!
//! Prometheus operator scrape definition for the Stargate service
//!
use serde::{Deserialize, Serialize};

use crate::k8_types::{Crd, DefaultHeader, Spec, Status};
use crate::deployment::LabelSelector;

use crd::SERVICE_MONITOR_API;
mod crd {

    use crate::k8_types::{Crd, CrdNames};

    pub const SERVICE_MONITOR_API: Crd = Crd {
        group: "monitoring.coreos.com",
        version: "v1",
        names: CrdNames {
            kind: "ServiceMonitor",
            plural: "servicemonitors",
            singular: "servicemonitor",
        },
    };
}

impl Spec for ServiceMonitorSpec {
    type Status = ServiceMonitorStatus;
    type Header = DefaultHeader;
    fn metadata() -> &'static Crd {
        &SERVICE_MONITOR_API
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
pub struct ServiceMonitorStatus {}

impl Status for ServiceMonitorStatus {}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMonitorSpec {
    pub selector: LabelSelector,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// name of the service port to scrape
    pub port: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}
