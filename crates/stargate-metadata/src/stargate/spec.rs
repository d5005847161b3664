use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::deployment::{Affinity, PullPolicy};

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StargateSpec {
    /// total number of Stargate replicas across all racks
    #[serde(default = "default_size")]
    pub size: i32,
    pub datacenter_ref: DatacenterRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_image: Option<ContainerImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
    /// JVM heap, for example `256M`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heap_size: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    /// overrides the affinity derived from the rack topology, for all racks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
    /// per rack overrides, keyed by datacenter rack name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub racks: Vec<StargateRackTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<TelemetrySpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<bool>,
}

fn default_size() -> i32 {
    1
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
pub struct DatacenterRef {
    pub name: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_policy: Option<PullPolicy>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StargateRackTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus: Option<PrometheusTelemetrySpec>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusTelemetrySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// extra labels put on the ServiceMonitor
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub common_labels: BTreeMap<String, String>,
}

impl StargateSpec {
    pub fn new(datacenter: impl Into<String>, size: i32) -> Self {
        Self {
            size,
            datacenter_ref: DatacenterRef {
                name: datacenter.into(),
            },
            ..Default::default()
        }
    }

    /// authentication is on unless explicitly disabled
    pub fn auth_enabled(&self) -> bool {
        self.auth.unwrap_or(true)
    }

    pub fn prometheus_enabled(&self) -> bool {
        self.prometheus().and_then(|p| p.enabled).unwrap_or(false)
    }

    pub fn prometheus(&self) -> Option<&PrometheusTelemetrySpec> {
        self.telemetry.as_ref().and_then(|t| t.prometheus.as_ref())
    }

    pub fn rack_template(&self, rack: &str) -> Option<&StargateRackTemplate> {
        self.racks.iter().find(|template| template.name == rack)
    }

    /// toggle prometheus telemetry, keeping other telemetry settings
    pub fn set_prometheus(&mut self, enabled: bool) {
        self.telemetry
            .get_or_insert_with(TelemetrySpec::default)
            .prometheus
            .get_or_insert_with(PrometheusTelemetrySpec::default)
            .enabled = Some(enabled);
    }
}

#[cfg(test)]
mod test {

    use super::StargateSpec;

    #[test]
    fn test_spec_from_yaml() {
        let spec: StargateSpec = serde_yaml::from_str(
            r#"
datacenterRef:
  name: dc1
size: 3
heapSize: 384M
racks:
  - name: rack1
telemetry:
  prometheus:
    enabled: true
"#,
        )
        .expect("parse");

        assert_eq!(spec.datacenter_ref.name, "dc1");
        assert_eq!(spec.size, 3);
        assert!(spec.prometheus_enabled());
        assert!(spec.auth_enabled());
        assert!(spec.rack_template("rack1").is_some());
        assert!(spec.rack_template("rack2").is_none());
    }

    #[test]
    fn test_defaults() {
        let spec: StargateSpec =
            serde_json::from_str(r#"{"datacenterRef": {"name": "dc1"}}"#).expect("parse");
        assert_eq!(spec.size, 1);
        assert!(!spec.prometheus_enabled());
    }

    #[test]
    fn test_toggle_prometheus() {
        let mut spec = StargateSpec::new("dc1", 1);
        spec.set_prometheus(true);
        assert!(spec.prometheus_enabled());
        spec.set_prometheus(false);
        assert!(!spec.prometheus_enabled());
        assert!(spec.telemetry.is_some());
    }
}
