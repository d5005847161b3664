use std::collections::BTreeMap;

use k8_types::InputK8Obj;

use stargate_metadata::telemetry::{Endpoint, ServiceMonitorSpec};

use super::StargateResources;

const SCRAPE_INTERVAL: &str = "15s";

impl StargateResources {
    pub fn service_monitor_spec(&self) -> ServiceMonitorSpec {
        ServiceMonitorSpec {
            selector: self.selector(),
            endpoints: vec![Endpoint {
                port: "metrics".to_owned(),
                path: Some("/metrics".to_owned()),
                interval: Some(SCRAPE_INTERVAL.to_owned()),
            }],
        }
    }

    /// ServiceMonitor carrying the prometheus common labels on top of the Stargate labels
    pub fn desired_service_monitor(&self) -> InputK8Obj<ServiceMonitorSpec> {
        let mut labels = self.labels();
        if let Some(prometheus) = self.stargate().spec.prometheus() {
            for (key, value) in &prometheus.common_labels {
                labels.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        let metadata = self.owned_meta(self.service_monitor_name(), labels, BTreeMap::new());
        InputK8Obj::new(self.service_monitor_spec(), metadata)
    }
}
