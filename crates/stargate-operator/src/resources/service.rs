use std::collections::BTreeMap;

use k8_types::InputK8Obj;

use stargate_metadata::service::{ServicePort, ServiceSpec};

use super::StargateResources;
use super::{AUTHORIZATION_PORT, CQL_PORT, GRAPHQL_PORT, GRPC_PORT, HEALTH_PORT, HTTP_PORT};

impl StargateResources {
    /// one service in front of every partition
    pub fn service_spec(&self) -> ServiceSpec {
        ServiceSpec {
            cluster_ip: None,
            ports: vec![
                ServicePort::tcp("graphql", GRAPHQL_PORT),
                ServicePort::tcp("authorization", AUTHORIZATION_PORT),
                ServicePort::tcp("http", HTTP_PORT),
                ServicePort::tcp("health", HEALTH_PORT),
                ServicePort::tcp("metrics", self.config().metrics_port),
                ServicePort::tcp("native", CQL_PORT),
                ServicePort::tcp("grpc", GRPC_PORT),
            ],
            selector: self.selector().match_labels,
        }
    }

    pub fn desired_service(&self) -> InputK8Obj<ServiceSpec> {
        let metadata = self.owned_meta(self.service_name(), self.labels(), BTreeMap::new());
        InputK8Obj::new(self.service_spec(), metadata)
    }
}

#[cfg(test)]
mod test {

    use stargate_metadata::stargate::STARGATE_LABEL;

    use crate::resources::fixture;

    #[test]
    fn test_service_selects_all_partitions() {
        let resources = fixture::multi_rack();
        let service = resources.desired_service();

        assert_eq!(service.metadata.name, "cluster1-dc2-stargate-service");
        assert_eq!(service.metadata.owner_references.len(), 1);
        assert_eq!(service.spec.selector.len(), 1);
        assert_eq!(
            service.spec.selector.get(STARGATE_LABEL).map(String::as_str),
            Some("dc2-stargate")
        );
        assert!(service.spec.cluster_ip.is_none());
        assert!(
            service
                .spec
                .ports
                .iter()
                .any(|port| port.name == "native" && port.port == 9042)
        );
    }
}
