use std::collections::BTreeMap;

use k8_types::InputK8Obj;

use stargate_metadata::deployment::{
    Affinity, ContainerPort, ContainerSpec, DeploymentSpec, EnvVar, HttpGetAction, LabelSelector,
    PodSpec, PodTemplateSpec, Probe, PullPolicy, TemplateMeta,
};
use stargate_metadata::stargate::{ContainerImage, STARGATE_LABEL};

use crate::planner::Partition;

use super::{RACK_LABEL, RESOURCE_HASH_ANNOTATION, StargateResources, resource_hash};

pub const STARGATE_CONTAINER: &str = "stargate";

pub const GRAPHQL_PORT: u16 = 8080;
pub const AUTHORIZATION_PORT: u16 = 8081;
pub const HTTP_PORT: u16 = 8082;
pub const HEALTH_PORT: u16 = 8084;
pub const CQL_PORT: u16 = 9042;
pub const GRPC_PORT: u16 = 8090;

const DEFAULT_IMAGE_REGISTRY: &str = "docker.io";
const DEFAULT_IMAGE_REPOSITORY: &str = "stargateio";
const DEFAULT_HEAP_SIZE: &str = "256M";

impl StargateResources {
    /// `<registry>/stargate-<line>:v<version>`, or the image pinned by the resource
    pub fn image(&self) -> String {
        let default_name = format!("stargate-{}", self.datacenter().cassandra_line());
        let default_tag = format!("v{}", self.config().default_version);

        match &self.stargate().spec.container_image {
            None => format!(
                "{}/{default_name}:{default_tag}",
                self.config().image_registry
            ),
            Some(ContainerImage {
                registry,
                repository,
                name,
                tag,
                ..
            }) => format!(
                "{}/{}/{}:{}",
                registry.as_deref().unwrap_or(DEFAULT_IMAGE_REGISTRY),
                repository.as_deref().unwrap_or(DEFAULT_IMAGE_REPOSITORY),
                name.as_deref().unwrap_or(&default_name),
                tag.as_deref().unwrap_or(&default_tag)
            ),
        }
    }

    fn pull_policy(&self) -> PullPolicy {
        self.stargate()
            .spec
            .container_image
            .as_ref()
            .and_then(|image| image.pull_policy)
            .unwrap_or_default()
    }

    /// ENABLE_AUTH is always the last variable
    fn env(&self, partition: &Partition) -> Vec<EnvVar> {
        let datacenter = self.datacenter();
        let heap = self
            .stargate()
            .spec
            .heap_size
            .as_deref()
            .unwrap_or(DEFAULT_HEAP_SIZE);

        vec![
            EnvVar::new("CLUSTER_NAME", datacenter.cluster_name.clone()),
            EnvVar::new(
                "CLUSTER_VERSION",
                datacenter.cassandra_line().replace('_', "."),
            ),
            EnvVar::new("DATACENTER_NAME", self.datacenter_name.clone()),
            EnvVar::new("RACK_NAME", partition.name.clone()),
            EnvVar::new(
                "SEED",
                format!("{}-seed-service", super::sanitize(&datacenter.cluster_name)),
            ),
            EnvVar::new(
                "JAVA_OPTS",
                format!("-XX:+CrashOnOutOfMemoryError -Xms{heap} -Xmx{heap}"),
            ),
            EnvVar::new(
                "ENABLE_AUTH",
                self.stargate().spec.auth_enabled().to_string(),
            ),
        ]
    }

    fn container_ports(&self) -> Vec<ContainerPort> {
        vec![
            ContainerPort::tcp("graphql", GRAPHQL_PORT),
            ContainerPort::tcp("authorization", AUTHORIZATION_PORT),
            ContainerPort::tcp("http", HTTP_PORT),
            ContainerPort::tcp("health", HEALTH_PORT),
            ContainerPort::tcp("metrics", self.config().metrics_port),
            ContainerPort::tcp("native", CQL_PORT),
            ContainerPort::tcp("grpc", GRPC_PORT),
        ]
    }

    /// rack override, then Stargate wide override, then the rack topology
    fn affinity(&self, partition: &Partition) -> Option<Affinity> {
        let spec = &self.stargate().spec;
        spec.rack_template(&partition.name)
            .and_then(|template| template.affinity.clone())
            .or_else(|| spec.affinity.clone())
            .or_else(|| Affinity::required_labels(&partition.affinity_labels))
    }

    fn node_selector(&self, partition: &Partition) -> BTreeMap<String, String> {
        let spec = &self.stargate().spec;
        let mut selector = spec.node_selector.clone();
        if let Some(template) = spec.rack_template(&partition.name) {
            selector.extend(template.node_selector.clone());
        }
        selector
    }

    fn partition_labels(&self, partition: &Partition) -> BTreeMap<String, String> {
        let mut labels = self.labels();
        labels.insert(RACK_LABEL.to_owned(), partition.name.clone());
        labels
    }

    pub fn deployment_spec(&self, partition: &Partition) -> DeploymentSpec {
        let labels = self.partition_labels(partition);

        let container = ContainerSpec {
            name: STARGATE_CONTAINER.to_owned(),
            image: self.image(),
            image_pull_policy: Some(self.pull_policy()),
            env: self.env(partition),
            ports: self.container_ports(),
            readiness_probe: Some(Probe {
                http_get: HttpGetAction {
                    path: "/checker/readiness".to_owned(),
                    port: HEALTH_PORT,
                },
                initial_delay_seconds: 30,
                period_seconds: 10,
                failure_threshold: 5,
            }),
            liveness_probe: Some(Probe {
                http_get: HttpGetAction {
                    path: "/checker/liveness".to_owned(),
                    port: HEALTH_PORT,
                },
                initial_delay_seconds: 30,
                period_seconds: 10,
                failure_threshold: 5,
            }),
        };

        DeploymentSpec {
            replicas: Some(partition.target_replicas),
            selector: LabelSelector::new_labels([
                (STARGATE_LABEL, self.name()),
                (RACK_LABEL, partition.name.as_str()),
            ]),
            template: PodTemplateSpec {
                metadata: TemplateMeta {
                    labels,
                    ..Default::default()
                },
                spec: PodSpec {
                    containers: vec![container],
                    service_account_name: self.stargate().spec.service_account.clone(),
                    node_selector: self.node_selector(partition),
                    affinity: self.affinity(partition),
                },
            },
        }
    }

    /// Desired Deployment for one partition.
    ///
    /// The hash of the desired spec is stored as an annotation, recording which
    /// revision of the Stargate was last applied.
    pub fn desired_deployment(
        &self,
        partition: &Partition,
    ) -> Result<InputK8Obj<DeploymentSpec>, serde_json::Error> {
        let spec = self.deployment_spec(partition);
        let annotations = BTreeMap::from([(
            RESOURCE_HASH_ANNOTATION.to_owned(),
            resource_hash(&spec)?,
        )]);

        let metadata = self.owned_meta(
            self.deployment_name(&partition.name),
            self.partition_labels(partition),
            annotations,
        );
        Ok(InputK8Obj::new(spec, metadata))
    }
}
