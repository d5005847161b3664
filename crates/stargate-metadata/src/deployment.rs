//!
//! # Deployment
//!
//! apps/v1 Deployment, restricted to the fields the operator manages or observes
//!
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::k8_types::{Crd, DefaultHeader, Spec, Status};

use crd::DEPLOYMENT_API;
mod crd {

    use crate::k8_types::{Crd, CrdNames};

    pub const DEPLOYMENT_API: Crd = Crd {
        group: "apps",
        version: "v1",
        names: CrdNames {
            kind: "Deployment",
            plural: "deployments",
            singular: "deployment",
        },
    };
}

impl Spec for DeploymentSpec {
    type Status = DeploymentStatus;
    type Header = DefaultHeader;
    fn metadata() -> &'static Crd {
        &DEPLOYMENT_API
    }
}

impl Status for DeploymentStatus {}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default)]
    pub selector: LabelSelector,
    #[serde(default)]
    pub template: PodTemplateSpec,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    pub replicas: i32,
    pub ready_replicas: i32,
    pub available_replicas: i32,
    pub updated_replicas: i32,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn new_labels<K, V>(labels: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            match_labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// every selector label must be present with the same value
    pub fn matches<'a, I>(&self, labels: I) -> bool
    where
        I: IntoIterator<Item = (&'a String, &'a String)> + Clone,
    {
        self.match_labels.iter().all(|(key, value)| {
            labels
                .clone()
                .into_iter()
                .any(|(label_key, label_value)| label_key == key && label_value == value)
        })
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMeta {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplateSpec {
    #[serde(default)]
    pub metadata: TemplateMeta,
    #[serde(default)]
    pub spec: PodSpec,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<PullPolicy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ContainerPort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<Probe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<Probe>,
}

impl ContainerSpec {
    pub fn env_value(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|env| env.name == name)
            .map(|env| env.value.as_str())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum PullPolicy {
    Always,
    #[default]
    IfNotPresent,
    Never,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    pub name: String,
    pub container_port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

impl ContainerPort {
    pub fn tcp(name: impl Into<String>, container_port: u16) -> Self {
        Self {
            name: name.into(),
            container_port,
            protocol: default_protocol(),
        }
    }
}

pub(crate) fn default_protocol() -> String {
    "TCP".to_owned()
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    pub http_get: HttpGetAction,
    #[serde(default)]
    pub initial_delay_seconds: u32,
    #[serde(default)]
    pub period_seconds: u32,
    #[serde(default)]
    pub failure_threshold: u32,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
pub struct HttpGetAction {
    pub path: String,
    pub port: u16,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Affinity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_affinity: Option<NodeAffinity>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeAffinity {
    #[serde(
        rename = "requiredDuringSchedulingIgnoredDuringExecution",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub required: Option<NodeSelector>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelector {
    pub node_selector_terms: Vec<NodeSelectorTerm>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelectorTerm {
    #[serde(default)]
    pub match_expressions: Vec<NodeSelectorRequirement>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
pub struct NodeSelectorRequirement {
    pub key: String,
    pub operator: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl Affinity {
    /// Required node affinity, one `In` expression per label.
    ///
    /// Returns `None` for an empty label set so an unpinned partition carries no affinity.
    pub fn required_labels(labels: &BTreeMap<String, String>) -> Option<Self> {
        if labels.is_empty() {
            return None;
        }

        let match_expressions = labels
            .iter()
            .map(|(key, value)| NodeSelectorRequirement {
                key: key.clone(),
                operator: "In".to_owned(),
                values: vec![value.clone()],
            })
            .collect();

        Some(Self {
            node_affinity: Some(NodeAffinity {
                required: Some(NodeSelector {
                    node_selector_terms: vec![NodeSelectorTerm { match_expressions }],
                }),
            }),
        })
    }

    /// all required match expressions across terms
    pub fn required_expressions(&self) -> impl Iterator<Item = &NodeSelectorRequirement> {
        self.node_affinity
            .iter()
            .filter_map(|node| node.required.as_ref())
            .flat_map(|selector| selector.node_selector_terms.iter())
            .flat_map(|term| term.match_expressions.iter())
    }
}
