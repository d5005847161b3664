use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::condition::{Condition, find_condition};

pub const READY_CONDITION: &str = "Ready";

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct StargateStatus {
    /// absent until the first pass after the datacenter is ready
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<StargateProgress>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    pub replicas: i32,
    pub ready_replicas: i32,
    pub available_replicas: i32,
    pub updated_replicas: i32,
    /// `<readyReplicas>/<replicas>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_replicas_ratio: Option<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub deployment_refs: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_ref: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Eq, PartialEq)]
pub enum StargateProgress {
    Deploying,
    Running,
}

impl fmt::Display for StargateProgress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Deploying => write!(f, "Deploying"),
            Self::Running => write!(f, "Running"),
        }
    }
}

impl StargateStatus {
    pub fn ready_condition(&self) -> Option<&Condition> {
        find_condition(&self.conditions, READY_CONDITION)
    }

    pub fn is_ready(&self) -> bool {
        self.ready_condition().is_some_and(Condition::is_true)
    }

    pub fn is_running(&self) -> bool {
        self.progress == Some(StargateProgress::Running)
    }
}

#[cfg(test)]
mod test {

    use crate::condition::{Condition, ConditionStatus};

    use super::{StargateProgress, StargateStatus};

    #[test]
    fn test_status_wire_format() {
        let status = StargateStatus {
            progress: Some(StargateProgress::Running),
            conditions: vec![Condition::new("Ready", ConditionStatus::True)],
            replicas: 1,
            ready_replicas: 1,
            ready_replicas_ratio: Some("1/1".to_owned()),
            deployment_refs: ["test-dc1-default-stargate".to_owned()].into(),
            service_ref: Some("test-dc1-stargate-service".to_owned()),
            ..Default::default()
        };

        let json = serde_json::to_value(&status).expect("json");
        assert_eq!(json["progress"], "Running");
        assert_eq!(json["readyReplicasRatio"], "1/1");
        assert_eq!(json["deploymentRefs"][0], "test-dc1-default-stargate");
        assert_eq!(json["availableReplicas"], 0);

        let back: StargateStatus = serde_json::from_value(json).expect("parse");
        assert_eq!(back, status);
        assert!(back.is_ready());
        assert!(back.is_running());
    }

    #[test]
    fn test_empty_status_is_uninitialized() {
        let status: StargateStatus = serde_json::from_str("{}").expect("parse");
        assert!(status.progress.is_none());
        assert!(!status.is_ready());
    }
}
