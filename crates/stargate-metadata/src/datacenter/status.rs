use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::condition::{Condition, find_condition};

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CassandraDatacenterStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cassandra_operator_progress: Option<OperatorProgress>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// pod name to node identity
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub node_statuses: BTreeMap<String, NodeStatus>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Eq, PartialEq)]
pub enum OperatorProgress {
    Updating,
    Ready,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    #[serde(rename = "hostID", default)]
    pub host_id: String,
}

impl CassandraDatacenterStatus {
    /// The datacenter is ready once cass-operator finished its work and
    /// reports a true `Ready` condition.
    pub fn is_ready(&self) -> bool {
        self.cassandra_operator_progress == Some(OperatorProgress::Ready)
            && find_condition(&self.conditions, "Ready").is_some_and(Condition::is_true)
    }

    pub fn host_ids(&self) -> impl Iterator<Item = &str> {
        self.node_statuses
            .values()
            .map(|node| node.host_id.as_str())
            .filter(|host_id| !host_id.is_empty())
    }
}

#[cfg(test)]
mod test {

    use super::{CassandraDatacenterStatus, OperatorProgress};

    #[test]
    fn test_readiness_needs_progress_and_condition() {
        let status: CassandraDatacenterStatus = serde_json::from_str(
            r#"{
                "cassandraOperatorProgress": "Ready",
                "conditions": [{"type": "Ready", "status": "True"}],
                "nodeStatuses": {"test-dc1-default-sts-0": {"hostID": "a1b2"}}
            }"#,
        )
        .expect("parse");
        assert!(status.is_ready());
        assert_eq!(status.host_ids().collect::<Vec<_>>(), vec!["a1b2"]);

        let updating = CassandraDatacenterStatus {
            cassandra_operator_progress: Some(OperatorProgress::Updating),
            ..status.clone()
        };
        assert!(!updating.is_ready());

        let no_condition = CassandraDatacenterStatus {
            conditions: vec![],
            ..status
        };
        assert!(!no_condition.is_ready());
    }

    #[test]
    fn test_unknown_progress() {
        let status: CassandraDatacenterStatus =
            serde_json::from_str(r#"{"cassandraOperatorProgress": "Scaling"}"#).expect("parse");
        assert_eq!(
            status.cassandra_operator_progress,
            Some(OperatorProgress::Unknown)
        );
        assert!(!status.is_ready());
    }
}
