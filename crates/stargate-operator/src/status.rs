//!
//! # Status aggregation
//!
//! Folds what was observed during a pass into the Stargate status
//!
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

use stargate_metadata::condition::{Condition, ConditionStatus};
use stargate_metadata::deployment::DeploymentStatus;
use stargate_metadata::stargate::{READY_CONDITION, StargateProgress, StargateStatus};

/// observed state of a planned partition
#[derive(Debug, Clone, Default)]
pub struct PartitionObservation {
    pub deployment: String,
    pub target_replicas: i32,
    /// `None` if the Deployment does not exist
    pub status: Option<DeploymentStatus>,
}

impl PartitionObservation {
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|status| status.ready_replicas == self.target_replicas)
    }
}

/// fatal misconfiguration reported on the Ready condition
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Failure {
    pub reason: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct Observation {
    pub partitions: Vec<PartitionObservation>,
    /// name of the Service if it exists
    pub service: Option<String>,
    pub failure: Option<Failure>,
}

impl Observation {
    pub fn is_ready(&self) -> bool {
        self.failure.is_none()
            && self.service.is_some()
            && self.partitions.iter().all(PartitionObservation::is_ready)
    }

    /// reason and message of a false Ready condition
    fn not_ready_reason(&self) -> (String, String) {
        if let Some(failure) = &self.failure {
            return (failure.reason.clone(), failure.message.clone());
        }

        let waiting: Vec<&str> = self
            .partitions
            .iter()
            .filter(|partition| !partition.is_ready())
            .map(|partition| partition.deployment.as_str())
            .collect();
        if !waiting.is_empty() {
            return (
                "ReplicasNotReady".to_owned(),
                format!("waiting for deployments: {}", waiting.join(", ")),
            );
        }

        ("ServiceNotFound".to_owned(), "service does not exist".to_owned())
    }
}

pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Replace the condition with the same type or append it.
///
/// The transition time moves only when the status value changes.
pub fn upsert_condition(conditions: &mut Vec<Condition>, mut condition: Condition, now: &str) {
    match conditions
        .iter_mut()
        .find(|existing| existing.condition_type == condition.condition_type)
    {
        Some(existing) => {
            condition.last_transition_time = if existing.status == condition.status {
                existing.last_transition_time.clone()
            } else {
                Some(now.to_owned())
            };
            *existing = condition;
        }
        None => {
            condition.last_transition_time = Some(now.to_owned());
            conditions.push(condition);
        }
    }
}

/// Compute the new status from the previous one and the observation.
///
/// Progress only moves forward: once Running, a regression flips the Ready
/// condition but keeps the progress.
pub fn aggregate(
    previous: &StargateStatus,
    observation: &Observation,
    now: DateTime<Utc>,
) -> StargateStatus {
    let mut status = previous.clone();

    let observed = observation
        .partitions
        .iter()
        .filter_map(|partition| partition.status.as_ref());
    status.replicas = 0;
    status.ready_replicas = 0;
    status.available_replicas = 0;
    status.updated_replicas = 0;
    for deployment in observed {
        status.replicas += deployment.replicas;
        status.ready_replicas += deployment.ready_replicas;
        status.available_replicas += deployment.available_replicas;
        status.updated_replicas += deployment.updated_replicas;
    }
    status.ready_replicas_ratio = Some(format!("{}/{}", status.ready_replicas, status.replicas));

    status.deployment_refs = observation
        .partitions
        .iter()
        .filter(|partition| partition.status.is_some())
        .map(|partition| partition.deployment.clone())
        .collect();
    status.service_ref = observation.service.clone();

    let ready = observation.is_ready();
    let mut condition = Condition::new(READY_CONDITION, ConditionStatus::from(ready));
    if !ready {
        let (reason, message) = observation.not_ready_reason();
        condition.reason = Some(reason);
        condition.message = Some(message);
    }
    upsert_condition(&mut status.conditions, condition, &timestamp(now));

    status.progress = if ready {
        Some(StargateProgress::Running)
    } else {
        status.progress.or(Some(StargateProgress::Deploying))
    };

    debug!(
        ready,
        ratio = ?status.ready_replicas_ratio,
        progress = ?status.progress,
        "aggregated status"
    );
    status
}

#[cfg(test)]
mod test {

    use chrono::{DateTime, TimeZone, Utc};

    use stargate_metadata::condition::{Condition, ConditionStatus};
    use stargate_metadata::deployment::DeploymentStatus;
    use stargate_metadata::stargate::{StargateProgress, StargateStatus};

    use super::{Failure, Observation, PartitionObservation, aggregate, timestamp, upsert_condition};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().expect("time")
    }

    fn ready(replicas: i32) -> DeploymentStatus {
        DeploymentStatus {
            replicas,
            ready_replicas: replicas,
            available_replicas: replicas,
            updated_replicas: replicas,
            ..Default::default()
        }
    }

    fn partition(
        name: &str,
        target: i32,
        status: Option<DeploymentStatus>,
    ) -> PartitionObservation {
        PartitionObservation {
            deployment: name.to_owned(),
            target_replicas: target,
            status,
        }
    }

    fn deploying() -> StargateStatus {
        StargateStatus {
            progress: Some(StargateProgress::Deploying),
            ..Default::default()
        }
    }

    #[test]
    fn test_sums_partitions() {
        let observation = Observation {
            partitions: vec![
                partition("rack1", 1, Some(ready(1))),
                partition("rack2", 1, Some(ready(1))),
                partition("rack3", 1, Some(ready(1))),
            ],
            service: Some("svc".to_owned()),
            failure: None,
        };

        let status = aggregate(&deploying(), &observation, at(0));
        assert_eq!(status.replicas, 3);
        assert_eq!(status.ready_replicas, 3);
        assert_eq!(status.available_replicas, 3);
        assert_eq!(status.updated_replicas, 3);
        assert_eq!(status.ready_replicas_ratio.as_deref(), Some("3/3"));
        assert_eq!(status.deployment_refs.len(), 3);
        assert_eq!(status.service_ref.as_deref(), Some("svc"));
        assert_eq!(status.progress, Some(StargateProgress::Running));
        assert_eq!(status.conditions.len(), 1);
        assert!(status.is_ready());
    }

    #[test]
    fn test_not_ready_until_every_partition_converges() {
        let observation = Observation {
            partitions: vec![
                partition("rack1", 1, Some(ready(1))),
                partition("rack2", 1, Some(DeploymentStatus::default())),
                partition("rack3", 1, None),
            ],
            service: Some("svc".to_owned()),
            failure: None,
        };

        let status = aggregate(&deploying(), &observation, at(0));
        assert_eq!(status.ready_replicas_ratio.as_deref(), Some("1/1"));
        assert_eq!(status.deployment_refs.len(), 2);
        assert_eq!(status.progress, Some(StargateProgress::Deploying));

        let condition = status.ready_condition().expect("ready condition");
        assert_eq!(condition.status, ConditionStatus::False);
        assert_eq!(condition.reason.as_deref(), Some("ReplicasNotReady"));
        assert!(condition.message.as_deref().unwrap_or_default().contains("rack3"));
    }

    #[test]
    fn test_missing_service_is_not_ready() {
        let observation = Observation {
            partitions: vec![partition("default", 1, Some(ready(1)))],
            service: None,
            failure: None,
        };
        let status = aggregate(&deploying(), &observation, at(0));
        assert!(!status.is_ready());
        assert_eq!(
            status.ready_condition().and_then(|c| c.reason.as_deref()),
            Some("ServiceNotFound")
        );
    }

    #[test]
    fn test_failure_is_reported() {
        let observation = Observation {
            partitions: vec![partition("default", 1, Some(ready(1)))],
            service: Some("svc".to_owned()),
            failure: Some(Failure {
                reason: "InvalidTopology".to_owned(),
                message: "rack rack4 is not part of datacenter dc1".to_owned(),
            }),
        };
        let status = aggregate(&deploying(), &observation, at(0));
        let condition = status.ready_condition().expect("condition");
        assert_eq!(condition.status, ConditionStatus::False);
        assert_eq!(condition.reason.as_deref(), Some("InvalidTopology"));
    }

    #[test]
    fn test_regression_keeps_progress() {
        let converged = Observation {
            partitions: vec![partition("default", 1, Some(ready(1)))],
            service: Some("svc".to_owned()),
            failure: None,
        };
        let running = aggregate(&deploying(), &converged, at(0));
        assert!(running.is_running());

        let degraded = Observation {
            partitions: vec![partition("default", 1, Some(DeploymentStatus::default()))],
            ..converged
        };
        let status = aggregate(&running, &degraded, at(10));
        assert!(status.is_running(), "progress never goes back");
        assert!(!status.is_ready());
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(
            status.ready_condition().and_then(|c| c.last_transition_time.clone()),
            Some(timestamp(at(10)))
        );
    }

    #[test]
    fn test_transition_time_moves_on_change_only() {
        let mut conditions = vec![Condition::new("Other", ConditionStatus::True)];

        upsert_condition(
            &mut conditions,
            Condition::new("Ready", ConditionStatus::False),
            "t1",
        );
        upsert_condition(
            &mut conditions,
            Condition::new("Ready", ConditionStatus::False),
            "t2",
        );
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[1].last_transition_time.as_deref(), Some("t1"));

        upsert_condition(
            &mut conditions,
            Condition::new("Ready", ConditionStatus::True),
            "t3",
        );
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].condition_type, "Other", "insertion order is kept");
        assert_eq!(conditions[1].last_transition_time.as_deref(), Some("t3"));
        assert!(conditions[1].is_true());
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(timestamp(at(0)), "2023-11-14T22:13:20Z");
    }
}
