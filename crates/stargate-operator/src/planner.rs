//!
//! # Partition planner
//!
//! Splits the requested Stargate replicas across the datacenter racks
//!
use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::trace;

use stargate_metadata::datacenter::{CassandraDatacenterSpec, Rack};
use stargate_metadata::stargate::StargateSpec;

use crate::resources::sanitize;

/// partition used when the datacenter declares no racks
pub const DEFAULT_PARTITION: &str = "default";

/// One failure domain and the replicas it should run
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Partition {
    pub name: String,
    /// node labels the partition is pinned to, empty for the default partition
    pub affinity_labels: BTreeMap<String, String>,
    pub target_replicas: i32,
}

impl Partition {
    pub fn new(name: impl Into<String>, target_replicas: i32) -> Self {
        Self {
            name: name.into(),
            affinity_labels: BTreeMap::new(),
            target_replicas,
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, Eq, PartialEq)]
pub enum PlanError {
    #[error("invalid spec: {0}")]
    InvalidSpec(String),
    #[error("invalid topology: {0}")]
    InvalidTopology(String),
}

impl PlanError {
    /// reason reported on the Ready condition
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidSpec(_) => "InvalidSpec",
            Self::InvalidTopology(_) => "InvalidTopology",
        }
    }
}

/// Distribute `replicas` over `racks`.
///
/// Every rack gets `replicas / racks`, the first `replicas % racks` racks in list
/// order get one more. Racks left with nothing stay in the plan with zero replicas.
/// A negative count plans nothing.
pub fn distribute(replicas: i32, racks: &[Rack]) -> Vec<Partition> {
    let replicas = replicas.max(0);
    if racks.is_empty() {
        return vec![Partition::new(DEFAULT_PARTITION, replicas)];
    }

    let count = racks.len() as i32;
    let base = replicas / count;
    let remainder = (replicas % count) as usize;

    racks
        .iter()
        .enumerate()
        .map(|(index, rack)| Partition {
            name: rack.name.clone(),
            affinity_labels: rack.affinity_labels(),
            target_replicas: if index < remainder { base + 1 } else { base },
        })
        .collect()
}

/// validate the Stargate against the datacenter topology and plan its partitions
pub fn plan(
    stargate: &StargateSpec,
    datacenter: &CassandraDatacenterSpec,
) -> Result<Vec<Partition>, PlanError> {
    if stargate.size < 0 {
        return Err(PlanError::InvalidSpec(format!(
            "size must not be negative, got {}",
            stargate.size
        )));
    }

    let mut seen = HashSet::new();
    // racks share a deployment when their names sanitize to the same value
    let mut identities: HashMap<String, &str> = HashMap::new();
    for rack in &datacenter.racks {
        if !seen.insert(rack.name.as_str()) {
            return Err(PlanError::InvalidTopology(format!(
                "rack {} is declared more than once",
                rack.name
            )));
        }
        if let Some(other) = identities.insert(sanitize(&rack.name), rack.name.as_str()) {
            return Err(PlanError::InvalidTopology(format!(
                "racks {} and {} map to the same deployment name",
                other, rack.name
            )));
        }
    }

    if let Some(unknown) = stargate
        .racks
        .iter()
        .find(|template| !seen.contains(template.name.as_str()))
    {
        return Err(PlanError::InvalidTopology(format!(
            "rack {} is not part of datacenter {}",
            unknown.name, stargate.datacenter_ref.name
        )));
    }

    let partitions = distribute(stargate.size, &datacenter.racks);
    trace!(?partitions, "planned");
    Ok(partitions)
}

#[cfg(test)]
mod test {

    use stargate_metadata::datacenter::{CassandraDatacenterSpec, Rack};
    use stargate_metadata::stargate::{StargateRackTemplate, StargateSpec};

    use super::{DEFAULT_PARTITION, PlanError, distribute, plan};

    fn zones() -> Vec<Rack> {
        vec![
            Rack::with_zone("rack1", "us-east-1a"),
            Rack::with_zone("rack2", "us-east-1b"),
            Rack::with_zone("rack3", "us-east-1c"),
        ]
    }

    fn targets(replicas: i32, racks: &[Rack]) -> Vec<i32> {
        distribute(replicas, racks)
            .into_iter()
            .map(|p| p.target_replicas)
            .collect()
    }

    #[test]
    fn test_even_split() {
        assert_eq!(targets(9, &zones()), vec![3, 3, 3]);
        assert_eq!(targets(3, &zones()), vec![1, 1, 1]);
    }

    #[test]
    fn test_remainder_goes_first() {
        assert_eq!(targets(10, &zones()), vec![4, 3, 3]);
        assert_eq!(targets(11, &zones()), vec![4, 4, 3]);
    }

    #[test]
    fn test_fewer_replicas_than_racks() {
        let partitions = distribute(1, &zones());
        assert_eq!(partitions.len(), 3, "empty racks are kept");
        assert_eq!(
            partitions.iter().map(|p| p.target_replicas).collect::<Vec<_>>(),
            vec![1, 0, 0]
        );
        assert_eq!(
            partitions.iter().map(|p| p.target_replicas).sum::<i32>(),
            1
        );
    }

    #[test]
    fn test_no_racks() {
        let partitions = distribute(4, &[]);
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].name, DEFAULT_PARTITION);
        assert_eq!(partitions[0].target_replicas, 4);
        assert!(partitions[0].affinity_labels.is_empty());
    }

    #[test]
    fn test_affinity_follows_rack() {
        let partitions = distribute(3, &zones());
        assert_eq!(
            partitions[1]
                .affinity_labels
                .get("topology.kubernetes.io/zone")
                .map(String::as_str),
            Some("us-east-1b")
        );
    }

    #[test]
    fn test_plan_validation() {
        let datacenter = CassandraDatacenterSpec {
            cluster_name: "cluster1".to_owned(),
            size: 9,
            racks: zones(),
            ..Default::default()
        };

        let stargate = StargateSpec::new("dc2", -1);
        let err = plan(&stargate, &datacenter).expect_err("negative size");
        assert_eq!(err.reason(), "InvalidSpec");

        let mut stargate = StargateSpec::new("dc2", 3);
        stargate.racks.push(StargateRackTemplate {
            name: "rack4".to_owned(),
            ..Default::default()
        });
        let err = plan(&stargate, &datacenter).expect_err("unknown rack");
        assert!(matches!(err, PlanError::InvalidTopology(_)));

        let mut duplicated = datacenter.clone();
        duplicated.racks.push(Rack::new("rack1"));
        let err = plan(&StargateSpec::new("dc2", 3), &duplicated).expect_err("duplicate");
        assert_eq!(err.reason(), "InvalidTopology");

        let partitions = plan(&StargateSpec::new("dc2", 3), &datacenter).expect("plan");
        assert_eq!(partitions.len(), 3);
    }

    #[test]
    fn test_colliding_rack_names() {
        let datacenter = CassandraDatacenterSpec {
            cluster_name: "c".to_owned(),
            racks: vec![
                Rack::with_zone("rack_a", "z1"),
                Rack::with_zone("rack.a", "z2"),
            ],
            ..Default::default()
        };

        let err = plan(&StargateSpec::new("dc", 3), &datacenter).expect_err("collision");
        assert_eq!(err.reason(), "InvalidTopology");
        assert!(err.to_string().contains("rack_a"));
        assert!(err.to_string().contains("rack.a"));

        let mut distinct = datacenter.clone();
        distinct.racks[1] = Rack::with_zone("rack_b", "z2");
        assert_eq!(
            plan(&StargateSpec::new("dc", 3), &distinct)
                .expect("plan")
                .len(),
            2
        );
    }

    #[test]
    fn test_negative_replicas_plan_nothing() {
        assert_eq!(targets(-1, &zones()), vec![0, 0, 0]);
        assert_eq!(targets(-4, &[]), vec![0]);
    }
}
