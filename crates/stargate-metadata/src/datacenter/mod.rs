//!
//! # CassandraDatacenter
//!
//! Read only view of the datacenter a Stargate deployment depends on
//!
mod spec;
mod status;

pub use spec::*;
pub use status::*;

use crate::k8_types::{Crd, DefaultHeader, Spec, Status};

use crd::DATACENTER_API;
mod crd {

    use crate::k8_types::{Crd, CrdNames};

    pub const DATACENTER_API: Crd = Crd {
        group: "cassandra.datastax.com",
        version: "v1beta1",
        names: CrdNames {
            kind: "CassandraDatacenter",
            plural: "cassandradatacenters",
            singular: "cassandradatacenter",
        },
    };
}

impl Spec for CassandraDatacenterSpec {
    type Status = CassandraDatacenterStatus;
    type Header = DefaultHeader;
    fn metadata() -> &'static Crd {
        &DATACENTER_API
    }
}

impl Status for CassandraDatacenterStatus {}
