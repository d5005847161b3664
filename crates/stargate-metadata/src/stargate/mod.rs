//!
//! # Stargate
//!
//! Stargate custom resource, owner of every object the operator creates
//!
mod spec;
mod status;

pub use spec::*;
pub use status::*;

use crate::k8_types::{Crd, DefaultHeader, Spec, Status};

/// label carrying the owning Stargate name on every managed object
pub const STARGATE_LABEL: &str = "k8ssandra.io/stargate";

use crd::STARGATE_API;
mod crd {

    use crate::k8_types::{Crd, CrdNames};

    pub const STARGATE_API: Crd = Crd {
        group: "stargate.k8ssandra.io",
        version: "v1alpha1",
        names: CrdNames {
            kind: "Stargate",
            plural: "stargates",
            singular: "stargate",
        },
    };
}

impl Spec for StargateSpec {
    type Status = StargateStatus;
    type Header = DefaultHeader;
    fn metadata() -> &'static Crd {
        &STARGATE_API
    }
}

impl Status for StargateStatus {}
