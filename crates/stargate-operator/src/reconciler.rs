//!
//! # Convergence reconciler
//!
//! One pass over a single Stargate: wait for the datacenter, plan partitions,
//! converge every owned object in parallel and report the result in the status.
//!
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use k8_types::K8Obj;

use stargate_metadata::condition::{Condition, ConditionStatus};
use stargate_metadata::datacenter::CassandraDatacenterSpec;
use stargate_metadata::deployment::{DeploymentSpec, DeploymentStatus};
use stargate_metadata::service::ServiceSpec;
use stargate_metadata::stargate::{READY_CONDITION, StargateProgress, StargateSpec};
use stargate_metadata::telemetry::ServiceMonitorSpec;
use stargate_reconcile::{Context, ReconcileError, ReconcileGroup, ReconcileOutcome};

use crate::config::OperatorConfig;
use crate::metadata::{MetadataClient, SharedClient};
use crate::planner::{Partition, PlanError, plan};
use crate::resources::{RESOURCE_HASH_ANNOTATION, StargateResources, object_patch, spec_patch};
use crate::status::{
    Failure, Observation, PartitionObservation, aggregate, timestamp, upsert_condition,
};

/// requeue after the progress was first recorded
const STATUS_INIT_REQUEUE: Duration = Duration::from_secs(1);

/// an object with the expected name exists but belongs to someone else
#[derive(Debug, thiserror::Error)]
#[error("{kind} {name} exists and is not owned by Stargate {owner}")]
pub struct OwnershipConflict {
    pub kind: String,
    pub name: String,
    pub owner: String,
}

impl OwnershipConflict {
    fn new<S: k8_types::Spec>(name: &str, owner: &str) -> Self {
        Self {
            kind: S::kind(),
            name: name.to_owned(),
            owner: owner.to_owned(),
        }
    }
}

/// fatal misconfiguration found among the causes, reported on the Ready condition
pub fn failure_of(err: &ReconcileError) -> Option<Failure> {
    err.causes().find_map(|cause| {
        if let Some(plan) = cause.downcast_ref::<PlanError>() {
            Some(Failure {
                reason: plan.reason().to_owned(),
                message: plan.to_string(),
            })
        } else {
            cause
                .downcast_ref::<OwnershipConflict>()
                .map(|conflict| Failure {
                    reason: "OwnershipConflict".to_owned(),
                    message: conflict.to_string(),
                })
        }
    })
}

/// Map the outcome of a pass to what the controller acts on.
///
/// Errors requeue immediately through the caller's backoff, a converged Stargate
/// is not requeued, anything else polls after the smallest requested delay.
pub fn requeue_policy(
    outcome: ReconcileOutcome,
    ready: bool,
    default_delay: Duration,
) -> Result<Option<Duration>, ReconcileError> {
    match outcome.output()? {
        _ if ready => Ok(None),
        Some(delay) => Ok(Some(delay)),
        None => Ok(Some(default_delay)),
    }
}

pub struct StargateReconciler<C> {
    client: SharedClient<C>,
    config: OperatorConfig,
}

impl<C> Clone for StargateReconciler<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            config: self.config.clone(),
        }
    }
}

impl<C> StargateReconciler<C>
where
    C: MetadataClient + 'static,
{
    pub fn new(client: SharedClient<C>, config: OperatorConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    /// Reconcile the named Stargate once.
    ///
    /// `Ok(None)` means converged, `Ok(Some(delay))` asks for another pass after `delay`.
    #[instrument(skip(self, ctx))]
    pub async fn reconcile(
        &self,
        namespace: &str,
        name: &str,
        ctx: &Context,
    ) -> Result<Option<Duration>, ReconcileError> {
        let stargate = match self
            .client
            .retrieve_item::<StargateSpec>(namespace, name)
            .await
        {
            Ok(Some(stargate)) => stargate,
            Ok(None) => {
                debug!("stargate is gone, nothing to do");
                return Ok(None);
            }
            Err(err) => return Err(ReconcileError::new(err)),
        };

        let (outcome, ready) = self.converge(stargate, ctx).await;
        debug!(?outcome, ready, "pass finished");
        requeue_policy(outcome, ready, self.config.default_delay)
    }

    /// run a pass, returns the merged outcome and whether the Stargate is ready
    async fn converge(
        &self,
        stargate: K8Obj<StargateSpec>,
        ctx: &Context,
    ) -> (ReconcileOutcome, bool) {
        let namespace = stargate.metadata.namespace.clone();
        let dc_name = stargate.spec.datacenter_ref.name.clone();

        let datacenter = match self
            .client
            .retrieve_item::<CassandraDatacenterSpec>(&namespace, &dc_name)
            .await
        {
            Ok(Some(datacenter)) => datacenter,
            Ok(None) => {
                info!(datacenter = %dc_name, "datacenter not found, waiting");
                return (
                    ReconcileOutcome::continue_and_requeue(self.config.long_delay),
                    false,
                );
            }
            Err(err) => {
                return (
                    ReconcileOutcome::continue_with_error(ReconcileError::new(err)),
                    false,
                );
            }
        };

        if !datacenter.status.is_ready() {
            debug!(datacenter = %dc_name, "datacenter not ready, waiting");
            return (
                ReconcileOutcome::continue_and_requeue(self.config.dependency_backoff),
                false,
            );
        }
        debug!(
            datacenter = %dc_name,
            hosts = ?datacenter.status.host_ids().collect::<Vec<_>>(),
            "datacenter ready"
        );

        if stargate.status.progress.is_none() {
            return (self.start_deploying(&stargate).await, false);
        }

        let resources = Arc::new(StargateResources::new(
            stargate,
            &datacenter,
            self.config.clone(),
        ));

        let partitions = match plan(&resources.stargate().spec, &datacenter.spec) {
            Ok(partitions) => partitions,
            Err(err) => {
                warn!(%err, "cannot plan partitions");
                let outcome =
                    ReconcileOutcome::complete_with_error(ReconcileError::new(err.clone()));
                let report = self.report_failure(&resources, &err).await;
                return (outcome.merge(report), false);
            }
        };

        let (group, group_ctx) = ReconcileGroup::with_context(ctx);
        for partition in partitions.iter().cloned() {
            group.go(reconcile_partition(
                self.client.clone(),
                resources.clone(),
                partition,
                group_ctx.clone(),
            ));
        }
        group.go(reconcile_service(
            self.client.clone(),
            resources.clone(),
            group_ctx.clone(),
        ));
        group.go(reconcile_service_monitor(
            self.client.clone(),
            resources.clone(),
            group_ctx.clone(),
        ));
        group.go(prune_partitions(
            self.client.clone(),
            resources.clone(),
            partitions.clone(),
            group_ctx,
        ));

        let outcome = group.wait().await;

        match self.observe(&resources, &partitions, &outcome).await {
            Ok(observation) => {
                let ready = observation.is_ready();
                let persisted = self.persist_status(&resources, &observation).await;
                (outcome.merge(persisted), ready)
            }
            Err(err) => (
                outcome.merge(ReconcileOutcome::continue_with_error(err)),
                false,
            ),
        }
    }

    /// first pass after the datacenter is ready
    async fn start_deploying(&self, stargate: &K8Obj<StargateSpec>) -> ReconcileOutcome {
        let mut status = stargate.status.clone();
        status.progress = Some(StargateProgress::Deploying);

        match self.client.update_status(stargate, status).await {
            Ok(_) => {
                info!("deploying stargate");
                ReconcileOutcome::continue_and_requeue(STATUS_INIT_REQUEUE)
            }
            Err(err) => ReconcileOutcome::continue_with_error(ReconcileError::new(err)),
        }
    }

    async fn observe(
        &self,
        resources: &StargateResources,
        partitions: &[Partition],
        outcome: &ReconcileOutcome,
    ) -> Result<Observation, ReconcileError> {
        let namespace = resources.namespace();

        let deployments: BTreeMap<String, DeploymentStatus> = self
            .client
            .retrieve_labeled::<DeploymentSpec>(namespace, &resources.selector())
            .await
            .map_err(ReconcileError::new)?
            .into_iter()
            .filter(|deployment| resources.owns(&deployment.metadata))
            .map(|deployment| (deployment.metadata.name, deployment.status))
            .collect();

        let partitions = partitions
            .iter()
            .map(|partition| {
                let deployment = resources.deployment_name(&partition.name);
                PartitionObservation {
                    status: deployments.get(&deployment).cloned(),
                    deployment,
                    target_replicas: partition.target_replicas,
                }
            })
            .collect();

        let service = self
            .client
            .retrieve_item::<ServiceSpec>(namespace, &resources.service_name())
            .await
            .map_err(ReconcileError::new)?
            .filter(|service| resources.owns(&service.metadata))
            .map(|service| service.metadata.name);

        Ok(Observation {
            partitions,
            service,
            failure: outcome.error().and_then(failure_of),
        })
    }

    async fn persist_status(
        &self,
        resources: &StargateResources,
        observation: &Observation,
    ) -> ReconcileOutcome {
        let stargate = resources.stargate();
        let status = aggregate(&stargate.status, observation, Utc::now());
        if status == stargate.status {
            return ReconcileOutcome::proceed();
        }

        match self.client.update_status(stargate, status).await {
            Ok(updated) => {
                if updated.status.is_running() && !stargate.status.is_running() {
                    info!("stargate is running");
                }
                ReconcileOutcome::proceed()
            }
            Err(err) => ReconcileOutcome::continue_with_error(ReconcileError::new(err)),
        }
    }

    /// only the Ready condition changes when the spec cannot be planned
    async fn report_failure(
        &self,
        resources: &StargateResources,
        err: &PlanError,
    ) -> ReconcileOutcome {
        let stargate = resources.stargate();
        let mut status = stargate.status.clone();
        let mut condition = Condition::new(READY_CONDITION, ConditionStatus::False);
        condition.reason = Some(err.reason().to_owned());
        condition.message = Some(err.to_string());
        upsert_condition(&mut status.conditions, condition, &timestamp(Utc::now()));

        if status == stargate.status {
            return ReconcileOutcome::proceed();
        }
        match self.client.update_status(stargate, status).await {
            Ok(_) => ReconcileOutcome::proceed(),
            Err(err) => ReconcileOutcome::continue_with_error(ReconcileError::new(err)),
        }
    }
}

/// create, patch or leave alone the Deployment of one partition
async fn reconcile_partition<C: MetadataClient>(
    client: SharedClient<C>,
    resources: Arc<StargateResources>,
    partition: Partition,
    ctx: Context,
) -> ReconcileOutcome {
    let poll = resources.config().default_delay;
    let namespace = resources.namespace();

    let desired = match resources.desired_deployment(&partition) {
        Ok(desired) => desired,
        Err(err) => return ReconcileOutcome::continue_with_error(ReconcileError::new(err)),
    };
    let name = desired.metadata.name.clone();

    let current = match client.retrieve_item::<DeploymentSpec>(namespace, &name).await {
        Ok(current) => current,
        Err(err) => return ReconcileOutcome::continue_with_error(ReconcileError::new(err)),
    };

    if ctx.is_cancelled() {
        debug!(deployment = %name, "pass cancelled, skipping");
        return ReconcileOutcome::proceed();
    }

    let Some(current) = current else {
        return match client.create_item(desired).await {
            Ok(_) => {
                info!(
                    deployment = %name,
                    replicas = partition.target_replicas,
                    "created deployment"
                );
                ReconcileOutcome::continue_and_requeue(poll)
            }
            Err(err) => ReconcileOutcome::continue_with_error(ReconcileError::new(err)),
        };
    };

    if !resources.owns(&current.metadata) {
        warn!(deployment = %name, "deployment not owned by this stargate");
        return ReconcileOutcome::complete_with_error(ReconcileError::new(
            OwnershipConflict::new::<DeploymentSpec>(&name, resources.name()),
        ));
    }

    let desired_hash = desired.metadata.annotations.get(RESOURCE_HASH_ANNOTATION);
    let current_hash = current.metadata.annotations.get(RESOURCE_HASH_ANNOTATION);
    // only fields of the typed model are compared, server defaults outside it are ignored
    if desired_hash == current_hash && desired.spec == current.spec {
        return if current.status.ready_replicas == partition.target_replicas {
            ReconcileOutcome::proceed()
        } else {
            debug!(
                deployment = %name,
                ready = current.status.ready_replicas,
                target = partition.target_replicas,
                "waiting for replicas"
            );
            ReconcileOutcome::continue_and_requeue(poll)
        };
    }

    let spec = match spec_patch(&current.spec, &desired.spec) {
        Ok(spec) => spec,
        Err(err) => return ReconcileOutcome::continue_with_error(ReconcileError::new(err)),
    };
    let patch = object_patch(&desired.metadata.labels, &desired.metadata.annotations, spec);

    match client.patch_item(&current, &patch).await {
        Ok(_) => {
            info!(deployment = %name, replicas = partition.target_replicas, "patched deployment");
            ReconcileOutcome::continue_and_requeue(poll)
        }
        Err(err) => ReconcileOutcome::continue_with_error(ReconcileError::new(err)),
    }
}

/// create the Service or restore its routing
async fn reconcile_service<C: MetadataClient>(
    client: SharedClient<C>,
    resources: Arc<StargateResources>,
    ctx: Context,
) -> ReconcileOutcome {
    let desired = resources.desired_service();
    let name = desired.metadata.name.clone();

    let current = match client
        .retrieve_item::<ServiceSpec>(resources.namespace(), &name)
        .await
    {
        Ok(current) => current,
        Err(err) => return ReconcileOutcome::continue_with_error(ReconcileError::new(err)),
    };

    if ctx.is_cancelled() {
        return ReconcileOutcome::proceed();
    }

    let result = match current {
        None => client.create_item(desired).await.map(|_| {
            info!(service = %name, "created service");
        }),
        Some(current) if !resources.owns(&current.metadata) => {
            warn!(service = %name, "service not owned by this stargate");
            return ReconcileOutcome::complete_with_error(ReconcileError::new(
                OwnershipConflict::new::<ServiceSpec>(&name, resources.name()),
            ));
        }
        Some(current) if current.spec.same_routing(&desired.spec) => Ok(()),
        Some(current) => {
            let mut spec = desired.spec;
            spec.cluster_ip = current.spec.cluster_ip.clone();
            client.update_item(&current, spec).await.map(|_| {
                info!(service = %name, "updated service");
            })
        }
    };

    match result {
        Ok(()) => ReconcileOutcome::proceed(),
        Err(err) => ReconcileOutcome::continue_with_error(ReconcileError::new(err)),
    }
}

/// the ServiceMonitor exists exactly when prometheus telemetry is enabled
async fn reconcile_service_monitor<C: MetadataClient>(
    client: SharedClient<C>,
    resources: Arc<StargateResources>,
    ctx: Context,
) -> ReconcileOutcome {
    let enabled = resources.stargate().spec.prometheus_enabled();
    let name = resources.service_monitor_name();

    let current = match client
        .retrieve_item::<ServiceMonitorSpec>(resources.namespace(), &name)
        .await
    {
        Ok(current) => current,
        Err(err) => return ReconcileOutcome::continue_with_error(ReconcileError::new(err)),
    };

    if ctx.is_cancelled() {
        return ReconcileOutcome::proceed();
    }

    let result = match current {
        None if enabled => client
            .create_item(resources.desired_service_monitor())
            .await
            .map(|_| info!(monitor = %name, "created service monitor")),
        Some(current) if !enabled && resources.owns(&current.metadata) => client
            .delete_item(&current)
            .await
            .map(|_| info!(monitor = %name, "deleted service monitor")),
        _ => Ok(()),
    };

    match result {
        Ok(()) => ReconcileOutcome::proceed(),
        Err(err) => ReconcileOutcome::continue_with_error(ReconcileError::new(err)),
    }
}

/// delete owned Deployments whose partition is no longer planned
async fn prune_partitions<C: MetadataClient>(
    client: SharedClient<C>,
    resources: Arc<StargateResources>,
    partitions: Vec<Partition>,
    ctx: Context,
) -> ReconcileOutcome {
    let planned: HashSet<String> = partitions
        .iter()
        .map(|partition| resources.deployment_name(&partition.name))
        .collect();

    let deployments = match client
        .retrieve_labeled::<DeploymentSpec>(resources.namespace(), &resources.selector())
        .await
    {
        Ok(deployments) => deployments,
        Err(err) => return ReconcileOutcome::continue_with_error(ReconcileError::new(err)),
    };

    let mut outcome = ReconcileOutcome::proceed();
    for stale in deployments.iter().filter(|deployment| {
        !planned.contains(&deployment.metadata.name) && resources.owns(&deployment.metadata)
    }) {
        if ctx.is_cancelled() {
            break;
        }
        outcome = outcome.merge(match client.delete_item(stale).await {
            Ok(()) => {
                info!(deployment = %stale.metadata.name, "deleted stale deployment");
                ReconcileOutcome::proceed()
            }
            Err(err) if err.is_not_found() => ReconcileOutcome::proceed(),
            Err(err) => ReconcileOutcome::continue_with_error(ReconcileError::new(err)),
        });
    }
    outcome
}
