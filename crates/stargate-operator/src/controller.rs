//!
//! # Stargate controller
//!
//! Level triggered loop: every cycle lists the Stargates, reconciles the ones
//! that are due and schedules their next pass.
//!
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use adaptive_backoff::prelude::{
    Backoff, BackoffBuilder, ExponentialBackoff, ExponentialBackoffBuilder,
};
use anyhow::Result;
use futures_util::future::{Either, join_all, select};
use tracing::{debug, error, info, instrument, trace};

use fluvio_future::task::spawn;
use fluvio_future::timer::sleep;

use stargate_metadata::stargate::StargateSpec;
use stargate_reconcile::Context;

use crate::config::OperatorConfig;
use crate::metadata::{MetadataClient, SharedClient};
use crate::reconciler::StargateReconciler;

/// when the next pass of a single Stargate is due
struct Schedule {
    due: Instant,
    backoff: ExponentialBackoff,
}

pub struct StargateController<C> {
    client: SharedClient<C>,
    reconciler: StargateReconciler<C>,
    schedules: HashMap<String, Schedule>,
}

fn create_backoff(config: &OperatorConfig) -> Result<ExponentialBackoff> {
    ExponentialBackoffBuilder::default()
        .factor(config.error_backoff_factor)
        .min(config.error_backoff_min)
        .max(config.error_backoff_max)
        .build()
}

impl<C> StargateController<C>
where
    C: MetadataClient + 'static,
{
    pub fn new(client: SharedClient<C>, config: OperatorConfig) -> Self {
        Self {
            reconciler: StargateReconciler::new(client.clone(), config),
            client,
            schedules: HashMap::new(),
        }
    }

    fn config(&self) -> &OperatorConfig {
        self.reconciler.config()
    }

    /// run in the background until `ctx` is cancelled
    pub fn start(self, ctx: Context) {
        info!(namespace = %self.config().namespace, "starting stargate controller");
        spawn(self.dispatch_loop(ctx));
    }

    #[instrument(skip(self, ctx), name = "StargateControllerLoop")]
    pub async fn dispatch_loop(mut self, ctx: Context) {
        let mut backoff = match create_backoff(self.config()) {
            Ok(backoff) => backoff,
            Err(err) => {
                error!("invalid backoff: {:#?}", err);
                return;
            }
        };

        while !ctx.is_cancelled() {
            let wait = match self.sync_cycle(&ctx).await {
                Ok(wait) => {
                    backoff.reset();
                    wait
                }
                Err(err) => {
                    error!("error with stargate cycle: {:#?}", err);
                    backoff.wait()
                }
            };

            trace!(?wait, "sleeping until next cycle");
            let cancelled = ctx.cancelled();
            if let Either::Right(_) = select(Box::pin(sleep(wait)), Box::pin(cancelled)).await {
                break;
            }
        }

        info!("stargate controller stopped");
    }

    /// Reconcile every due Stargate once.
    ///
    /// Returns how long to wait before the next cycle.
    pub async fn sync_cycle(&mut self, ctx: &Context) -> Result<Duration> {
        let namespace = self.config().namespace.clone();
        let stargates = self
            .client
            .retrieve_items::<StargateSpec>(&namespace)
            .await?;

        let present: HashSet<String> = stargates
            .into_iter()
            .map(|stargate| stargate.metadata.name)
            .collect();
        self.schedules.retain(|name, _| {
            let keep = present.contains(name);
            if !keep {
                debug!(%name, "forgetting deleted stargate");
            }
            keep
        });

        let now = Instant::now();
        let due: Vec<&String> = present
            .iter()
            .filter(|name| {
                self.schedules
                    .get(*name)
                    .is_none_or(|schedule| schedule.due <= now)
            })
            .collect();
        debug!(total = present.len(), due = due.len(), "stargate cycle");

        let reconciler = &self.reconciler;
        let results = join_all(
            due.iter()
                .map(|name| reconciler.reconcile(&namespace, name, ctx)),
        )
        .await;

        let finished = Instant::now();
        let resync = self.config().resync_interval;
        for (name, result) in due.into_iter().zip(results) {
            if !self.schedules.contains_key(name) {
                let backoff = create_backoff(self.config())?;
                self.schedules.insert(
                    name.clone(),
                    Schedule {
                        due: finished,
                        backoff,
                    },
                );
            }
            let Some(schedule) = self.schedules.get_mut(name) else {
                continue;
            };

            let delay = match result {
                Ok(requeue) => {
                    schedule.backoff.reset();
                    requeue.unwrap_or(resync)
                }
                Err(err) => {
                    let delay = schedule.backoff.wait();
                    error!(%name, ?delay, "reconcile failed: {err}");
                    delay
                }
            };
            trace!(%name, ?delay, "scheduled");
            schedule.due = finished + delay;
        }

        let wait = self
            .schedules
            .values()
            .map(|schedule| schedule.due.saturating_duration_since(finished))
            .min()
            .unwrap_or(resync)
            .min(resync);
        Ok(wait)
    }

    /// time until the named Stargate is due, `None` if it was never reconciled
    pub fn next_due(&self, name: &str) -> Option<Duration> {
        self.schedules
            .get(name)
            .map(|schedule| schedule.due.saturating_duration_since(Instant::now()))
    }
}

#[cfg(test)]
mod test {

    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use fluvio_future::task::spawn;
    use fluvio_future::timer::sleep;
    use k8_types::{InputK8Obj, InputObjectMeta, K8Obj};

    use stargate_metadata::stargate::StargateSpec;
    use stargate_reconcile::Context;

    use crate::config::OperatorConfig;
    use crate::metadata::{MemoryMetadataClient, MetadataClient};

    use super::StargateController;

    async fn create_stargate(client: &MemoryMetadataClient, name: &str) -> K8Obj<StargateSpec> {
        client
            .create_item(InputK8Obj::new(
                StargateSpec::new("dc1", 1),
                InputObjectMeta {
                    name: name.to_owned(),
                    namespace: "default".to_owned(),
                    ..Default::default()
                },
            ))
            .await
            .expect("create")
    }

    #[fluvio_future::test]
    async fn test_cycle_schedules_and_forgets() {
        let client = MemoryMetadataClient::new_shared();
        let stargate = create_stargate(&client, "sg1").await;

        let mut controller = StargateController::new(client.clone(), OperatorConfig::default());
        let ctx = Context::background();

        // no datacenter yet, the pass waits for the long delay
        let wait = controller.sync_cycle(&ctx).await.expect("cycle");
        assert!(wait <= Duration::from_secs(60));
        let due = controller.next_due("sg1").expect("scheduled");
        assert!(due > Duration::from_secs(50), "due in {due:?}");

        client.delete_item(&stargate).await.expect("delete");
        controller.sync_cycle(&ctx).await.expect("cycle");
        assert!(controller.next_due("sg1").is_none());
    }

    #[fluvio_future::test]
    async fn test_stops_when_cancelled() {
        let client = MemoryMetadataClient::new_shared();
        create_stargate(&client, "sg1").await;

        let controller = StargateController::new(client, OperatorConfig::default());
        let ctx = Context::background();
        let stopped = Arc::new(AtomicBool::new(false));

        let loop_ctx = ctx.clone();
        let loop_stopped = stopped.clone();
        spawn(async move {
            controller.dispatch_loop(loop_ctx).await;
            loop_stopped.store(true, Ordering::SeqCst);
        });

        sleep(Duration::from_millis(50)).await;
        assert!(!stopped.load(Ordering::SeqCst));
        ctx.cancel();

        for _ in 0..100 {
            if stopped.load(Ordering::SeqCst) {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
        assert!(stopped.load(Ordering::SeqCst));
    }
}
