use std::process;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use fluvio_future::task::run_block_on;

use stargate_operator::StargateController;
use stargate_operator::cli::{OperatorOpt, RunMode};
use stargate_operator::metadata::k8::K8MetadataClient;
use stargate_reconcile::Context;

fn main() {
    fluvio_future::subscriber::init_logger();

    let opt = OperatorOpt::parse();
    if let Err(err) = main_loop(opt) {
        error!("{:#}", err);
        eprintln!("stargate-operator: {err:#}");
        process::exit(1);
    }
}

fn main_loop(opt: OperatorOpt) -> Result<()> {
    let config = opt.as_config()?;

    match opt.mode()? {
        RunMode::K8s => {
            let client = Arc::new(K8MetadataClient::load()?);
            info!(
                version = env!("CARGO_PKG_VERSION"),
                namespace = %config.namespace,
                "starting stargate operator"
            );
            let controller = StargateController::new(client, config);
            run_block_on(controller.dispatch_loop(Context::background()));
        }
    }

    Ok(())
}
