//!
//! # CLI for the Stargate operator
//!
//! Parameters are applied in the following sequence:
//!     1) default values
//!     2) environment variables
//!     3) cli parameters
//!
use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::{Args, Parser};
use humantime::parse_duration;
use tracing::debug;

use crate::config::OperatorConfig;

/// cli options
#[derive(Debug, Parser)]
#[command(name = "stargate-operator", about = "Stargate convergence controller")]
pub struct OperatorOpt {
    #[command(flatten)]
    run_mode: OperatorOptRunMode,

    /// namespace watched for Stargate resources
    #[arg(short = 'n', long = "namespace", value_name = "namespace", env = "STARGATE_NAMESPACE")]
    namespace: Option<String>,

    /// poll interval while replicas are converging, for example `15s`
    #[arg(long, env = "REQUEUE_DEFAULT_DELAY", value_parser = parse_duration)]
    requeue_default_delay: Option<Duration>,

    /// wait used when the referenced datacenter does not exist
    #[arg(long, env = "REQUEUE_LONG_DELAY", value_parser = parse_duration)]
    requeue_long_delay: Option<Duration>,

    /// wait used while the datacenter is not ready
    #[arg(long, value_parser = parse_duration)]
    dependency_backoff: Option<Duration>,

    /// every resource is reconciled at least this often
    #[arg(long, value_parser = parse_duration)]
    resync_interval: Option<Duration>,

    /// Stargate release used when the resource does not pin an image
    #[arg(long, value_name = "version")]
    stargate_version: Option<String>,

    #[arg(long, value_name = "registry")]
    image_registry: Option<String>,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct OperatorOptRunMode {
    /// run against the kubernetes api server
    #[arg(long)]
    k8: bool,
}

#[derive(Debug, Eq, PartialEq)]
pub enum RunMode {
    K8s,
}

impl OperatorOpt {
    pub fn mode(&self) -> Result<RunMode> {
        if self.run_mode.k8 {
            Ok(RunMode::K8s)
        } else {
            Err(anyhow!("no run mode selected"))
        }
    }

    pub fn as_config(&self) -> Result<OperatorConfig> {
        let mut builder = OperatorConfig::builder();

        if let Some(namespace) = &self.namespace {
            builder.namespace(namespace.clone());
        }
        if let Some(delay) = self.requeue_default_delay {
            builder.default_delay(delay);
        }
        if let Some(delay) = self.requeue_long_delay {
            builder.long_delay(delay);
        }
        if let Some(backoff) = self.dependency_backoff {
            builder.dependency_backoff(backoff);
        }
        if let Some(interval) = self.resync_interval {
            builder.resync_interval(interval);
        }
        if let Some(version) = &self.stargate_version {
            builder.default_version(version.clone());
        }
        if let Some(registry) = &self.image_registry {
            builder.image_registry(registry.clone());
        }

        let config = builder.build()?;
        debug!(?config, "operator config");
        Ok(config)
    }
}
