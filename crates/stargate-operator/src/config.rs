use std::time::Duration;

use anyhow::{Result, anyhow};
use derive_builder::Builder;

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_STARGATE_VERSION: &str = "1.0.45";
pub const DEFAULT_IMAGE_REGISTRY: &str = "docker.io/stargateio";
pub const DEFAULT_METRICS_PORT: u16 = 8085;

const DEFAULT_REQUEUE_DELAY: Duration = Duration::from_secs(15);
const DEFAULT_LONG_DELAY: Duration = Duration::from_secs(60);
const DEFAULT_DEPENDENCY_BACKOFF: Duration = Duration::from_secs(15);
const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_ERROR_BACKOFF_MIN: Duration = Duration::from_secs(1);
const DEFAULT_ERROR_BACKOFF_MAX: Duration = Duration::from_secs(60);
const DEFAULT_ERROR_BACKOFF_FACTOR: f64 = 2.0;

/// Runtime settings shared by the controller and the reconciler
#[derive(Debug, Builder, Clone, PartialEq)]
#[builder(build_fn(private, name = "build_impl"))]
pub struct OperatorConfig {
    /// namespace watched for Stargate resources
    #[builder(setter(into), default = "DEFAULT_NAMESPACE.to_owned()")]
    pub namespace: String,
    /// poll interval while replicas are converging
    #[builder(default = "DEFAULT_REQUEUE_DELAY")]
    pub default_delay: Duration,
    /// wait used when the referenced datacenter does not exist
    #[builder(default = "DEFAULT_LONG_DELAY")]
    pub long_delay: Duration,
    /// wait used while the datacenter exists but is not ready
    #[builder(default = "DEFAULT_DEPENDENCY_BACKOFF")]
    pub dependency_backoff: Duration,
    #[builder(default = "DEFAULT_RESYNC_INTERVAL")]
    pub resync_interval: Duration,
    #[builder(default = "DEFAULT_ERROR_BACKOFF_MIN")]
    pub error_backoff_min: Duration,
    #[builder(default = "DEFAULT_ERROR_BACKOFF_MAX")]
    pub error_backoff_max: Duration,
    #[builder(default = "DEFAULT_ERROR_BACKOFF_FACTOR")]
    pub error_backoff_factor: f64,
    /// Stargate release used when the resource does not pin an image
    #[builder(setter(into), default = "DEFAULT_STARGATE_VERSION.to_owned()")]
    pub default_version: String,
    #[builder(setter(into), default = "DEFAULT_IMAGE_REGISTRY.to_owned()")]
    pub image_registry: String,
    #[builder(default = "DEFAULT_METRICS_PORT")]
    pub metrics_port: u16,
}

impl OperatorConfig {
    pub fn builder() -> OperatorConfigBuilder {
        OperatorConfigBuilder::default()
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            default_delay: DEFAULT_REQUEUE_DELAY,
            long_delay: DEFAULT_LONG_DELAY,
            dependency_backoff: DEFAULT_DEPENDENCY_BACKOFF,
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            error_backoff_min: DEFAULT_ERROR_BACKOFF_MIN,
            error_backoff_max: DEFAULT_ERROR_BACKOFF_MAX,
            error_backoff_factor: DEFAULT_ERROR_BACKOFF_FACTOR,
            default_version: DEFAULT_STARGATE_VERSION.to_owned(),
            image_registry: DEFAULT_IMAGE_REGISTRY.to_owned(),
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

impl OperatorConfigBuilder {
    pub fn build(&self) -> Result<OperatorConfig> {
        let config = self
            .build_impl()
            .map_err(|e| anyhow!("invalid operator config: {e}"))?;

        if config.error_backoff_min > config.error_backoff_max {
            return Err(anyhow!(
                "error backoff minimum {:?} exceeds maximum {:?}",
                config.error_backoff_min,
                config.error_backoff_max
            ));
        }
        if config.error_backoff_factor < 1.0 {
            return Err(anyhow!(
                "error backoff factor must be at least 1, got {}",
                config.error_backoff_factor
            ));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod test {

    use std::time::Duration;

    use super::OperatorConfig;

    #[test]
    fn test_builder_defaults() {
        let config = OperatorConfig::builder().build().expect("build");
        assert_eq!(config, OperatorConfig::default());
        assert_eq!(config.namespace, "default");
        assert_eq!(config.default_delay, Duration::from_secs(15));
        assert_eq!(config.long_delay, Duration::from_secs(60));
    }

    #[test]
    fn test_builder_overrides() {
        let config = OperatorConfig::builder()
            .namespace("k8ssandra")
            .default_delay(Duration::from_secs(5))
            .build()
            .expect("build");
        assert_eq!(config.namespace, "k8ssandra");
        assert_eq!(config.default_delay, Duration::from_secs(5));
        assert_eq!(config.resync_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_backoff() {
        assert!(
            OperatorConfig::builder()
                .error_backoff_min(Duration::from_secs(120))
                .build()
                .is_err()
        );
        assert!(
            OperatorConfig::builder()
                .error_backoff_factor(0.5)
                .build()
                .is_err()
        );
    }
}
