//!
//! # Metadata client
//!
//! Store operations the operator needs, independent of the backing store
//!
#[cfg(feature = "k8")]
pub mod k8;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use k8_diff::DiffError;
use k8_types::{InputK8Obj, K8Obj, Spec};

use stargate_metadata::deployment::LabelSelector;

pub use memory::MemoryMetadataClient;

pub type SharedClient<C> = Arc<C>;

#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// retrieve a single item, `None` if it does not exist
    async fn retrieve_item<S>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K8Obj<S>>, StoreError>
    where
        S: Spec;

    async fn retrieve_items<S>(&self, namespace: &str) -> Result<Vec<K8Obj<S>>, StoreError>
    where
        S: Spec;

    async fn create_item<S>(&self, value: InputK8Obj<S>) -> Result<K8Obj<S>, StoreError>
    where
        S: Spec;

    /// Replace the spec of an existing item.
    ///
    /// Fails with [`StoreError::Conflict`] if the item changed since `current` was read.
    async fn update_item<S>(&self, current: &K8Obj<S>, spec: S) -> Result<K8Obj<S>, StoreError>
    where
        S: Spec;

    /// apply a JSON merge patch to the whole object
    async fn patch_item<S>(
        &self,
        current: &K8Obj<S>,
        patch: &serde_json::Value,
    ) -> Result<K8Obj<S>, StoreError>
    where
        S: Spec;

    /// Replace status, with the same optimistic concurrency as [`MetadataClient::update_item`].
    async fn update_status<S>(
        &self,
        current: &K8Obj<S>,
        status: S::Status,
    ) -> Result<K8Obj<S>, StoreError>
    where
        S: Spec;

    async fn delete_item<S>(&self, current: &K8Obj<S>) -> Result<(), StoreError>
    where
        S: Spec;

    /// items whose labels match the selector
    async fn retrieve_labeled<S>(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<K8Obj<S>>, StoreError>
    where
        S: Spec,
    {
        let items = self.retrieve_items::<S>(namespace).await?;
        Ok(items
            .into_iter()
            .filter(|item| selector.matches(&item.metadata.labels))
            .collect())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("{kind} {namespace}/{name} was modified, resource version {expected} is stale")]
    Conflict {
        kind: String,
        namespace: String,
        name: String,
        expected: String,
    },
    #[error("Json serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Diff error")]
    Diff(#[from] DiffError),
    #[error("client error: {0}")]
    Client(#[source] anyhow::Error),
}

impl StoreError {
    pub fn not_found<S: Spec>(namespace: &str, name: &str) -> Self {
        Self::NotFound {
            kind: S::kind(),
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// races with other writers, resolved by the next pass
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::AlreadyExists { .. } | Self::Conflict { .. }
        )
    }
}
