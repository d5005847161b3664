use async_trait::async_trait;
use tracing::debug;

use k8_client::{ClientError, SharedK8Client};
use k8_client::http::status::StatusCode;
use k8_client::meta_client::{MetadataClient as _, PatchMergeType};
use k8_types::{InputK8Obj, InputObjectMeta, K8Obj, Spec, UpdateK8ObjStatus, UpdatedK8Obj};

use super::{MetadataClient, StoreError};

/// Metadata client backed by the Kubernetes api server
pub struct K8MetadataClient {
    client: SharedK8Client,
}

impl K8MetadataClient {
    pub fn new(client: SharedK8Client) -> Self {
        Self { client }
    }

    /// load client from kube config or in cluster service account
    pub fn load() -> anyhow::Result<Self> {
        let client = k8_client::load_and_share()?;
        Ok(Self::new(client))
    }
}

fn has_code(err: &ClientError, code: StatusCode) -> bool {
    matches!(err, ClientError::ApiResponse(status) if status.code == Some(code.as_u16()))
}

fn into_store_error<S: Spec>(err: ClientError, namespace: &str, name: &str) -> StoreError {
    if has_code(&err, StatusCode::NOT_FOUND) {
        StoreError::not_found::<S>(namespace, name)
    } else if has_code(&err, StatusCode::CONFLICT) {
        StoreError::Conflict {
            kind: S::kind(),
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            expected: String::new(),
        }
    } else {
        StoreError::Client(anyhow::anyhow!("{err}"))
    }
}

#[async_trait]
impl MetadataClient for K8MetadataClient {
    async fn retrieve_item<S>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K8Obj<S>>, StoreError>
    where
        S: Spec,
    {
        match self
            .client
            .retrieve_item::<S, _>(&InputObjectMeta::named(name, namespace))
            .await
        {
            Ok(item) => Ok(Some(item)),
            Err(err) if has_code(&err, StatusCode::NOT_FOUND) => Ok(None),
            Err(err) => Err(into_store_error::<S>(err, namespace, name)),
        }
    }

    async fn retrieve_items<S>(&self, namespace: &str) -> Result<Vec<K8Obj<S>>, StoreError>
    where
        S: Spec,
    {
        let list = self
            .client
            .retrieve_items::<S, _>(namespace)
            .await
            .map_err(|err| into_store_error::<S>(err, namespace, ""))?;
        Ok(list.items)
    }

    async fn create_item<S>(&self, value: InputK8Obj<S>) -> Result<K8Obj<S>, StoreError>
    where
        S: Spec,
    {
        let namespace = value.metadata.namespace.clone();
        let name = value.metadata.name.clone();
        debug!(kind = %S::kind(), %namespace, %name, "creating");
        self.client
            .create_item(value)
            .await
            .map_err(|err| into_store_error::<S>(err, &namespace, &name))
    }

    async fn update_item<S>(&self, current: &K8Obj<S>, spec: S) -> Result<K8Obj<S>, StoreError>
    where
        S: Spec,
    {
        let input: UpdatedK8Obj<S> = UpdatedK8Obj::new(spec, current.metadata.clone().into());
        self.client
            .replace_item(input)
            .await
            .map_err(|err| {
                into_store_error::<S>(err, &current.metadata.namespace, &current.metadata.name)
            })
    }

    async fn patch_item<S>(
        &self,
        current: &K8Obj<S>,
        patch: &serde_json::Value,
    ) -> Result<K8Obj<S>, StoreError>
    where
        S: Spec,
    {
        self.client
            .patch::<S, _>(&current.metadata.as_input(), patch, PatchMergeType::JsonMerge)
            .await
            .map_err(|err| {
                into_store_error::<S>(err, &current.metadata.namespace, &current.metadata.name)
            })
    }

    async fn update_status<S>(
        &self,
        current: &K8Obj<S>,
        status: S::Status,
    ) -> Result<K8Obj<S>, StoreError>
    where
        S: Spec,
    {
        let update: UpdateK8ObjStatus<S> =
            UpdateK8ObjStatus::new(status, current.metadata.clone().into());
        self.client
            .update_status(&update)
            .await
            .map_err(|err| {
                into_store_error::<S>(err, &current.metadata.namespace, &current.metadata.name)
            })
    }

    async fn delete_item<S>(&self, current: &K8Obj<S>) -> Result<(), StoreError>
    where
        S: Spec,
    {
        self.client
            .delete_item_with_option::<S, _>(&current.metadata, None)
            .await
            .map_err(|err| {
                into_store_error::<S>(err, &current.metadata.namespace, &current.metadata.name)
            })?;
        Ok(())
    }
}
