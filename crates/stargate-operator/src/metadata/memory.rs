use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_lock::RwLock;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, trace};
use uuid::Uuid;

use k8_types::{InputK8Obj, K8Obj, ObjectMeta, Spec};

use super::{MetadataClient, StoreError};

/// namespace, name
type ObjectKey = (String, String);

/// Objects of a single kind, kept as JSON the same way the api server returns them.
#[derive(Debug, Default)]
struct KindStore {
    data: RwLock<BTreeMap<ObjectKey, Value>>,
}

/// In process metadata store.
///
/// Assigns uids and resource versions, rejects stale updates and garbage collects
/// owned objects when their owner is deleted. Nothing else runs against it, so
/// tests play the part of the other controllers (for example by writing
/// Deployment status).
#[derive(Debug, Default)]
pub struct MemoryMetadataClient {
    stores: RwLock<HashMap<String, Arc<KindStore>>>,
    version: AtomicU64,
}

impl MemoryMetadataClient {
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn get_store<S: Spec>(&self) -> Arc<KindStore> {
        let kind: String = S::kind();
        if let Some(store) = self.stores.read().await.get(&kind) {
            return store.clone();
        }

        let mut stores = self.stores.write().await;
        stores.entry(kind).or_default().clone()
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn key(metadata: &ObjectMeta) -> ObjectKey {
        (metadata.namespace.clone(), metadata.name.clone())
    }

    fn check_version<S: Spec>(current: &ObjectMeta, stored: &ObjectMeta) -> Result<(), StoreError> {
        if current.resource_version.is_empty()
            || current.resource_version == stored.resource_version
        {
            Ok(())
        } else {
            Err(StoreError::Conflict {
                kind: S::kind(),
                namespace: stored.namespace.clone(),
                name: stored.name.clone(),
                expected: current.resource_version.clone(),
            })
        }
    }

    /// read, modify and write back a single object under the store lock
    async fn modify<S, F>(&self, current: &ObjectMeta, modify: F) -> Result<K8Obj<S>, StoreError>
    where
        S: Spec,
        F: FnOnce(K8Obj<S>) -> Result<K8Obj<S>, StoreError>,
    {
        let store = self.get_store::<S>().await;
        let key = Self::key(current);
        let mut lock = store.data.write().await;

        let Some(value) = lock.get(&key) else {
            return Err(StoreError::not_found::<S>(&key.0, &key.1));
        };
        let stored: K8Obj<S> = serde_json::from_value(value.clone())?;
        let identity = stored.metadata.clone();

        let mut updated = modify(stored)?;
        updated.metadata.name = identity.name;
        updated.metadata.namespace = identity.namespace;
        updated.metadata.uid = identity.uid;
        updated.metadata.resource_version = self.next_version();

        lock.insert(key, serde_json::to_value(&updated)?);
        Ok(updated)
    }

    /// delete every object owned, directly or not, by `uid`
    async fn collect_garbage(&self, uid: String) {
        let stores: Vec<Arc<KindStore>> = self.stores.read().await.values().cloned().collect();
        let mut owners = VecDeque::from([uid]);

        while let Some(owner) = owners.pop_front() {
            for store in &stores {
                let mut lock = store.data.write().await;
                let owned: Vec<ObjectKey> = lock
                    .iter()
                    .filter(|(_, value)| owner_uids(value).any(|uid| uid == owner))
                    .map(|(key, _)| key.clone())
                    .collect();

                for key in owned {
                    if let Some(value) = lock.remove(&key) {
                        debug!(namespace = %key.0, name = %key.1, %owner, "garbage collected");
                        if let Some(uid) = value["metadata"]["uid"].as_str() {
                            owners.push_back(uid.to_owned());
                        }
                    }
                }
            }
        }
    }
}

fn owner_uids(value: &Value) -> impl Iterator<Item = &str> {
    value["metadata"]["ownerReferences"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|owner| owner["uid"].as_str())
}

/// RFC 7386 JSON merge patch
fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }

    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

#[async_trait]
impl MetadataClient for MemoryMetadataClient {
    async fn retrieve_item<S>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K8Obj<S>>, StoreError>
    where
        S: Spec,
    {
        let store = self.get_store::<S>().await;
        let lock = store.data.read().await;
        let Some(value) = lock.get(&(namespace.to_owned(), name.to_owned())) else {
            return Ok(None);
        };

        let output = value.clone();
        drop(lock);

        Ok(Some(serde_json::from_value(output)?))
    }

    async fn retrieve_items<S>(&self, namespace: &str) -> Result<Vec<K8Obj<S>>, StoreError>
    where
        S: Spec,
    {
        let store = self.get_store::<S>().await;
        let lock = store.data.read().await;
        let items: Result<Vec<K8Obj<S>>, _> = lock
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, value)| serde_json::from_value(value.clone()))
            .collect();

        Ok(items?)
    }

    async fn create_item<S>(&self, value: InputK8Obj<S>) -> Result<K8Obj<S>, StoreError>
    where
        S: Spec,
    {
        let store = self.get_store::<S>().await;
        let metadata = value.metadata;
        let key = (metadata.namespace.clone(), metadata.name.clone());

        let mut lock = store.data.write().await;
        if lock.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: S::kind(),
                namespace: key.0,
                name: key.1,
            });
        }

        let mut k8_obj: K8Obj<S> = K8Obj::new(metadata.name.clone(), value.spec);
        k8_obj.metadata = ObjectMeta {
            name: metadata.name,
            namespace: metadata.namespace,
            owner_references: metadata.owner_references,
            labels: metadata.labels,
            annotations: metadata.annotations,
            finalizers: metadata.finalizers,
            uid: Uuid::new_v4().to_string(),
            resource_version: self.next_version(),
            ..Default::default()
        };

        trace!(kind = %S::kind(), name = %k8_obj.metadata.name, "created");
        lock.insert(key, serde_json::to_value(&k8_obj)?);

        Ok(k8_obj)
    }

    async fn update_item<S>(&self, current: &K8Obj<S>, spec: S) -> Result<K8Obj<S>, StoreError>
    where
        S: Spec,
    {
        self.modify(&current.metadata, |mut stored: K8Obj<S>| {
            Self::check_version::<S>(&current.metadata, &stored.metadata)?;
            stored.spec = spec;
            Ok(stored)
        })
        .await
    }

    async fn patch_item<S>(
        &self,
        current: &K8Obj<S>,
        patch: &serde_json::Value,
    ) -> Result<K8Obj<S>, StoreError>
    where
        S: Spec,
    {
        self.modify(&current.metadata, |stored: K8Obj<S>| {
            let mut value = serde_json::to_value(&stored)?;
            merge_patch(&mut value, patch);
            Ok(serde_json::from_value(value)?)
        })
        .await
    }

    async fn update_status<S>(
        &self,
        current: &K8Obj<S>,
        status: S::Status,
    ) -> Result<K8Obj<S>, StoreError>
    where
        S: Spec,
    {
        self.modify(&current.metadata, |mut stored: K8Obj<S>| {
            Self::check_version::<S>(&current.metadata, &stored.metadata)?;
            stored.status = status;
            Ok(stored)
        })
        .await
    }

    async fn delete_item<S>(&self, current: &K8Obj<S>) -> Result<(), StoreError>
    where
        S: Spec,
    {
        let store = self.get_store::<S>().await;
        let key = Self::key(&current.metadata);

        let removed = store.data.write().await.remove(&key);
        let Some(value) = removed else {
            return Err(StoreError::not_found::<S>(&key.0, &key.1));
        };

        debug!(kind = %S::kind(), namespace = %key.0, name = %key.1, "deleted");
        if let Some(uid) = value["metadata"]["uid"].as_str() {
            self.collect_garbage(uid.to_owned()).await;
        }
        Ok(())
    }
}
