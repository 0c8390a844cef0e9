//! In-process [`ResourceStore`]
//!
//! Behaves like the API server for the parts the engine relies on:
//! monotonically increasing `resourceVersion`s, conflict detection on stale
//! writes, a status subresource that main updates cannot touch, and
//! `NotFound` for kinds registered without a status subresource. Faults can be
//! injected into status updates and gets to exercise the commit protocol.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use async_trait::async_trait;
use kube::api::{DynamicObject, TypeMeta};
use kube::discovery::ApiResource;
use tokio::sync::Mutex;

use super::{ObjectKey, ResourceStore, StoreError};

/// Failure injected into `update_status` or `get` calls
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreFault {
    Conflict,
    NotFound,
    Unavailable,
}

/// Call counters, useful for asserting retry behaviour
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub status_updates: usize,
}

#[derive(Default)]
struct Inner {
    objects: HashMap<(String, ObjectKey), DynamicObject>,
    next_version: u64,
    no_status_subresource: BTreeSet<String>,
    status_faults: VecDeque<StoreFault>,
    always_fault_status: Option<StoreFault>,
    get_faults: VecDeque<StoreFault>,
    always_fault_get: Option<StoreFault>,
    stats: StoreStats,
}

impl Inner {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn next_status_fault(&mut self) -> Option<StoreFault> {
        self.status_faults
            .pop_front()
            .or(self.always_fault_status)
    }

    fn next_get_fault(&mut self) -> Option<StoreFault> {
        self.get_faults.pop_front().or(self.always_fault_get)
    }
}

/// Thread-safe in-memory object store
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn kind_id(kind: &ApiResource) -> String {
    format!("{}/{}", kind.api_version, kind.kind)
}

fn fault_error(fault: StoreFault, kind: &ApiResource, key: &ObjectKey) -> StoreError {
    match fault {
        StoreFault::Conflict => StoreError::Conflict {
            kind: kind.kind.clone(),
            key: key.clone(),
        },
        StoreFault::NotFound => StoreError::NotFound {
            kind: kind.kind.clone(),
            key: key.clone(),
        },
        StoreFault::Unavailable => StoreError::Unavailable("injected fault".to_string()),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `kind` as having no status subresource: `update_status` on it
    /// returns `NotFound`, and plain updates may write status
    pub async fn without_status_subresource(&self, kind: &ApiResource) {
        self.inner
            .lock()
            .await
            .no_status_subresource
            .insert(kind_id(kind));
    }

    /// Fail the next `update_status` calls with the given faults, in order
    pub async fn fail_next_status_updates(&self, faults: impl IntoIterator<Item = StoreFault>) {
        self.inner.lock().await.status_faults.extend(faults);
    }

    /// Fail every `update_status` call with `fault`
    pub async fn always_fail_status_updates(&self, fault: StoreFault) {
        self.inner.lock().await.always_fault_status = Some(fault);
    }

    /// Fail the next `get` calls with the given faults, in order
    pub async fn fail_next_gets(&self, faults: impl IntoIterator<Item = StoreFault>) {
        self.inner.lock().await.get_faults.extend(faults);
    }

    /// Fail every `get` call with `fault`
    pub async fn always_fail_gets(&self, fault: StoreFault) {
        self.inner.lock().await.always_fault_get = Some(fault);
    }

    pub async fn stats(&self) -> StoreStats {
        self.inner.lock().await.stats
    }

    pub async fn reset_stats(&self) {
        self.inner.lock().await.stats = StoreStats::default();
    }

    /// Number of stored objects of a kind
    pub async fn count(&self, kind: &ApiResource) -> usize {
        let id = kind_id(kind);
        self.inner
            .lock()
            .await
            .objects
            .keys()
            .filter(|(k, _)| *k == id)
            .count()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(
        &self,
        kind: &ApiResource,
        key: &ObjectKey,
    ) -> Result<DynamicObject, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.stats.gets += 1;
        if let Some(fault) = inner.next_get_fault() {
            return Err(fault_error(fault, kind, key));
        }
        inner
            .objects
            .get(&(kind_id(kind), key.clone()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: kind.kind.clone(),
                key: key.clone(),
            })
    }

    async fn list(
        &self,
        kind: &ApiResource,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.stats.lists += 1;
        let id = kind_id(kind);
        let mut items: Vec<DynamicObject> = inner
            .objects
            .iter()
            .filter(|((k, key), _)| {
                *k == id && namespace.map_or(true, |ns| key.namespace.as_deref() == Some(ns))
            })
            .filter(|(_, obj)| {
                let obj_labels = obj.metadata.labels.clone().unwrap_or_default();
                labels.iter().all(|(k, v)| obj_labels.get(k) == Some(v))
            })
            .map(|(_, obj)| obj.clone())
            .collect();
        items.sort_by_key(|obj| (obj.metadata.namespace.clone(), obj.metadata.name.clone()));
        Ok(items)
    }

    async fn create(
        &self,
        kind: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let key = ObjectKey::new(
            obj.metadata.namespace.clone(),
            obj.metadata.name.clone().unwrap_or_default(),
        );
        let mut inner = self.inner.lock().await;
        inner.stats.creates += 1;
        let id = (kind_id(kind), key.clone());
        if inner.objects.contains_key(&id) {
            return Err(StoreError::AlreadyExists {
                kind: kind.kind.clone(),
                key,
            });
        }

        let mut stored = obj.clone();
        stored.types = Some(TypeMeta {
            api_version: kind.api_version.clone(),
            kind: kind.kind.clone(),
        });
        stored.metadata.resource_version = Some(inner.bump_version());
        stored.metadata.generation = Some(1);
        if stored.metadata.uid.is_none() {
            stored.metadata.uid = Some(format!("uid-{}-{}", kind.kind.to_lowercase(), key));
        }
        // Status can only be written through the subresource once it exists
        if !inner.no_status_subresource.contains(&id.0) {
            if let Some(map) = stored.data.as_object_mut() {
                map.remove("status");
            }
        }
        inner.objects.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        kind: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let key = ObjectKey::new(
            obj.metadata.namespace.clone(),
            obj.metadata.name.clone().unwrap_or_default(),
        );
        let mut inner = self.inner.lock().await;
        inner.stats.updates += 1;
        let id = (kind_id(kind), key.clone());
        let has_subresource = !inner.no_status_subresource.contains(&id.0);

        let existing = inner
            .objects
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: kind.kind.clone(),
                key: key.clone(),
            })?;

        if let Some(rv) = &obj.metadata.resource_version {
            if existing.metadata.resource_version.as_ref() != Some(rv) {
                return Err(StoreError::Conflict {
                    kind: kind.kind.clone(),
                    key,
                });
            }
        }

        let mut stored = obj.clone();
        stored.types = existing.types.clone();
        stored.metadata.uid = existing.metadata.uid.clone();
        stored.metadata.resource_version = Some(inner.bump_version());

        // Spec changes bump the generation; status lives on the subresource
        let spec_changed = existing.data.get("spec") != obj.data.get("spec");
        let generation = existing.metadata.generation.unwrap_or(1);
        stored.metadata.generation = Some(if spec_changed { generation + 1 } else { generation });

        if has_subresource {
            match (stored.data.as_object_mut(), existing.data.get("status")) {
                (Some(map), Some(status)) => {
                    map.insert("status".to_string(), status.clone());
                }
                (Some(map), None) => {
                    map.remove("status");
                }
                _ => {}
            }
        }

        inner.objects.insert(id, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, kind: &ApiResource, key: &ObjectKey) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.stats.deletes += 1;
        inner
            .objects
            .remove(&(kind_id(kind), key.clone()))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                kind: kind.kind.clone(),
                key: key.clone(),
            })
    }

    async fn update_status(
        &self,
        kind: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let key = ObjectKey::new(
            obj.metadata.namespace.clone(),
            obj.metadata.name.clone().unwrap_or_default(),
        );
        let mut inner = self.inner.lock().await;
        inner.stats.status_updates += 1;

        if let Some(fault) = inner.next_status_fault() {
            return Err(fault_error(fault, kind, &key));
        }

        let id = (kind_id(kind), key.clone());
        if inner.no_status_subresource.contains(&id.0) {
            return Err(StoreError::NotFound {
                kind: kind.kind.clone(),
                key,
            });
        }

        let mut stored = inner
            .objects
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: kind.kind.clone(),
                key: key.clone(),
            })?;

        if let Some(rv) = &obj.metadata.resource_version {
            if stored.metadata.resource_version.as_ref() != Some(rv) {
                return Err(StoreError::Conflict {
                    kind: kind.kind.clone(),
                    key,
                });
            }
        }

        if let Some(map) = stored.data.as_object_mut() {
            match obj.data.get("status") {
                Some(status) => {
                    map.insert("status".to_string(), status.clone());
                }
                None => {
                    map.remove("status");
                }
            }
        }
        stored.metadata.resource_version = Some(inner.bump_version());
        inner.objects.insert(id, stored.clone());
        Ok(stored)
    }
}
