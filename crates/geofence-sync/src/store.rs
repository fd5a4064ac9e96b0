//! Bucketed geofence persistence.
//!
//! A [`GeofenceStore`] is one logical bucket of the shared key/value store,
//! identified by a prefix, holding a set of geofence ids and the serialized
//! fields of each. Three buckets (to-add, to-remove, synced) share one
//! underlying store without collision.
//!
//! Every logical save or remove is a single atomic batch, so concurrent
//! readers observe either the pre- or the post-mutation snapshot, and a
//! crash never leaves a half-written record reachable from the id-set.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, warn};

use geofence_core::descriptor::DEFAULT_RADIUS_M;
use geofence_core::{DataValue, GeofenceDescriptor, TransitionMask, FALLBACK_HANDLER, NEVER_EXPIRE};

use crate::error::{StoreError, StoreResult};
use crate::kv::{KeyValueStore, StoreValue, WriteBatch};

const FIELD_HANDLER: &str = "handler";
const FIELD_LATITUDE: &str = "latitude";
const FIELD_LONGITUDE: &str = "longitude";
const FIELD_RADIUS: &str = "radius";
const FIELD_TRANSITIONS: &str = "transitions";
const FIELD_LOITERING: &str = "loitering";
const FIELD_EXPIRATION: &str = "expiration";
const FIELD_DEADLINE: &str = "deadline";

const FIELDS: [&str; 8] = [
    FIELD_HANDLER,
    FIELD_LATITUDE,
    FIELD_LONGITUDE,
    FIELD_RADIUS,
    FIELD_TRANSITIONS,
    FIELD_LOITERING,
    FIELD_EXPIRATION,
    FIELD_DEADLINE,
];

/// A persistent repository of geofence descriptors (or bare ids) under a
/// bucket prefix.
#[derive(Clone)]
pub struct GeofenceStore {
    prefix: String,
    kv: Arc<dyn KeyValueStore>,
}

impl GeofenceStore {
    /// Create a bucket view over a shared key/value store.
    #[must_use]
    pub fn new(prefix: impl Into<String>, kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            prefix: prefix.into(),
            kv,
        }
    }

    /// The bucket prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn ids_key(&self) -> String {
        format!("{}.ids", self.prefix)
    }

    fn field_key(&self, id: &str, field: &str) -> String {
        format!("{}.{id}.{field}", self.prefix)
    }

    fn data_key(&self, id: &str, key: &str) -> String {
        format!("{}.{id}.data.{key}", self.prefix)
    }

    fn data_keys_key(&self, id: &str) -> String {
        format!("{}.{id}.data_keys", self.prefix)
    }

    async fn read_ids(&self) -> StoreResult<BTreeSet<String>> {
        Ok(self
            .kv
            .get(&self.ids_key())
            .await?
            .and_then(|v| v.as_string_set().cloned())
            .unwrap_or_default())
    }

    async fn read_scalar(&self, key: &str) -> StoreResult<Option<DataValue>> {
        Ok(self.kv.get(key).await?.and_then(|v| v.as_scalar().cloned()))
    }

    async fn read_data_keys(&self, id: &str) -> StoreResult<BTreeSet<String>> {
        Ok(self
            .kv
            .get(&self.data_keys_key(id))
            .await?
            .and_then(|v| v.as_string_set().cloned())
            .unwrap_or_default())
    }

    /// Upsert all fields of a descriptor and add its id to the id-set, as
    /// one atomic batch. Data entries left over from a previous save of
    /// the same id are deleted in the same batch.
    pub async fn save(&self, descriptor: &GeofenceDescriptor) -> StoreResult<()> {
        let id = descriptor.id();
        let mut ids = self.read_ids().await?;
        let stale_data_keys = self.read_data_keys(id).await?;

        let mut batch = WriteBatch::new();
        for key in &stale_data_keys {
            batch.delete(self.data_key(id, key));
        }

        batch.put(
            self.field_key(id, FIELD_HANDLER),
            DataValue::Str(descriptor.handler().to_string()),
        );
        // Doubles travel as their raw bit pattern; the store only speaks
        // the five scalar kinds.
        batch.put(
            self.field_key(id, FIELD_LATITUDE),
            DataValue::Long(descriptor.latitude().to_bits() as i64),
        );
        batch.put(
            self.field_key(id, FIELD_LONGITUDE),
            DataValue::Long(descriptor.longitude().to_bits() as i64),
        );
        batch.put(
            self.field_key(id, FIELD_RADIUS),
            DataValue::Float(descriptor.radius_m()),
        );
        batch.put(
            self.field_key(id, FIELD_TRANSITIONS),
            DataValue::Int(descriptor.transitions().bits() as i32),
        );
        batch.put(
            self.field_key(id, FIELD_LOITERING),
            DataValue::Int(descriptor.loitering_delay_ms()),
        );
        batch.put(
            self.field_key(id, FIELD_EXPIRATION),
            DataValue::Long(descriptor.expiration_duration_ms()),
        );
        batch.put(
            self.field_key(id, FIELD_DEADLINE),
            DataValue::Long(descriptor.expiration_deadline_ms()),
        );

        let data_keys: BTreeSet<String> = descriptor.data().keys().cloned().collect();
        for (key, value) in descriptor.data() {
            batch.put(self.data_key(id, key), value.clone());
        }
        batch.put(self.data_keys_key(id), StoreValue::StringSet(data_keys));

        ids.insert(id.to_string());
        batch.put(self.ids_key(), StoreValue::StringSet(ids));

        self.kv.apply(batch).await
    }

    /// Add a bare id to the bucket's id-set.
    pub async fn save_id(&self, id: &str) -> StoreResult<()> {
        let mut ids = self.read_ids().await?;
        if !ids.insert(id.to_string()) {
            // Set semantics: re-adding a pending id is a no-op.
            return Ok(());
        }
        let mut batch = WriteBatch::new();
        batch.put(self.ids_key(), StoreValue::StringSet(ids));
        self.kv.apply(batch).await
    }

    /// Remove a descriptor's fields and its id from the id-set.
    pub async fn remove(&self, descriptor: &GeofenceDescriptor) -> StoreResult<()> {
        self.remove_id(descriptor.id()).await
    }

    /// Remove all persisted fields for an id and drop it from the id-set.
    /// An unknown id is a logged no-op, not a failure.
    pub async fn remove_id(&self, id: &str) -> StoreResult<()> {
        if !self.discard_id(id).await? {
            warn!(
                bucket = %self.prefix,
                id,
                "remove requested for an id that is not in this bucket"
            );
        }
        Ok(())
    }

    /// Like [`GeofenceStore::remove_id`] but silent about unknown ids.
    /// Returns whether the id was present.
    pub async fn discard_id(&self, id: &str) -> StoreResult<bool> {
        let mut ids = self.read_ids().await?;
        if !ids.remove(id) {
            return Ok(false);
        }

        let data_keys = self.read_data_keys(id).await?;
        let mut batch = WriteBatch::new();
        for field in FIELDS {
            batch.delete(self.field_key(id, field));
        }
        for key in &data_keys {
            batch.delete(self.data_key(id, key));
        }
        batch.delete(self.data_keys_key(id));
        batch.put(self.ids_key(), StoreValue::StringSet(ids));

        self.kv.apply(batch).await?;
        Ok(true)
    }

    /// Whether the bucket's id-set contains `id`.
    pub async fn contains(&self, id: &str) -> StoreResult<bool> {
        Ok(self.read_ids().await?.contains(id))
    }

    /// All ids currently in the bucket.
    pub async fn get_all_ids(&self) -> StoreResult<BTreeSet<String>> {
        self.read_ids().await
    }

    /// Reconstruct a descriptor. `Ok(None)` when the id is not in the
    /// bucket; an error when the record is present but malformed.
    pub async fn get(&self, id: &str) -> StoreResult<Option<GeofenceDescriptor>> {
        if !self.contains(id).await? {
            return Ok(None);
        }
        self.read_descriptor(id).await.map(Some)
    }

    /// Every descriptor reconstructible from the bucket. Malformed records
    /// are skipped, never fail the whole read.
    pub async fn get_all(&self) -> StoreResult<Vec<GeofenceDescriptor>> {
        let ids = self.read_ids().await?;
        let mut descriptors = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.read_descriptor(id).await {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(err) => {
                    warn!(bucket = %self.prefix, id, "skipping unreconstructible geofence: {err}");
                }
            }
        }
        Ok(descriptors)
    }

    /// Rebuild one descriptor from its persisted fields, filling documented
    /// defaults for fields a record may predate.
    async fn read_descriptor(&self, id: &str) -> StoreResult<GeofenceDescriptor> {
        let latitude = self
            .read_scalar(&self.field_key(id, FIELD_LATITUDE))
            .await?
            .and_then(|v| v.as_long())
            .map(|bits| f64::from_bits(bits as u64))
            .ok_or_else(|| StoreError::MalformedRecord {
                id: id.to_string(),
                reason: "missing latitude".to_string(),
            })?;
        let longitude = self
            .read_scalar(&self.field_key(id, FIELD_LONGITUDE))
            .await?
            .and_then(|v| v.as_long())
            .map(|bits| f64::from_bits(bits as u64))
            .ok_or_else(|| StoreError::MalformedRecord {
                id: id.to_string(),
                reason: "missing longitude".to_string(),
            })?;

        let handler = self
            .read_scalar(&self.field_key(id, FIELD_HANDLER))
            .await?
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| FALLBACK_HANDLER.to_string());
        let radius_m = self
            .read_scalar(&self.field_key(id, FIELD_RADIUS))
            .await?
            .and_then(|v| v.as_float())
            .unwrap_or(DEFAULT_RADIUS_M);
        let transitions = self
            .read_scalar(&self.field_key(id, FIELD_TRANSITIONS))
            .await?
            .and_then(|v| v.as_int())
            .map_or_else(TransitionMask::default, |bits| {
                TransitionMask::from_bits(bits as u32)
            });
        let loitering_delay_ms = self
            .read_scalar(&self.field_key(id, FIELD_LOITERING))
            .await?
            .and_then(|v| v.as_int())
            .unwrap_or(0);
        let expiration_duration_ms = self
            .read_scalar(&self.field_key(id, FIELD_EXPIRATION))
            .await?
            .and_then(|v| v.as_long())
            .unwrap_or(NEVER_EXPIRE);
        let expiration_deadline_ms = self
            .read_scalar(&self.field_key(id, FIELD_DEADLINE))
            .await?
            .and_then(|v| v.as_long())
            .unwrap_or(0);

        let mut data = BTreeMap::new();
        for key in self.read_data_keys(id).await? {
            match self.read_scalar(&self.data_key(id, &key)).await? {
                Some(value) => {
                    data.insert(key, value);
                }
                None => {
                    warn!(
                        bucket = %self.prefix,
                        id,
                        key,
                        "dropping additional data entry with missing value"
                    );
                }
            }
        }

        debug!(bucket = %self.prefix, id, "reconstructed geofence from store");
        Ok(GeofenceDescriptor::from_parts(
            id.to_string(),
            handler,
            latitude,
            longitude,
            radius_m,
            transitions,
            loitering_delay_ms,
            expiration_duration_ms,
            expiration_deadline_ms,
            data,
        ))
    }
}
