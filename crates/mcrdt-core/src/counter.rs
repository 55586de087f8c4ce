//! Grow-only and Positive/Negative counters.
//!
//! Both variants share one container: the stored value is the running sum of
//! every merged increment. A grow-only counter rejects negative increments at
//! production and at merge time. Addition alone is not idempotent, so each
//! merge records the event id in the same atomic batch as the new sum and a
//! replayed event is skipped.

use crate::base::{decode_value, encode_value, has_raw, read_raw};
use crate::delta::CrdtDelta;
use crate::error::{CoreError, Result};
use crate::key::{CollectionSchemaVersionKey, DataStoreKey, HeadStoreKey};
use crate::priority::{encode_priority, get_priority};
use crate::replicated::{CType, Delta, ReplicatedData};
use crate::store::{DatastoreRef, WriteBatch};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// A single increment of a counter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDelta {
    pub doc_id: Vec<u8>,
    pub field_name: String,
    pub priority: u64,
    /// Random value making otherwise identical increments hash to distinct
    /// blocks. Zero on the first write of a key, so that block is reproducible.
    pub nonce: i64,
    pub schema_version_id: String,
    /// The encoded increment amount.
    pub data: Vec<u8>,
}

impl Delta for CounterDelta {
    fn priority(&self) -> u64 {
        self.priority
    }

    fn set_priority(&mut self, priority: u64) {
        self.priority = priority;
    }
}

impl From<CounterDelta> for CrdtDelta {
    fn from(delta: CounterDelta) -> Self {
        CrdtDelta::Counter(delta)
    }
}

impl TryFrom<CrdtDelta> for CounterDelta {
    type Error = CoreError;

    fn try_from(delta: CrdtDelta) -> Result<Self> {
        match delta {
            CrdtDelta::Counter(d) => Ok(d),
            other => Err(CoreError::TypeMismatch {
                expected: "counter",
                found: other.kind_name(),
            }),
        }
    }
}

/// Numeric kinds a counter can accumulate.
pub trait Incrementable:
    Copy + PartialOrd + Default + Serialize + DeserializeOwned + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    const KIND: NumericKind;

    fn accumulate(self, amount: Self) -> Self;

    fn is_negative(self) -> bool {
        self < Self::default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NumericKind {
    Int,
    Float32,
    Float64,
}

/// Integer counters roll over on overflow.
impl Incrementable for i64 {
    const KIND: NumericKind = NumericKind::Int;

    fn accumulate(self, amount: Self) -> Self {
        self.wrapping_add(amount)
    }
}

impl Incrementable for f32 {
    const KIND: NumericKind = NumericKind::Float32;

    fn accumulate(self, amount: Self) -> Self {
        self + amount
    }
}

impl Incrementable for f64 {
    const KIND: NumericKind = NumericKind::Float64;

    fn accumulate(self, amount: Self) -> Self {
        self + amount
    }
}

/// A counter over numeric kind `T` stored under one field key.
pub struct Counter<T: Incrementable> {
    store: DatastoreRef,
    key: DataStoreKey,
    schema_version_id: String,
    field_name: String,
    allow_decrement: bool,
    _kind: PhantomData<fn() -> T>,
}

impl<T: Incrementable> Counter<T> {
    /// `allow_decrement` selects the PN-counter variant.
    pub fn new(
        store: DatastoreRef,
        schema_version_key: &CollectionSchemaVersionKey,
        key: DataStoreKey,
        field_name: impl Into<String>,
        allow_decrement: bool,
    ) -> Self {
        Self {
            store,
            key,
            schema_version_id: schema_version_key.schema_version_id.clone(),
            field_name: field_name.into(),
            allow_decrement,
            _kind: PhantomData,
        }
    }

    pub fn grow_only(
        store: DatastoreRef,
        schema_version_key: &CollectionSchemaVersionKey,
        key: DataStoreKey,
        field_name: impl Into<String>,
    ) -> Self {
        Self::new(store, schema_version_key, key, field_name, false)
    }

    pub fn positive_negative(
        store: DatastoreRef,
        schema_version_key: &CollectionSchemaVersionKey,
        key: DataStoreKey,
        field_name: impl Into<String>,
    ) -> Self {
        Self::new(store, schema_version_key, key, field_name, true)
    }

    /// Produce a delta adding `amount`. Stored state is not touched.
    pub fn increment(&self, amount: T) -> Result<CounterDelta> {
        self.check_sign(amount)?;

        let value_key = self.key.with_value_flag().to_bytes();
        let nonce = if has_raw(self.store.as_ref(), &value_key)? {
            rand::thread_rng().gen_range(0..i64::MAX)
        } else {
            0
        };

        Ok(CounterDelta {
            doc_id: self.key.doc_id.as_bytes().to_vec(),
            field_name: self.field_name.clone(),
            priority: self.priority()? + 1,
            nonce,
            schema_version_id: self.schema_version_id.clone(),
            data: encode_value("counter increment", &amount)?,
        })
    }

    /// Accumulated sum, zero when nothing has been merged.
    pub fn value(&self) -> Result<T> {
        let value_key = self.key.with_value_flag().to_bytes();
        match read_raw(self.store.as_ref(), &value_key)? {
            Some(bytes) => decode_value(&value_key, &bytes),
            None => Ok(T::default()),
        }
    }

    pub fn priority(&self) -> Result<u64> {
        get_priority(self.store.as_ref(), &self.key)
    }

    pub fn allows_decrement(&self) -> bool {
        self.allow_decrement
    }

    pub fn key(&self) -> &DataStoreKey {
        &self.key
    }

    fn check_sign(&self, amount: T) -> Result<()> {
        if !self.allow_decrement && amount.is_negative() {
            return Err(CoreError::NegativeValue(amount.to_string()));
        }
        Ok(())
    }

    fn increment_value(&self, data: &[u8], priority: u64, id: &str) -> Result<()> {
        let value_key = self.key.with_value_flag().to_bytes();
        let amount: T = decode_value(&value_key, data)?;
        self.check_sign(amount)?;

        let event_key = self.key.event_key(id);
        if has_raw(self.store.as_ref(), &event_key)? {
            return Ok(());
        }

        let new_value = self.value()?.accumulate(amount);

        let mut batch = WriteBatch::new();
        batch
            .put(value_key.clone(), encode_value("counter value", &new_value)?)
            .put(event_key, Vec::new());
        if priority > self.priority()? {
            batch.put(self.key.with_priority_flag().to_bytes(), encode_priority(priority));
        }
        self.store
            .write_batch(batch)
            .map_err(|e| CoreError::store("put", &value_key, e))
    }
}

impl<T: Incrementable> ReplicatedData for Counter<T> {
    type Delta = CounterDelta;

    fn ctype(&self) -> CType {
        if self.allow_decrement {
            CType::PnCounter
        } else {
            CType::PCounter
        }
    }

    fn head_store_key(&self) -> HeadStoreKey {
        self.key.to_head_store_key()
    }

    fn merge(&self, delta: &CounterDelta, id: &str) -> Result<()> {
        self.increment_value(&delta.data, delta.priority, id)
    }
}
