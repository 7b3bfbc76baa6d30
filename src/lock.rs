use std::boxed::Box;
use std::collections::HashMap;
use std::result::Result as DefaultResult;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::{Builder, NoContext, Timestamp};

use crate::constant::datastore as ds_label;
use crate::datastore::{AbstInMemoryDStore, AppInMemFetchedSingleRow};
use crate::error::AppError;

mod _lockm {
    pub(super) enum InMemColIdx {
        OwnerToken,
        Expiry,
        TotNumColumns,
    }
    impl From<InMemColIdx> for usize {
        fn from(value: InMemColIdx) -> usize {
            match value {
                InMemColIdx::OwnerToken => 0,
                InMemColIdx::Expiry => 1,
                InMemColIdx::TotNumColumns => 2,
            }
        }
    }
}

/// cross-process mutual exclusion on an arbitrary resource name, one
/// record per resource in the shared store, reclaimed by expiry when a
/// holder crashes without unlocking
#[async_trait]
pub trait AbstractResourceLock: Send + Sync {
    /// single atomic set-if-absent attempt, never blocks nor retries,
    /// callers wanting blocking semantics loop with back-off themselves
    async fn try_lock(&self, ttl: Duration) -> DefaultResult<bool, AppError>;

    /// compare-owner-then-delete as one atomic step, a stale call from a
    /// previous holder never removes the current holder's record
    async fn unlock(&self) -> DefaultResult<bool, AppError>;

    fn resource(&self) -> &str;
}

pub struct AppDStoreResourceLock {
    dstore: Arc<Box<dyn AbstInMemoryDStore>>,
    resource: String,
    owner_token: String,
}

// UUIDv7 is for single-node application. This app needs to consider
// scalability of multi-node environment, UUIDv8 can be utilized cuz it
// allows custom ID layout, few bits of the ID represent each machine
// node, rest of that is timestamp with random byte sequence
fn generate_owner_token(machine_code: u8) -> String {
    let ts_ctx = NoContext;
    let (secs, nano) = Timestamp::now(ts_ctx).to_unix();
    let millis = (secs * 1000).saturating_add((nano as u64) / 1_000_000);
    let mut node_id = rand::random::<[u8; 10]>();
    node_id[0] = machine_code;
    let uid = Builder::from_unix_timestamp_millis(millis, &node_id).into_uuid();
    // the thread identifier is captured once at construction, so release
    // still matches when the critical section completes on another thread
    let thread_id = std::thread::current().id();
    format!("{}-{:?}", uid.simple(), thread_id)
}

impl AppDStoreResourceLock {
    pub async fn try_build(
        dstore: Arc<Box<dyn AbstInMemoryDStore>>,
        resource: String,
    ) -> DefaultResult<Self, AppError> {
        dstore.create_table(ds_label::TABLE_RESOURCE_LOCK).await?;
        let owner_token = generate_owner_token(crate::constant::app_meta::MACHINE_CODE);
        Ok(Self {
            dstore,
            resource,
            owner_token,
        })
    }

    fn fetch_keys(&self) -> HashMap<String, Vec<String>> {
        HashMap::from([(
            ds_label::TABLE_RESOURCE_LOCK.to_string(),
            vec![self.resource.clone()],
        )])
    }

    fn row_expired(row: &AppInMemFetchedSingleRow, t_now: &DateTime<Utc>) -> bool {
        let idx: usize = _lockm::InMemColIdx::Expiry.into();
        match row.get(idx).map(|s| DateTime::parse_from_rfc3339(s)) {
            Some(Ok(exp)) => &exp < t_now,
            // a corrupted expiry column must not wedge the resource forever
            _others => true,
        }
    }
} // end of impl AppDStoreResourceLock

#[async_trait]
impl AbstractResourceLock for AppDStoreResourceLock {
    async fn try_lock(&self, ttl: Duration) -> DefaultResult<bool, AppError> {
        let t_now = Utc::now();
        let (tableset, d_lock) = self.dstore.fetch_acquire(self.fetch_keys()).await?;
        let curr_row = tableset
            .get(ds_label::TABLE_RESOURCE_LOCK)
            .and_then(|t| t.get(self.resource.as_str()));
        let vacant = match curr_row {
            Some(row) => Self::row_expired(row, &t_now),
            None => true,
        };
        if !vacant {
            return Ok(false); // store unlocked on guard drop
        }
        let expiry = t_now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        let mut row = (0.._lockm::InMemColIdx::TotNumColumns.into())
            .map(|_n| String::new())
            .collect::<Vec<String>>();
        row[usize::from(_lockm::InMemColIdx::OwnerToken)] = self.owner_token.clone();
        row[usize::from(_lockm::InMemColIdx::Expiry)] = expiry.to_rfc3339();
        let table = HashMap::from([(self.resource.clone(), row)]);
        let data = HashMap::from([(ds_label::TABLE_RESOURCE_LOCK.to_string(), table)]);
        let _num = self.dstore.save_release(data, d_lock)?;
        Ok(true)
    } // end of fn try_lock

    async fn unlock(&self) -> DefaultResult<bool, AppError> {
        let (tableset, d_lock) = self.dstore.fetch_acquire(self.fetch_keys()).await?;
        let curr_owner = tableset
            .get(ds_label::TABLE_RESOURCE_LOCK)
            .and_then(|t| t.get(self.resource.as_str()))
            .and_then(|row| row.get(usize::from(_lockm::InMemColIdx::OwnerToken)));
        let matched = curr_owner
            .map(|tok| tok.as_str() == self.owner_token.as_str())
            .unwrap_or(false);
        if matched {
            let info = HashMap::from([(
                ds_label::TABLE_RESOURCE_LOCK.to_string(),
                vec![self.resource.clone()],
            )]);
            let num = self.dstore.delete_release(info, d_lock)?;
            Ok(num == 1)
        } else {
            Ok(false) // expired then taken over, or never held
        }
    } // end of fn unlock

    fn resource(&self) -> &str {
        self.resource.as_str()
    }
} // end of impl AppDStoreResourceLock
