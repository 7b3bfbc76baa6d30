use std::boxed::Box;
use std::collections::HashMap;
use std::result::Result as DefaultResult;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::config::AppCacheCfg;
use crate::constant::{datastore as ds_label, lock_name};
use crate::datastore::AbstInMemoryDStore;
use crate::error::{AppError, AppErrorCode};
use crate::lock::{AbstractResourceLock, AppDStoreResourceLock};
use crate::logging::{app_log_event, AppLogContext, AppLogLevel};

mod _cachem {
    pub(super) enum InMemColIdx {
        Payload,
        StoreExpiry,
        TotNumColumns,
    }
    impl From<InMemColIdx> for usize {
        fn from(value: InMemColIdx) -> usize {
            match value {
                InMemColIdx::Payload => 0,
                InMemColIdx::StoreExpiry => 1,
                InMemColIdx::TotNumColumns => 2,
            }
        }
    }
}

/// source-of-truth loader behind the cache, implementors typically wrap
/// a repository, the payload is the serialized value to cache as-is
#[async_trait]
pub trait AbstractCacheSource: Send + Sync {
    async fn load(&self, id: &str) -> DefaultResult<Option<String>, AppError>;
}

// logical-expiry entries embed their own deadline in the payload instead
// of relying on store-level TTL, readers can keep serving the stale value
// while one background task refreshes it
#[derive(Serialize, Deserialize)]
struct LogicalExpiryWrapper {
    data: String,
    expire_time: String,
}

enum CachedHit {
    Value(String),
    Negative,
    Miss,
}

pub struct AppCacheClient {
    dstore: Arc<Box<dyn AbstInMemoryDStore>>,
    logctx: Arc<AppLogContext>,
    rebuild_pool: Arc<Semaphore>,
    rebuild_pool_sz: u16,
    rebuild_lock_ttl: Duration,
    negative_ttl: Duration,
    ttl_jitter_secs: u16,
}

impl AppCacheClient {
    pub async fn try_build(
        dstore: Arc<Box<dyn AbstInMemoryDStore>>,
        logctx: Arc<AppLogContext>,
        cfg: &AppCacheCfg,
    ) -> DefaultResult<Self, AppError> {
        dstore.create_table(ds_label::TABLE_CACHE).await?;
        Ok(Self {
            dstore,
            logctx,
            rebuild_pool: Arc::new(Semaphore::new(cfg.rebuild_pool_sz as usize)),
            rebuild_pool_sz: cfg.rebuild_pool_sz,
            rebuild_lock_ttl: Duration::from_secs(cfg.rebuild_lock_ttl_secs as u64),
            negative_ttl: Duration::from_secs(cfg.negative_ttl_secs as u64),
            ttl_jitter_secs: cfg.ttl_jitter_secs,
        })
    }

    pub async fn set_with_ttl(
        &self,
        key: &str,
        payload: String,
        ttl: Duration,
    ) -> DefaultResult<(), AppError> {
        let expiry = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        Self::write_row(&self.dstore, key, payload, expiry.to_rfc3339()).await
    }

    pub async fn set_with_logical_expiry(
        &self,
        key: &str,
        payload: String,
        ttl: Duration,
    ) -> DefaultResult<(), AppError> {
        Self::write_logical(&self.dstore, key, payload, ttl).await
    }

    /// penetration defense, a source miss becomes a short-lived negative
    /// entry so repeated lookups of an absent key stop reaching the source
    pub async fn get_with_passthrough(
        &self,
        keyprefix: &str,
        id: &str,
        src: Arc<Box<dyn AbstractCacheSource>>,
        ttl: Duration,
    ) -> DefaultResult<Option<String>, AppError> {
        let key = format!("{}{}", keyprefix, id);
        match self.fetch_row(key.as_str()).await? {
            CachedHit::Value(v) => Ok(Some(v)),
            CachedHit::Negative => Ok(None),
            CachedHit::Miss => match src.load(id).await? {
                Some(v) => {
                    let jitter = if self.ttl_jitter_secs > 0 {
                        rand::thread_rng().gen_range(0..=self.ttl_jitter_secs)
                    } else {
                        0
                    }; // spread out expiry instants of entries written in bursts
                    let ttl = ttl + Duration::from_secs(jitter as u64);
                    self.set_with_ttl(key.as_str(), v.clone(), ttl).await?;
                    Ok(Some(v))
                }
                None => {
                    self.set_with_ttl(key.as_str(), String::new(), self.negative_ttl)
                        .await?;
                    Ok(None)
                }
            },
        }
    } // end of fn get_with_passthrough

    /// breakdown defense, expired entries keep serving their last value
    /// while at most one caller hands the reload to the bounded rebuild
    /// pool, readers are never blocked behind the source of truth
    pub async fn get_with_logical_expiry(
        &self,
        keyprefix: &str,
        id: &str,
        src: Arc<Box<dyn AbstractCacheSource>>,
        ttl: Duration,
    ) -> DefaultResult<Option<String>, AppError> {
        let key = format!("{}{}", keyprefix, id);
        let wrapper = match self.fetch_row(key.as_str()).await? {
            CachedHit::Value(v) => Self::parse_wrapper(v.as_str())?,
            // logical-expiry entries are pre-seeded, a plain miss means
            // the key was never published
            CachedHit::Negative | CachedHit::Miss => return Ok(None),
        };
        let t_now = Utc::now();
        if !Self::wrapper_expired(&wrapper, &t_now)? {
            return Ok(Some(wrapper.data));
        }
        let lock_id = format!("{}{}", lock_name::CACHE_REBUILD_PREFIX, key);
        let rlock = AppDStoreResourceLock::try_build(self.dstore.clone(), lock_id).await?;
        if !rlock.try_lock(self.rebuild_lock_ttl).await? {
            return Ok(Some(wrapper.data)); // rebuild already in flight
        }
        // double-check after winning the lock, another caller may have
        // refreshed the entry in between
        if let CachedHit::Value(v) = self.fetch_row(key.as_str()).await? {
            let recheck = Self::parse_wrapper(v.as_str())?;
            if !Self::wrapper_expired(&recheck, &t_now)? {
                let _ = rlock.unlock().await?;
                return Ok(Some(recheck.data));
            }
        }
        self.spawn_rebuild(key, id.to_string(), src, ttl, rlock);
        Ok(Some(wrapper.data))
    } // end of fn get_with_logical_expiry

    /// waits until in-flight rebuild tasks complete, further rebuilds are
    /// skipped, call once on process teardown
    pub async fn shutdown(&self) {
        if let Ok(permits) = self
            .rebuild_pool
            .acquire_many(self.rebuild_pool_sz as u32)
            .await
        {
            permits.forget();
        }
        self.rebuild_pool.close();
    }

    fn spawn_rebuild(
        &self,
        key: String,
        src_id: String,
        src: Arc<Box<dyn AbstractCacheSource>>,
        ttl: Duration,
        rlock: AppDStoreResourceLock,
    ) {
        let pool = self.rebuild_pool.clone();
        let dstore = self.dstore.clone();
        let logctx = self.logctx.clone();
        tokio::task::spawn(async move {
            match pool.acquire().await {
                Ok(_permit) => {
                    let result = match src.load(src_id.as_str()).await {
                        Ok(Some(v)) => Self::write_logical(&dstore, key.as_str(), v, ttl).await,
                        Ok(None) => {
                            // the source lost the record, leave the stale
                            // entry in place rather than caching emptiness
                            // with a future expiry
                            app_log_event!(
                                logctx,
                                AppLogLevel::WARNING,
                                "rebuild-source-miss, key:{}",
                                key
                            );
                            Ok(())
                        }
                        Err(e) => Err(e),
                    };
                    if let Err(e) = result {
                        app_log_event!(logctx, AppLogLevel::ERROR, "rebuild, key:{}, {}", key, e);
                    }
                }
                Err(_closed) => {
                    app_log_event!(
                        logctx,
                        AppLogLevel::WARNING,
                        "rebuild-skipped-on-teardown, key:{}",
                        key
                    );
                }
            }
            if let Err(e) = rlock.unlock().await {
                app_log_event!(logctx, AppLogLevel::ERROR, "rebuild-unlock, key:{}, {}", key, e);
            }
        });
    } // end of fn spawn_rebuild

    async fn fetch_row(&self, key: &str) -> DefaultResult<CachedHit, AppError> {
        let info = HashMap::from([(ds_label::TABLE_CACHE.to_string(), vec![key.to_string()])]);
        let tableset = self.dstore.fetch(info).await?;
        let row = tableset
            .get(ds_label::TABLE_CACHE)
            .and_then(|t| t.get(key));
        let row = match row {
            Some(r) => r,
            None => return Ok(CachedHit::Miss),
        };
        let expiry_raw = row
            .get(usize::from(_cachem::InMemColIdx::StoreExpiry))
            .map(String::as_str)
            .unwrap_or("");
        if !expiry_raw.is_empty() {
            let expired = match DateTime::parse_from_rfc3339(expiry_raw) {
                Ok(exp) => exp < Utc::now(),
                Err(_e) => true, // corrupted column, drop the record
            };
            if expired {
                let info =
                    HashMap::from([(ds_label::TABLE_CACHE.to_string(), vec![key.to_string()])]);
                let _num = self.dstore.delete(info).await?;
                return Ok(CachedHit::Miss);
            }
        }
        let payload = row
            .get(usize::from(_cachem::InMemColIdx::Payload))
            .cloned()
            .unwrap_or_default();
        if payload.is_empty() {
            Ok(CachedHit::Negative)
        } else {
            Ok(CachedHit::Value(payload))
        }
    } // end of fn fetch_row

    async fn write_row(
        dstore: &Arc<Box<dyn AbstInMemoryDStore>>,
        key: &str,
        payload: String,
        store_expiry: String,
    ) -> DefaultResult<(), AppError> {
        let mut row = (0.._cachem::InMemColIdx::TotNumColumns.into())
            .map(|_n| String::new())
            .collect::<Vec<String>>();
        row[usize::from(_cachem::InMemColIdx::Payload)] = payload;
        row[usize::from(_cachem::InMemColIdx::StoreExpiry)] = store_expiry;
        let table = HashMap::from([(key.to_string(), row)]);
        let data = HashMap::from([(ds_label::TABLE_CACHE.to_string(), table)]);
        let _num = dstore.save(data).await?;
        Ok(())
    }

    async fn write_logical(
        dstore: &Arc<Box<dyn AbstInMemoryDStore>>,
        key: &str,
        payload: String,
        ttl: Duration,
    ) -> DefaultResult<(), AppError> {
        let expiry = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        let wrapper = LogicalExpiryWrapper {
            data: payload,
            expire_time: expiry.to_rfc3339(),
        };
        let serial = serde_json::to_string(&wrapper).unwrap();
        Self::write_row(dstore, key, serial, String::new()).await
    }

    fn parse_wrapper(raw: &str) -> DefaultResult<LogicalExpiryWrapper, AppError> {
        serde_json::from_str::<LogicalExpiryWrapper>(raw).map_err(|e| AppError {
            code: AppErrorCode::InvalidJsonFormat,
            detail: Some(format!("logical-expiry-wrapper, {}", e)),
        })
    }

    fn wrapper_expired(
        wrapper: &LogicalExpiryWrapper,
        t_now: &DateTime<Utc>,
    ) -> DefaultResult<bool, AppError> {
        let exp = DateTime::parse_from_rfc3339(wrapper.expire_time.as_str()).map_err(|e| {
            AppError {
                code: AppErrorCode::DataCorruption,
                detail: Some(format!("logical-expiry-time, {}", e)),
            }
        })?;
        Ok(&exp < t_now)
    }
} // end of impl AppCacheClient
