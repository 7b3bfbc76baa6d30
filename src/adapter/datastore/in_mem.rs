use std::collections::HashMap;
use std::result::Result as DefaultResult;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::AppInMemoryDbCfg;
use crate::error::{AppError, AppErrorCode};

// simple implementation of in-memory key-value storage with row-lock
// semantics, it is the store which all single-step atomic operations of
// this application (admission, lock records, sequence counters, cache
// entries) are built on top of.

// application callers are responsible to maintain the structure of each
// row in each table. Each element of a row is stringified regardless of
// its original type (integer, timestamp)
type InnerRow = Vec<String>;
type InnerTable = HashMap<String, InnerRow>;
type AllTable = HashMap<String, InnerTable>;

pub type AppInMemFetchedSingleRow = InnerRow;
pub type AppInMemFetchedSingleTable = InnerTable;
pub type AppInMemUpdateData = AllTable;
pub type AppInMemDeleteInfo = HashMap<String, Vec<String>>; // list of IDs per table
pub type AppInMemFetchKeys = HashMap<String, Vec<String>>; // list of IDs per table
pub type AppInMemFetchedData = AllTable;

/// exclusive access to the whole table set, callers holding this may read
/// then modify multiple tables as one indivisible unit, concurrent callers
/// of any other method of the same store are blocked until release
pub struct AppInMemDstoreLock {
    guard: OwnedMutexGuard<AllTable>,
}

pub trait AbsDStoreFilterKeyOp: Send + Sync {
    fn filter(&self, k: &String, v: &Vec<String>) -> bool;
}

#[async_trait]
pub trait AbstInMemoryDStore: Send + Sync {
    async fn create_table(&self, label: &str) -> DefaultResult<(), AppError>;

    async fn save(&self, data: AppInMemUpdateData) -> DefaultResult<usize, AppError>;

    async fn delete(&self, info: AppInMemDeleteInfo) -> DefaultResult<usize, AppError>;

    async fn fetch(&self, keys: AppInMemFetchKeys) -> DefaultResult<AppInMemFetchedData, AppError>;

    /// fetch the given rows and keep the store exclusively locked, the
    /// returned guard must be passed back to either `save_release` or
    /// `delete_release`, or simply dropped to discard the changes
    async fn fetch_acquire(
        &self,
        keys: AppInMemFetchKeys,
    ) -> DefaultResult<(AppInMemFetchedData, AppInMemDstoreLock), AppError>;

    fn save_release(
        &self,
        data: AppInMemUpdateData,
        lock: AppInMemDstoreLock,
    ) -> DefaultResult<usize, AppError>;

    fn delete_release(
        &self,
        info: AppInMemDeleteInfo,
        lock: AppInMemDstoreLock,
    ) -> DefaultResult<usize, AppError>;

    async fn filter_keys(
        &self,
        table: String,
        op: &dyn AbsDStoreFilterKeyOp,
    ) -> DefaultResult<Vec<String>, AppError>;
} // end of trait AbstInMemoryDStore

pub struct AppInMemoryDStore {
    max_items_per_table: u32,
    table_map: Arc<Mutex<AllTable>>,
}

impl AppInMemoryDStore {
    pub fn new(cfg: &AppInMemoryDbCfg) -> Self {
        let t_map = Arc::new(Mutex::new(HashMap::new()));
        Self {
            table_map: t_map,
            max_items_per_table: cfg.max_items,
        }
    }

    fn _check_capacity(&self, map: &AllTable) -> DefaultResult<(), AppError> {
        let mut invalid = map
            .iter()
            .filter(|(_, table)| self.max_items_per_table as usize <= table.len());
        if let Some((label, _)) = invalid.next() {
            let msg = format!("{}, {}", module_path!(), label);
            Err(AppError {
                detail: Some(msg),
                code: AppErrorCode::ExceedingMaxLimit,
            })
        } else {
            Ok(())
        }
    }

    fn _check_table_existence(map: &AllTable, keys: Vec<&String>) -> DefaultResult<(), AppError> {
        let mut invalid = keys.iter().filter(|label| !map.contains_key(label.as_str()));
        if let Some(d) = invalid.next() {
            Err(AppError {
                detail: Some(d.to_string()),
                code: AppErrorCode::DataTableNotExist,
            })
        } else {
            Ok(())
        }
    }

    fn _apply_update(map: &mut AllTable, data: AppInMemUpdateData) -> usize {
        data.into_iter()
            .map(|(label, d_grp)| {
                let table = map.get_mut(label.as_str()).unwrap();
                d_grp
                    .into_iter()
                    .map(|(id, row)| {
                        table.insert(id, row);
                    })
                    .count()
            })
            .sum()
    }

    fn _apply_delete(map: &mut AllTable, info: AppInMemDeleteInfo) -> usize {
        info.into_iter()
            .map(|(label, ids)| {
                let table = map.get_mut(label.as_str()).unwrap();
                ids.iter().filter(|id| table.remove(*id).is_some()).count()
            })
            .sum()
    }

    fn _copy_rows(map: &AllTable, keys: AppInMemFetchKeys) -> AppInMemFetchedData {
        let rs_a = keys
            .into_iter()
            .map(|(label, ids)| {
                let table = map.get(label.as_str()).unwrap();
                let rs_t = ids
                    .iter()
                    .filter_map(|id| table.get(id).map(|row| (id.clone(), row.clone())))
                    .collect::<Vec<(String, InnerRow)>>();
                (label, HashMap::from_iter(rs_t))
            })
            .collect::<Vec<(String, InnerTable)>>();
        HashMap::from_iter(rs_a)
    }
} // end of impl AppInMemoryDStore

#[async_trait]
impl AbstInMemoryDStore for AppInMemoryDStore {
    async fn create_table(&self, label: &str) -> DefaultResult<(), AppError> {
        let mut map = self.table_map.lock().await;
        if !map.contains_key(label) {
            map.insert(label.to_string(), HashMap::new());
        }
        Ok(())
    }

    async fn save(&self, data: AppInMemUpdateData) -> DefaultResult<usize, AppError> {
        let mut map = self.table_map.lock().await;
        let unchecked_labels = data.keys().collect::<Vec<&String>>();
        Self::_check_table_existence(&map, unchecked_labels)?;
        self._check_capacity(&map)?;
        let tot_cnt = Self::_apply_update(&mut map, data);
        self._check_capacity(&map)?;
        Ok(tot_cnt)
    }

    async fn delete(&self, info: AppInMemDeleteInfo) -> DefaultResult<usize, AppError> {
        let mut map = self.table_map.lock().await;
        let unchecked_labels = info.keys().collect::<Vec<&String>>();
        Self::_check_table_existence(&map, unchecked_labels)?;
        let tot_cnt = Self::_apply_delete(&mut map, info);
        Ok(tot_cnt)
    }

    async fn fetch(&self, keys: AppInMemFetchKeys) -> DefaultResult<AppInMemFetchedData, AppError> {
        let map = self.table_map.lock().await;
        let unchecked_labels = keys.keys().collect::<Vec<&String>>();
        Self::_check_table_existence(&map, unchecked_labels)?;
        Ok(Self::_copy_rows(&map, keys))
    }

    async fn fetch_acquire(
        &self,
        keys: AppInMemFetchKeys,
    ) -> DefaultResult<(AppInMemFetchedData, AppInMemDstoreLock), AppError> {
        let guard = self.table_map.clone().lock_owned().await;
        let unchecked_labels = keys.keys().collect::<Vec<&String>>();
        Self::_check_table_existence(&guard, unchecked_labels)?;
        let rows = Self::_copy_rows(&guard, keys);
        Ok((rows, AppInMemDstoreLock { guard }))
    }

    fn save_release(
        &self,
        data: AppInMemUpdateData,
        mut lock: AppInMemDstoreLock,
    ) -> DefaultResult<usize, AppError> {
        let unchecked_labels = data.keys().collect::<Vec<&String>>();
        Self::_check_table_existence(&lock.guard, unchecked_labels)?;
        self._check_capacity(&lock.guard)?;
        let tot_cnt = Self::_apply_update(&mut lock.guard, data);
        self._check_capacity(&lock.guard)?;
        Ok(tot_cnt)
    } // guard dropped at end of scope, store unlocked

    fn delete_release(
        &self,
        info: AppInMemDeleteInfo,
        mut lock: AppInMemDstoreLock,
    ) -> DefaultResult<usize, AppError> {
        let unchecked_labels = info.keys().collect::<Vec<&String>>();
        Self::_check_table_existence(&lock.guard, unchecked_labels)?;
        let tot_cnt = Self::_apply_delete(&mut lock.guard, info);
        Ok(tot_cnt)
    }

    async fn filter_keys(
        &self,
        table: String,
        op: &dyn AbsDStoreFilterKeyOp,
    ) -> DefaultResult<Vec<String>, AppError> {
        let map = self.table_map.lock().await;
        Self::_check_table_existence(&map, vec![&table])?;
        let t = map.get(table.as_str()).unwrap();
        let out = t
            .iter()
            .filter(|(k, v)| op.filter(k, v))
            .map(|(k, _v)| k.clone())
            .collect::<Vec<String>>();
        Ok(out)
    }
} // end of impl AppInMemoryDStore
