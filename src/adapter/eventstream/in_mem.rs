use std::collections::{BTreeMap, HashMap};
use std::result::Result as DefaultResult;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::{timeout_at, Instant};

use super::{AbstractEventStream, AppStreamRecord};
use crate::error::{AppError, AppErrorCode};

struct GroupState {
    // index into the entry log of the next unread entry for this group
    cursor: usize,
    // entry-id to consumer name, ordered so the oldest delivered entry
    // is always recovered first
    pending: BTreeMap<u64, String>,
}

struct StreamState {
    last_entry_id: u64,
    entries: Vec<AppStreamRecord>,
    groups: HashMap<String, GroupState>,
}

impl StreamState {
    fn new() -> Self {
        Self {
            last_entry_id: 0,
            entries: Vec::new(),
            groups: HashMap::new(),
        }
    }
}

pub struct AppInMemEventStream {
    max_pending_per_group: u32,
    streams: Mutex<HashMap<String, StreamState>>,
    appended: Notify,
}

impl AppInMemEventStream {
    pub fn new(max_pending_per_group: u32) -> Self {
        Self {
            max_pending_per_group,
            streams: Mutex::new(HashMap::new()),
            appended: Notify::new(),
        }
    }

    fn map_err_group(stream: &str, group: &str) -> AppError {
        AppError {
            code: AppErrorCode::StreamGroupNotExist,
            detail: Some(format!("stream:{}, group:{}", stream, group)),
        }
    }

    /// deliver the entry at the group cursor if one exists, `Ok(None)`
    /// means the group has read up to the log tail
    fn try_deliver(
        &self,
        guard: &mut HashMap<String, StreamState>,
        stream: &str,
        group: &str,
        consumer: &str,
    ) -> DefaultResult<Option<AppStreamRecord>, AppError> {
        let st = guard
            .get_mut(stream)
            .ok_or_else(|| Self::map_err_group(stream, group))?;
        let grp = st
            .groups
            .get_mut(group)
            .ok_or_else(|| Self::map_err_group(stream, group))?;
        if grp.pending.len() >= self.max_pending_per_group as usize {
            let msg = format!("pending-limit:{}, group:{}", self.max_pending_per_group, group);
            return Err(AppError {
                code: AppErrorCode::ExceedingMaxLimit,
                detail: Some(msg),
            });
        }
        if grp.cursor < st.entries.len() {
            let record = st.entries[grp.cursor].clone();
            grp.cursor += 1;
            grp.pending.insert(record.entry_id, consumer.to_string());
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }
} // end of impl AppInMemEventStream

#[async_trait]
impl AbstractEventStream for AppInMemEventStream {
    async fn ensure_group(&self, stream: &str, group: &str) -> DefaultResult<(), AppError> {
        let mut guard = self.streams.lock().await;
        let st = guard
            .entry(stream.to_string())
            .or_insert_with(StreamState::new);
        st.groups.entry(group.to_string()).or_insert(GroupState {
            cursor: 0,
            pending: BTreeMap::new(),
        });
        Ok(())
    }

    async fn append(
        &self,
        stream: &str,
        fields: HashMap<String, String>,
    ) -> DefaultResult<u64, AppError> {
        if fields.is_empty() {
            return Err(AppError {
                code: AppErrorCode::EmptyInputData,
                detail: Some("stream-append".to_string()),
            });
        }
        let mut guard = self.streams.lock().await;
        let st = guard
            .entry(stream.to_string())
            .or_insert_with(StreamState::new);
        st.last_entry_id += 1;
        let entry_id = st.last_entry_id;
        st.entries.push(AppStreamRecord { entry_id, fields });
        drop(guard);
        self.appended.notify_waiters();
        Ok(entry_id)
    } // end of fn append

    async fn read_next(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
    ) -> DefaultResult<Option<AppStreamRecord>, AppError> {
        let deadline = Instant::now() + block;
        loop {
            {
                let mut guard = self.streams.lock().await;
                if let Some(rec) = self.try_deliver(&mut guard, stream, group, consumer)? {
                    return Ok(Some(rec));
                }
            } // release before suspending, appenders need the same mutex
            let wakeup = self.appended.notified();
            if timeout_at(deadline, wakeup).await.is_err() {
                let mut guard = self.streams.lock().await;
                return self.try_deliver(&mut guard, stream, group, consumer);
            }
        }
    } // end of fn read_next

    async fn read_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
    ) -> DefaultResult<Option<AppStreamRecord>, AppError> {
        let guard = self.streams.lock().await;
        let st = guard
            .get(stream)
            .ok_or_else(|| Self::map_err_group(stream, group))?;
        let grp = st
            .groups
            .get(group)
            .ok_or_else(|| Self::map_err_group(stream, group))?;
        let found = grp
            .pending
            .iter()
            .find(|(_id, c)| c.as_str() == consumer)
            .map(|(id, _c)| *id);
        let out = found.map(|entry_id| {
            let idx = st
                .entries
                .binary_search_by_key(&entry_id, |e| e.entry_id)
                .unwrap();
            st.entries[idx].clone()
        });
        Ok(out)
    } // end of fn read_pending

    async fn acknowledge(
        &self,
        stream: &str,
        group: &str,
        entry_id: u64,
    ) -> DefaultResult<bool, AppError> {
        let mut guard = self.streams.lock().await;
        let st = guard
            .get_mut(stream)
            .ok_or_else(|| Self::map_err_group(stream, group))?;
        let grp = st
            .groups
            .get_mut(group)
            .ok_or_else(|| Self::map_err_group(stream, group))?;
        Ok(grp.pending.remove(&entry_id).is_some())
    }

    async fn num_pending(&self, stream: &str, group: &str) -> DefaultResult<usize, AppError> {
        let guard = self.streams.lock().await;
        let st = guard
            .get(stream)
            .ok_or_else(|| Self::map_err_group(stream, group))?;
        let grp = st
            .groups
            .get(group)
            .ok_or_else(|| Self::map_err_group(stream, group))?;
        Ok(grp.pending.len())
    }
} // end of impl AppInMemEventStream
