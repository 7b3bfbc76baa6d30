mod in_mem;

use std::collections::HashMap;
use std::result::Result as DefaultResult;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::AppEventStreamCfg;
use crate::error::AppError;

pub use in_mem::AppInMemEventStream;

/// one entry of the append-only order log, immutable once written, the
/// field map is the flat wire shape shared with consumers
#[derive(Debug, Clone)]
pub struct AppStreamRecord {
    pub entry_id: u64,
    pub fields: HashMap<String, String>,
}

/// durable ordered log with consumer-group semantics, delivery state of
/// every entry per group moves  unread -> delivered (unacked) -> acknowledged,
/// entries are never deleted by normal processing
#[async_trait]
pub trait AbstractEventStream: Send + Sync {
    async fn ensure_group(&self, stream: &str, group: &str) -> DefaultResult<(), AppError>;

    async fn append(
        &self,
        stream: &str,
        fields: HashMap<String, String>,
    ) -> DefaultResult<u64, AppError>;

    /// deliver the next unread entry to the given consumer, blocking
    /// cooperatively up to `block` when the log tail has been reached,
    /// `None` means the timeout elapsed without new entries
    async fn read_next(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
    ) -> DefaultResult<Option<AppStreamRecord>, AppError>;

    /// re-deliver the oldest entry which was delivered to this consumer
    /// but never acknowledged, `None` means the pending list is empty
    async fn read_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
    ) -> DefaultResult<Option<AppStreamRecord>, AppError>;

    /// returns false when the entry was not in the pending list, callers
    /// treat that as already-acknowledged
    async fn acknowledge(
        &self,
        stream: &str,
        group: &str,
        entry_id: u64,
    ) -> DefaultResult<bool, AppError>;

    async fn num_pending(&self, stream: &str, group: &str) -> DefaultResult<usize, AppError>;
} // end of trait AbstractEventStream

pub(crate) fn build_context(cfg: &AppEventStreamCfg) -> Box<dyn AbstractEventStream> {
    // TODO, more backend options e.g. an external log broker, so far all
    // deployments run the store-native in-memory stream
    Box::new(AppInMemEventStream::new(cfg.max_pending))
}
