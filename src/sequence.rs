use std::boxed::Box;
use std::collections::HashMap;
use std::result::Result as DefaultResult;
use std::sync::Arc;

use chrono::Utc;

use crate::constant::{datastore as ds_label, SEQUENCER_EPOCH_SECS};
use crate::datastore::AbstInMemoryDStore;
use crate::error::{AppError, AppErrorCode};

const SERIAL_NUM_BITS: u8 = 32;
const COUNTER_KEY_DATE_FORMAT: &str = "%Y%m%d";

/// globally unique 64-bit identifiers, high word is the number of seconds
/// since the application epoch, low word is an atomic serial restarting at
/// 1 for each (prefix, calendar day) pair, ids generated within the same
/// second for one prefix are therefore strictly increasing
pub struct AppSequenceGenerator {
    dstore: Arc<Box<dyn AbstInMemoryDStore>>,
}

impl AppSequenceGenerator {
    pub async fn try_build(
        dstore: Arc<Box<dyn AbstInMemoryDStore>>,
    ) -> DefaultResult<Self, AppError> {
        dstore.create_table(ds_label::TABLE_SEQ_COUNTER).await?;
        Ok(Self { dstore })
    }

    pub async fn next_id(&self, prefix: &str) -> DefaultResult<u64, AppError> {
        let t_now = Utc::now();
        let elapsed_secs = t_now.timestamp() - SEQUENCER_EPOCH_SECS;
        if elapsed_secs < 0 {
            return Err(AppError {
                code: AppErrorCode::DataCorruption,
                detail: Some("system-clock-before-epoch".to_string()),
            });
        }
        let serial = self.incr_daily_counter(prefix, &t_now).await?;
        // the serial wraps at 2^32 within one day by masking, it never
        // spills into the timestamp word
        let out = ((elapsed_secs as u64) << SERIAL_NUM_BITS) | (serial & (u32::MAX as u64));
        Ok(out)
    } // end of fn next_id

    // the day label rolls the counter key over at date boundaries, so the
    // counter itself never needs resetting
    async fn incr_daily_counter(
        &self,
        prefix: &str,
        t_now: &chrono::DateTime<Utc>,
    ) -> DefaultResult<u64, AppError> {
        let key = format!("{}:{}", prefix, t_now.format(COUNTER_KEY_DATE_FORMAT));
        let info = HashMap::from([(ds_label::TABLE_SEQ_COUNTER.to_string(), vec![key.clone()])]);
        let (tableset, d_lock) = self.dstore.fetch_acquire(info).await?;
        let prev = tableset
            .get(ds_label::TABLE_SEQ_COUNTER)
            .and_then(|t| t.get(key.as_str()))
            .and_then(|row| row.first());
        let serial = match prev {
            Some(v) => v.parse::<u64>().map_err(|e| AppError {
                code: AppErrorCode::DataCorruption,
                detail: Some(format!("seq-counter, key:{}, {}", key, e)),
            })? + 1,
            None => 1u64,
        };
        let table = HashMap::from([(key, vec![serial.to_string()])]);
        let data = HashMap::from([(ds_label::TABLE_SEQ_COUNTER.to_string(), table)]);
        let _num = self.dstore.save_release(data, d_lock)?;
        Ok(serial)
    } // end of fn incr_daily_counter
} // end of impl AppSequenceGenerator
