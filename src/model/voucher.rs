use std::result::Result as DefaultResult;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppErrorCode};

/// flash-sale voucher, immutable once published except the remaining
/// stock, which only moves through conditional decrements
#[derive(Debug)]
pub struct SeckillVoucherModel {
    pub voucher_id: u64,
    pub begin_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    pub stock: u32,
}

// serialized shape of the voucher in cache payloads, kept separate from
// the domain model so the wire layout can evolve independently
#[derive(Serialize, Deserialize)]
struct VoucherCacheReplica {
    voucher_id: u64,
    begin_time: String,
    end_time: String,
    stock: u32,
}

impl Clone for SeckillVoucherModel {
    fn clone(&self) -> Self {
        Self {
            voucher_id: self.voucher_id,
            begin_time: self.begin_time,
            end_time: self.end_time,
            stock: self.stock,
        }
    }
}
impl PartialEq for SeckillVoucherModel {
    fn eq(&self, other: &Self) -> bool {
        self.voucher_id == other.voucher_id
            && self.begin_time == other.begin_time
            && self.end_time == other.end_time
            && self.stock == other.stock
    }
}

impl SeckillVoucherModel {
    /// the time-window check runs in callers before the admission step,
    /// it never belongs to the hot atomic path
    pub fn is_active(&self, t_now: &DateTime<FixedOffset>) -> bool {
        &self.begin_time <= t_now && t_now < &self.end_time
    }

    pub fn to_cache_payload(&self) -> String {
        let replica = VoucherCacheReplica {
            voucher_id: self.voucher_id,
            begin_time: self.begin_time.to_rfc3339(),
            end_time: self.end_time.to_rfc3339(),
            stock: self.stock,
        };
        serde_json::to_string(&replica).unwrap()
    }

    pub fn try_from_cache_payload(raw: &str) -> DefaultResult<Self, AppError> {
        let replica = serde_json::from_str::<VoucherCacheReplica>(raw).map_err(|e| AppError {
            code: AppErrorCode::InvalidJsonFormat,
            detail: Some(format!("voucher-cache-payload, {}", e)),
        })?;
        let map_time_err = |e: chrono::ParseError| AppError {
            code: AppErrorCode::DataCorruption,
            detail: Some(format!("voucher-cache-payload, {}", e)),
        };
        Ok(Self {
            voucher_id: replica.voucher_id,
            begin_time: DateTime::parse_from_rfc3339(replica.begin_time.as_str())
                .map_err(map_time_err)?,
            end_time: DateTime::parse_from_rfc3339(replica.end_time.as_str())
                .map_err(map_time_err)?,
            stock: replica.stock,
        })
    } // end of fn try_from_cache_payload

    pub fn to_storage_row(&self) -> Vec<String> {
        vec![
            self.stock.to_string(),
            self.begin_time.to_rfc3339(),
            self.end_time.to_rfc3339(),
        ]
    }

    pub fn try_from_storage_row(
        voucher_id: u64,
        row: &[String],
    ) -> DefaultResult<Self, AppError> {
        let map_err = |msg: String| AppError {
            code: AppErrorCode::DataCorruption,
            detail: Some(format!("voucher-row, id:{}, {}", voucher_id, msg)),
        };
        let stock = row
            .first()
            .ok_or_else(|| map_err("missing-stock".to_string()))?
            .parse::<u32>()
            .map_err(|e| map_err(e.to_string()))?;
        let begin_time = row
            .get(1)
            .ok_or_else(|| map_err("missing-begin".to_string()))
            .and_then(|s| {
                DateTime::parse_from_rfc3339(s).map_err(|e| map_err(e.to_string()))
            })?;
        let end_time = row
            .get(2)
            .ok_or_else(|| map_err("missing-end".to_string()))
            .and_then(|s| {
                DateTime::parse_from_rfc3339(s).map_err(|e| map_err(e.to_string()))
            })?;
        Ok(Self {
            voucher_id,
            begin_time,
            end_time,
            stock,
        })
    } // end of fn try_from_storage_row
} // end of impl SeckillVoucherModel
