use std::collections::HashMap;
use std::result::Result as DefaultResult;

use chrono::{DateTime, FixedOffset};

use crate::error::{AppError, AppErrorCode};

/// outcome of one admission attempt, business rejections are values at
/// this layer, never errors
#[derive(Debug, Clone, PartialEq)]
pub enum SeckillVerdict {
    Admitted,
    OutOfStock,
    DuplicateOrder,
}

impl From<SeckillVerdict> for u8 {
    fn from(value: SeckillVerdict) -> u8 {
        match value {
            SeckillVerdict::Admitted => 0,
            SeckillVerdict::OutOfStock => 1,
            SeckillVerdict::DuplicateOrder => 2,
        }
    }
}
impl TryFrom<u8> for SeckillVerdict {
    type Error = AppError;
    fn try_from(value: u8) -> DefaultResult<Self, Self::Error> {
        match value {
            0 => Ok(Self::Admitted),
            1 => Ok(Self::OutOfStock),
            2 => Ok(Self::DuplicateOrder),
            _others => Err(AppError {
                code: AppErrorCode::DataCorruption,
                detail: Some(format!("seckill-verdict:{}", value)),
            }),
        }
    }
}

mod wire {
    pub(super) const ORDER_ID: &str = "id";
    pub(super) const USR_ID: &str = "usr_id";
    pub(super) const VOUCHER_ID: &str = "voucher_id";
    pub(super) const CREATE_TIME: &str = "create_time";
}

/// one admitted flash-sale order, created exactly once per (user,
/// voucher) pair, the pair uniqueness is enforced first at admission and
/// re-verified by the durable creation step
#[derive(Debug)]
pub struct VoucherOrderModel {
    pub order_id: u64,
    pub usr_id: u64,
    pub voucher_id: u64,
    pub create_time: DateTime<FixedOffset>,
}

impl Clone for VoucherOrderModel {
    fn clone(&self) -> Self {
        Self {
            order_id: self.order_id,
            usr_id: self.usr_id,
            voucher_id: self.voucher_id,
            create_time: self.create_time,
        }
    }
}
impl PartialEq for VoucherOrderModel {
    fn eq(&self, other: &Self) -> bool {
        self.order_id == other.order_id
            && self.usr_id == other.usr_id
            && self.voucher_id == other.voucher_id
            && self.create_time == other.create_time
    }
}

impl VoucherOrderModel {
    pub fn to_stream_fields(&self) -> HashMap<String, String> {
        HashMap::from([
            (wire::ORDER_ID.to_string(), self.order_id.to_string()),
            (wire::USR_ID.to_string(), self.usr_id.to_string()),
            (wire::VOUCHER_ID.to_string(), self.voucher_id.to_string()),
            (
                wire::CREATE_TIME.to_string(),
                self.create_time.to_rfc3339(),
            ),
        ])
    }

    /// queue consumers deserialize defensively, unknown fields are
    /// ignored, a missing or corrupted field is an error the worker logs
    /// and acknowledges away, never a panic
    pub fn try_from_stream_fields(
        fields: &HashMap<String, String>,
    ) -> DefaultResult<Self, AppError> {
        let map_err = |label: &str, msg: String| AppError {
            code: AppErrorCode::DataCorruption,
            detail: Some(format!("order-wire-field:{}, {}", label, msg)),
        };
        let read_u64 = |label: &str| {
            fields
                .get(label)
                .ok_or_else(|| map_err(label, "missing".to_string()))?
                .parse::<u64>()
                .map_err(|e| map_err(label, e.to_string()))
        };
        let order_id = read_u64(wire::ORDER_ID)?;
        let usr_id = read_u64(wire::USR_ID)?;
        let voucher_id = read_u64(wire::VOUCHER_ID)?;
        let create_time = fields
            .get(wire::CREATE_TIME)
            .ok_or_else(|| map_err(wire::CREATE_TIME, "missing".to_string()))
            .and_then(|s| {
                DateTime::parse_from_rfc3339(s)
                    .map_err(|e| map_err(wire::CREATE_TIME, e.to_string()))
            })?;
        Ok(Self {
            order_id,
            usr_id,
            voucher_id,
            create_time,
        })
    } // end of fn try_from_stream_fields

    pub fn to_storage_row(&self) -> Vec<String> {
        vec![
            self.usr_id.to_string(),
            self.voucher_id.to_string(),
            self.create_time.to_rfc3339(),
        ]
    }

    pub fn try_from_storage_row(order_id: u64, row: &[String]) -> DefaultResult<Self, AppError> {
        let map_err = |msg: String| AppError {
            code: AppErrorCode::DataCorruption,
            detail: Some(format!("order-row, id:{}, {}", order_id, msg)),
        };
        let usr_id = row
            .first()
            .ok_or_else(|| map_err("missing-usr".to_string()))?
            .parse::<u64>()
            .map_err(|e| map_err(e.to_string()))?;
        let voucher_id = row
            .get(1)
            .ok_or_else(|| map_err("missing-voucher".to_string()))?
            .parse::<u64>()
            .map_err(|e| map_err(e.to_string()))?;
        let create_time = row
            .get(2)
            .ok_or_else(|| map_err("missing-ctime".to_string()))
            .and_then(|s| {
                DateTime::parse_from_rfc3339(s).map_err(|e| map_err(e.to_string()))
            })?;
        Ok(Self {
            order_id,
            usr_id,
            voucher_id,
            create_time,
        })
    } // end of fn try_from_storage_row
} // end of impl VoucherOrderModel
