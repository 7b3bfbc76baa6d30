use std::boxed::Box;
use std::result::Result as DefaultResult;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local as LocalTime;

use crate::cache::{AbstractCacheSource, AppCacheClient};
use crate::constant::{cache_key, SEQ_PREFIX_ORDER};
use crate::error::AppError;
use crate::logging::{app_log_event, AppLogContext, AppLogLevel};
use crate::model::{SeckillVerdict, SeckillVoucherModel, VoucherOrderModel};
use crate::repository::{AbsVoucherOrderRepo, AbsVoucherStockRepo};
use crate::sequence::AppSequenceGenerator;

#[derive(Debug, Clone, PartialEq)]
pub enum SeckillRejectReason {
    VoucherNotFound,
    NotStarted,
    Ended,
    OutOfStock,
    DuplicateOrder,
}

pub enum SeckillAdmissionUsKsErr {
    Reject(SeckillRejectReason),
    Server(AppError),
}

/// voucher lookups of the admission path go through the read-through
/// cache, the durable repository is only reached on cache misses
pub struct VoucherCacheSource {
    repo: Box<dyn AbsVoucherOrderRepo>,
}

impl VoucherCacheSource {
    pub fn new(repo: Box<dyn AbsVoucherOrderRepo>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl AbstractCacheSource for VoucherCacheSource {
    async fn load(&self, id: &str) -> DefaultResult<Option<String>, AppError> {
        let voucher_id = match id.parse::<u64>() {
            Ok(v) => v,
            Err(_e) => return Ok(None), // junk key, cache it as a miss
        };
        match self.repo.fetch_voucher(voucher_id).await {
            Ok(v) => Ok(Some(v.to_cache_payload())),
            Err(e) if e.code == crate::error::AppErrorCode::VoucherNotExist => Ok(None),
            Err(e) => Err(e),
        }
    }
} // end of impl VoucherCacheSource

pub struct SeckillAdmissionUseCase {
    pub repo_stock: Box<dyn AbsVoucherStockRepo>,
    pub seq_gen: Arc<AppSequenceGenerator>,
    pub cache_client: Arc<AppCacheClient>,
    pub voucher_src: Arc<Box<dyn AbstractCacheSource>>,
    pub voucher_cache_ttl: Duration,
    pub logctx: Arc<AppLogContext>,
}

impl SeckillAdmissionUseCase {
    /// returns the pre-generated order id on success, the caller gets it
    /// immediately while the durable write completes asynchronously
    pub async fn execute(
        self,
        voucher_id: u64,
        usr_id: u64,
    ) -> DefaultResult<u64, SeckillAdmissionUsKsErr> {
        let voucher = self.load_voucher(voucher_id).await?;
        // the time-window check runs against the cached voucher record,
        // it stays out of the atomic admission step on purpose
        let timenow = LocalTime::now().fixed_offset();
        if timenow < voucher.begin_time {
            return Err(SeckillAdmissionUsKsErr::Reject(
                SeckillRejectReason::NotStarted,
            ));
        }
        if voucher.end_time <= timenow {
            return Err(SeckillAdmissionUsKsErr::Reject(SeckillRejectReason::Ended));
        }
        let order_id = self
            .seq_gen
            .next_id(SEQ_PREFIX_ORDER)
            .await
            .map_err(SeckillAdmissionUsKsErr::Server)?;
        let order = VoucherOrderModel {
            order_id,
            usr_id,
            voucher_id,
            create_time: timenow,
        };
        let verdict = self
            .repo_stock
            .try_admit(&order)
            .await
            .map_err(SeckillAdmissionUsKsErr::Server)?;
        match verdict {
            SeckillVerdict::Admitted => Ok(order_id),
            SeckillVerdict::OutOfStock => Err(SeckillAdmissionUsKsErr::Reject(
                SeckillRejectReason::OutOfStock,
            )),
            SeckillVerdict::DuplicateOrder => Err(SeckillAdmissionUsKsErr::Reject(
                SeckillRejectReason::DuplicateOrder,
            )),
        }
    } // end of fn execute

    async fn load_voucher(
        &self,
        voucher_id: u64,
    ) -> DefaultResult<SeckillVoucherModel, SeckillAdmissionUsKsErr> {
        let result = self
            .cache_client
            .get_with_passthrough(
                cache_key::VOUCHER_PREFIX,
                voucher_id.to_string().as_str(),
                self.voucher_src.clone(),
                self.voucher_cache_ttl,
            )
            .await;
        let payload = match result {
            Ok(Some(p)) => p,
            Ok(None) => {
                return Err(SeckillAdmissionUsKsErr::Reject(
                    SeckillRejectReason::VoucherNotFound,
                ))
            }
            Err(e) => {
                let logctx_p = &self.logctx;
                app_log_event!(
                    logctx_p,
                    AppLogLevel::ERROR,
                    "voucher:{}, cache-lookup: {}",
                    voucher_id,
                    e
                );
                return Err(SeckillAdmissionUsKsErr::Server(e));
            }
        };
        SeckillVoucherModel::try_from_cache_payload(payload.as_str())
            .map_err(SeckillAdmissionUsKsErr::Server)
    } // end of fn load_voucher
} // end of impl SeckillAdmissionUseCase
