use std::boxed::Box;
use std::result::Result as DefaultResult;
use std::sync::Arc;

use async_trait::async_trait;

use crate::eventstream::AbstractEventStream;
use crate::error::{AppError, AppErrorCode};
use crate::model::{SeckillVerdict, SeckillVoucherModel, VoucherOrderModel};
use crate::AppDataStoreContext;

mod in_mem;
pub use in_mem::voucher_order::VoucherOrderInMemRepo;
pub use in_mem::voucher_stock::VoucherStockInMemRepo;

#[cfg(feature = "mariadb")]
mod mariadb;

#[cfg(feature = "mariadb")]
use mariadb::voucher_order::VoucherOrderMariaDbRepo;

/// outcome of the durable creation step, `AlreadyPlaced` and
/// `OutOfStock` are defensive no-op successes at the worker level, the
/// admission gate already filtered these cases on the happy path
#[derive(Debug, Clone, PartialEq)]
pub enum OrderCreateOutcome {
    Created,
    AlreadyPlaced,
    OutOfStock,
}

// the repository instance may be used across an await, the future created
// by app callers has to be able to pass to different threads, it is the
// reason to add `Send` and `Sync` as super-traits

/// admission-side voucher state in the atomic store, the binding
/// no-oversell / no-duplicate checks run here
#[async_trait]
pub trait AbsVoucherStockRepo: Sync + Send {
    async fn fetch(&self, voucher_id: u64) -> DefaultResult<SeckillVoucherModel, AppError>;

    /// seed (or re-seed) the admission state of one voucher, resets the
    /// purchased-user set
    async fn save(&self, voucher: &SeckillVoucherModel) -> DefaultResult<(), AppError>;

    /// the single atomic admission step, duplicate check first, then
    /// conditional stock decrement, membership insert and queue append,
    /// indivisible from the view of concurrent callers, the enqueued
    /// entry always corresponds to a committed admission
    async fn try_admit(&self, order: &VoucherOrderModel)
        -> DefaultResult<SeckillVerdict, AppError>;
}

/// system-of-record for vouchers and their orders
#[async_trait]
pub trait AbsVoucherOrderRepo: Sync + Send {
    async fn fetch_voucher(&self, voucher_id: u64)
        -> DefaultResult<SeckillVoucherModel, AppError>;

    async fn save_voucher(&self, voucher: &SeckillVoucherModel) -> DefaultResult<(), AppError>;

    /// durable order creation, re-checks (user, voucher) uniqueness and
    /// decrements stock only while it is positive, one transaction
    async fn create(&self, order: &VoucherOrderModel)
        -> DefaultResult<OrderCreateOutcome, AppError>;

    async fn fetch_by_user(
        &self,
        usr_id: u64,
        voucher_id: u64,
    ) -> DefaultResult<Option<VoucherOrderModel>, AppError>;

    async fn num_orders_of_voucher(&self, voucher_id: u64) -> DefaultResult<usize, AppError>;
}

pub async fn app_repo_voucher_stock(
    ds: Arc<AppDataStoreContext>,
    estream: Arc<Box<dyn AbstractEventStream>>,
    stream_label: String,
) -> DefaultResult<Box<dyn AbsVoucherStockRepo>, AppError> {
    // admission always runs against the store with single-step atomic
    // operations, there is no relational variant of this repository
    if let Some(m) = ds.in_mem.as_ref() {
        let obj = VoucherStockInMemRepo::build(m.clone(), estream, stream_label).await?;
        Ok(Box::new(obj))
    } else {
        Err(AppError {
            code: AppErrorCode::MissingDataStore,
            detail: Some("in-mem".to_string()),
        })
    }
}

pub async fn app_repo_voucher_order(
    ds: Arc<AppDataStoreContext>,
) -> DefaultResult<Box<dyn AbsVoucherOrderRepo>, AppError> {
    #[cfg(feature = "mariadb")]
    if let Some(dbs) = ds.sql_dbs.as_ref() {
        let obj = VoucherOrderMariaDbRepo::try_build(dbs.clone())?;
        Ok(Box::new(obj))
    } else {
        Err(AppError {
            code: AppErrorCode::FeatureDisabled,
            detail: Some("mariadb".to_string()),
        })
    }
    #[cfg(not(feature = "mariadb"))]
    if let Some(m) = ds.in_mem.as_ref() {
        let obj = VoucherOrderInMemRepo::build(m.clone()).await?;
        Ok(Box::new(obj))
    } else {
        Err(AppError {
            code: AppErrorCode::MissingDataStore,
            detail: Some("unknown-type".to_string()),
        })
    }
}
