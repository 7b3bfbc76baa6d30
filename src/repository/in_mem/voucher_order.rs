use std::boxed::Box;
use std::collections::HashMap;
use std::result::Result as DefaultResult;
use std::sync::Arc;

use async_trait::async_trait;

use crate::constant::datastore as ds_label;
use crate::datastore::{AbsDStoreFilterKeyOp, AbstInMemoryDStore};
use crate::error::{AppError, AppErrorCode};
use crate::model::{SeckillVoucherModel, VoucherOrderModel};

use super::super::{AbsVoucherOrderRepo, OrderCreateOutcome};

// in-memory system-of-record, for development and unit test only, the
// mariadb repository is the production backend

fn usr_idx_key(voucher_id: u64, usr_id: u64) -> String {
    format!("{}/{}", voucher_id, usr_id)
}

struct VoucherPrefixFiltKeyOp {
    prefix: String,
}
impl AbsDStoreFilterKeyOp for VoucherPrefixFiltKeyOp {
    fn filter(&self, k: &String, _v: &Vec<String>) -> bool {
        k.starts_with(self.prefix.as_str())
    }
}

pub struct VoucherOrderInMemRepo {
    datastore: Arc<Box<dyn AbstInMemoryDStore>>,
}

impl VoucherOrderInMemRepo {
    pub async fn build(m: Arc<Box<dyn AbstInMemoryDStore>>) -> DefaultResult<Self, AppError> {
        m.create_table(ds_label::TABLE_VOUCHER).await?;
        m.create_table(ds_label::TABLE_VOUCHER_ORDER).await?;
        m.create_table(ds_label::TABLE_VOUCHER_ORDER_IDX).await?;
        Ok(Self { datastore: m })
    }
} // end of impl VoucherOrderInMemRepo

#[async_trait]
impl AbsVoucherOrderRepo for VoucherOrderInMemRepo {
    async fn fetch_voucher(
        &self,
        voucher_id: u64,
    ) -> DefaultResult<SeckillVoucherModel, AppError> {
        let key = voucher_id.to_string();
        let info = HashMap::from([(ds_label::TABLE_VOUCHER.to_string(), vec![key.clone()])]);
        let tableset = self.datastore.fetch(info).await?;
        let row = tableset
            .get(ds_label::TABLE_VOUCHER)
            .and_then(|t| t.get(key.as_str()))
            .ok_or(AppError {
                code: AppErrorCode::VoucherNotExist,
                detail: Some(key),
            })?;
        SeckillVoucherModel::try_from_storage_row(voucher_id, row)
    }

    async fn save_voucher(&self, voucher: &SeckillVoucherModel) -> DefaultResult<(), AppError> {
        let table = HashMap::from([(voucher.voucher_id.to_string(), voucher.to_storage_row())]);
        let data = HashMap::from([(ds_label::TABLE_VOUCHER.to_string(), table)]);
        let _num = self.datastore.save(data).await?;
        Ok(())
    }

    async fn create(
        &self,
        order: &VoucherOrderModel,
    ) -> DefaultResult<OrderCreateOutcome, AppError> {
        let v_key = order.voucher_id.to_string();
        let idx_key = usr_idx_key(order.voucher_id, order.usr_id);
        let keys = HashMap::from([
            (ds_label::TABLE_VOUCHER.to_string(), vec![v_key.clone()]),
            (
                ds_label::TABLE_VOUCHER_ORDER_IDX.to_string(),
                vec![idx_key.clone()],
            ),
        ]);
        let (tableset, d_lock) = self.datastore.fetch_acquire(keys).await?;
        let existing = tableset
            .get(ds_label::TABLE_VOUCHER_ORDER_IDX)
            .map(|t| t.contains_key(idx_key.as_str()))
            .unwrap_or(false);
        if existing {
            return Ok(OrderCreateOutcome::AlreadyPlaced);
        }
        let v_row = tableset
            .get(ds_label::TABLE_VOUCHER)
            .and_then(|t| t.get(v_key.as_str()))
            .ok_or(AppError {
                code: AppErrorCode::VoucherNotExist,
                detail: Some(v_key.clone()),
            })?;
        let mut voucher = SeckillVoucherModel::try_from_storage_row(order.voucher_id, v_row)?;
        if voucher.stock == 0 {
            return Ok(OrderCreateOutcome::OutOfStock);
        }
        voucher.stock -= 1;
        let voucher_t = HashMap::from([(v_key, voucher.to_storage_row())]);
        let order_t = HashMap::from([(order.order_id.to_string(), order.to_storage_row())]);
        let idx_t = HashMap::from([(idx_key, vec![order.order_id.to_string()])]);
        let data = HashMap::from([
            (ds_label::TABLE_VOUCHER.to_string(), voucher_t),
            (ds_label::TABLE_VOUCHER_ORDER.to_string(), order_t),
            (ds_label::TABLE_VOUCHER_ORDER_IDX.to_string(), idx_t),
        ]);
        let _num = self.datastore.save_release(data, d_lock)?;
        Ok(OrderCreateOutcome::Created)
    } // end of fn create

    async fn fetch_by_user(
        &self,
        usr_id: u64,
        voucher_id: u64,
    ) -> DefaultResult<Option<VoucherOrderModel>, AppError> {
        let idx_key = usr_idx_key(voucher_id, usr_id);
        let info = HashMap::from([(
            ds_label::TABLE_VOUCHER_ORDER_IDX.to_string(),
            vec![idx_key.clone()],
        )]);
        let tableset = self.datastore.fetch(info).await?;
        let oid = tableset
            .get(ds_label::TABLE_VOUCHER_ORDER_IDX)
            .and_then(|t| t.get(idx_key.as_str()))
            .and_then(|row| row.first())
            .cloned();
        let oid = match oid {
            Some(v) => v,
            None => return Ok(None),
        };
        let info =
            HashMap::from([(ds_label::TABLE_VOUCHER_ORDER.to_string(), vec![oid.clone()])]);
        let tableset = self.datastore.fetch(info).await?;
        let row = tableset
            .get(ds_label::TABLE_VOUCHER_ORDER)
            .and_then(|t| t.get(oid.as_str()))
            .ok_or(AppError {
                code: AppErrorCode::DataCorruption,
                detail: Some(format!("order-idx-dangling:{}", oid)),
            })?;
        let order_id = oid.parse::<u64>().map_err(|e| AppError {
            code: AppErrorCode::DataCorruption,
            detail: Some(e.to_string()),
        })?;
        let m = VoucherOrderModel::try_from_storage_row(order_id, row)?;
        Ok(Some(m))
    } // end of fn fetch_by_user

    async fn num_orders_of_voucher(&self, voucher_id: u64) -> DefaultResult<usize, AppError> {
        let op = VoucherPrefixFiltKeyOp {
            prefix: format!("{}/", voucher_id),
        };
        let keys = self
            .datastore
            .filter_keys(ds_label::TABLE_VOUCHER_ORDER_IDX.to_string(), &op)
            .await?;
        Ok(keys.len())
    }
} // end of impl VoucherOrderInMemRepo
