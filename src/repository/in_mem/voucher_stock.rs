use std::boxed::Box;
use std::collections::HashMap;
use std::result::Result as DefaultResult;
use std::sync::Arc;

use async_trait::async_trait;

use crate::eventstream::AbstractEventStream;
use crate::constant::datastore as ds_label;
use crate::datastore::AbstInMemoryDStore;
use crate::error::{AppError, AppErrorCode};
use crate::model::{SeckillVerdict, SeckillVoucherModel, VoucherOrderModel};

use super::super::AbsVoucherStockRepo;

// row layout of both tables follows SeckillVoucherModel::to_storage_row()
// and the purchased-user list respectively, the model type owns the
// conversion in both directions

pub struct VoucherStockInMemRepo {
    datastore: Arc<Box<dyn AbstInMemoryDStore>>,
    estream: Arc<Box<dyn AbstractEventStream>>,
    stream_label: String,
}

impl VoucherStockInMemRepo {
    pub async fn build(
        m: Arc<Box<dyn AbstInMemoryDStore>>,
        estream: Arc<Box<dyn AbstractEventStream>>,
        stream_label: String,
    ) -> DefaultResult<Self, AppError> {
        m.create_table(ds_label::TABLE_SECKILL_STOCK).await?;
        m.create_table(ds_label::TABLE_SECKILL_BOUGHT).await?;
        Ok(Self {
            datastore: m,
            estream,
            stream_label,
        })
    }

    fn fetch_keys(voucher_id: u64) -> HashMap<String, Vec<String>> {
        let key = voucher_id.to_string();
        HashMap::from([
            (ds_label::TABLE_SECKILL_STOCK.to_string(), vec![key.clone()]),
            (ds_label::TABLE_SECKILL_BOUGHT.to_string(), vec![key]),
        ])
    }
} // end of impl VoucherStockInMemRepo

#[async_trait]
impl AbsVoucherStockRepo for VoucherStockInMemRepo {
    async fn fetch(&self, voucher_id: u64) -> DefaultResult<SeckillVoucherModel, AppError> {
        let key = voucher_id.to_string();
        let info = HashMap::from([(
            ds_label::TABLE_SECKILL_STOCK.to_string(),
            vec![key.clone()],
        )]);
        let tableset = self.datastore.fetch(info).await?;
        let row = tableset
            .get(ds_label::TABLE_SECKILL_STOCK)
            .and_then(|t| t.get(key.as_str()))
            .ok_or(AppError {
                code: AppErrorCode::VoucherNotExist,
                detail: Some(key),
            })?;
        SeckillVoucherModel::try_from_storage_row(voucher_id, row)
    }

    async fn save(&self, voucher: &SeckillVoucherModel) -> DefaultResult<(), AppError> {
        let key = voucher.voucher_id.to_string();
        let stock_t = HashMap::from([(key.clone(), voucher.to_storage_row())]);
        // re-seeding resets the purchased-user set along with the stock
        let bought_t = HashMap::from([(key, Vec::new())]);
        let data = HashMap::from([
            (ds_label::TABLE_SECKILL_STOCK.to_string(), stock_t),
            (ds_label::TABLE_SECKILL_BOUGHT.to_string(), bought_t),
        ]);
        let _num = self.datastore.save(data).await?;
        Ok(())
    }

    async fn try_admit(
        &self,
        order: &VoucherOrderModel,
    ) -> DefaultResult<SeckillVerdict, AppError> {
        let v_key = order.voucher_id.to_string();
        let usr = order.usr_id.to_string();
        let (tableset, d_lock) = self
            .datastore
            .fetch_acquire(Self::fetch_keys(order.voucher_id))
            .await?;
        // duplicate check runs first, rejecting a repeat buyer is cheaper
        // than wasting a stock decrement on them
        let mut bought = tableset
            .get(ds_label::TABLE_SECKILL_BOUGHT)
            .and_then(|t| t.get(v_key.as_str()))
            .cloned()
            .unwrap_or_default();
        if bought.iter().any(|u| u.as_str() == usr.as_str()) {
            return Ok(SeckillVerdict::DuplicateOrder);
        }
        let stock_row = tableset
            .get(ds_label::TABLE_SECKILL_STOCK)
            .and_then(|t| t.get(v_key.as_str()))
            .ok_or(AppError {
                code: AppErrorCode::VoucherNotExist,
                detail: Some(v_key.clone()),
            })?;
        let mut voucher =
            SeckillVoucherModel::try_from_storage_row(order.voucher_id, stock_row)?;
        if voucher.stock == 0 {
            return Ok(SeckillVerdict::OutOfStock);
        }
        voucher.stock -= 1;
        bought.push(usr);
        // the append happens while the store is still locked, concurrent
        // admissions observe decrement, membership and enqueue as one
        // indivisible unit, an append failure discards the reservation
        let _entry_id = self
            .estream
            .append(self.stream_label.as_str(), order.to_stream_fields())
            .await?;
        let stock_t = HashMap::from([(v_key.clone(), voucher.to_storage_row())]);
        let bought_t = HashMap::from([(v_key, bought)]);
        let data = HashMap::from([
            (ds_label::TABLE_SECKILL_STOCK.to_string(), stock_t),
            (ds_label::TABLE_SECKILL_BOUGHT.to_string(), bought_t),
        ]);
        let _num = self.datastore.save_release(data, d_lock)?;
        Ok(SeckillVerdict::Admitted)
    } // end of fn try_admit
} // end of impl VoucherStockInMemRepo
