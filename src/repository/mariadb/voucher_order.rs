use std::boxed::Box;
use std::ops::DerefMut;
use std::result::Result as DefaultResult;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlArguments, MySqlRow};
use sqlx::{Arguments, Connection, Executor, Row, Statement};

use crate::datastore::AppMariaDbStore;
use crate::error::{AppError, AppErrorCode};
use crate::model::{SeckillVoucherModel, VoucherOrderModel};

use super::super::{AbsVoucherOrderRepo, OrderCreateOutcome};
use super::run_query_once;

pub(crate) struct VoucherOrderMariaDbRepo {
    dbs: Vec<Arc<AppMariaDbStore>>,
}

impl TryFrom<MySqlRow> for SeckillVoucherModel {
    type Error = AppError;
    fn try_from(row: MySqlRow) -> DefaultResult<Self, Self::Error> {
        let voucher_id = row.try_get::<u64, usize>(0)?;
        let begin_time = row.try_get::<DateTime<Utc>, usize>(1)?.fixed_offset();
        let end_time = row.try_get::<DateTime<Utc>, usize>(2)?.fixed_offset();
        let stock = row.try_get::<u32, usize>(3)?;
        Ok(Self {
            voucher_id,
            begin_time,
            end_time,
            stock,
        })
    }
}

impl TryFrom<MySqlRow> for VoucherOrderModel {
    type Error = AppError;
    fn try_from(row: MySqlRow) -> DefaultResult<Self, Self::Error> {
        let order_id = row.try_get::<u64, usize>(0)?;
        let usr_id = row.try_get::<u64, usize>(1)?;
        let voucher_id = row.try_get::<u64, usize>(2)?;
        let create_time = row.try_get::<DateTime<Utc>, usize>(3)?.fixed_offset();
        Ok(Self {
            order_id,
            usr_id,
            voucher_id,
            create_time,
        })
    }
}

impl VoucherOrderMariaDbRepo {
    pub(crate) fn try_build(dbs: Vec<Arc<AppMariaDbStore>>) -> DefaultResult<Self, AppError> {
        if dbs.is_empty() {
            Err(AppError {
                code: AppErrorCode::MissingDataStore,
                detail: Some("mariadb".to_string()),
            })
        } else {
            // TODO, pick the db instance based on voucher id, once the
            // order schema is sharded to multiple database servers
            Ok(Self { dbs })
        }
    }

    fn pick_db(&self) -> &Arc<AppMariaDbStore> {
        self.dbs.first().unwrap()
    }
} // end of impl VoucherOrderMariaDbRepo

#[async_trait]
impl AbsVoucherOrderRepo for VoucherOrderMariaDbRepo {
    async fn fetch_voucher(
        &self,
        voucher_id: u64,
    ) -> DefaultResult<SeckillVoucherModel, AppError> {
        let mut conn = self.pick_db().acquire().await?;
        let sql_patt = "SELECT `voucher_id`,`begin_time`,`end_time`,`stock` FROM \
                        `seckill_voucher` WHERE `voucher_id`=?";
        let exec = conn.deref_mut();
        let stmt = exec.prepare(sql_patt).await?;
        let query = stmt.query().bind(voucher_id);
        let row = exec.fetch_optional(query).await?.ok_or(AppError {
            code: AppErrorCode::VoucherNotExist,
            detail: Some(voucher_id.to_string()),
        })?;
        SeckillVoucherModel::try_from(row)
    }

    async fn save_voucher(&self, voucher: &SeckillVoucherModel) -> DefaultResult<(), AppError> {
        let mut conn = self.pick_db().acquire().await?;
        let sql_patt = "INSERT INTO `seckill_voucher`(`voucher_id`,`begin_time`,`end_time`,\
                        `stock`) VALUES (?,?,?,?) ON DUPLICATE KEY UPDATE `begin_time`=?,\
                        `end_time`=?, `stock`=?";
        let exec = conn.deref_mut();
        let stmt = exec.prepare(sql_patt).await?;
        let (t0, t1) = (
            voucher.begin_time.with_timezone(&Utc),
            voucher.end_time.with_timezone(&Utc),
        );
        let query = stmt
            .query()
            .bind(voucher.voucher_id)
            .bind(t0)
            .bind(t1)
            .bind(voucher.stock)
            .bind(t0)
            .bind(t1)
            .bind(voucher.stock);
        let _rs = exec.execute(query).await?;
        Ok(())
    } // end of fn save_voucher

    async fn create(
        &self,
        order: &VoucherOrderModel,
    ) -> DefaultResult<OrderCreateOutcome, AppError> {
        let mut conn = self.pick_db().acquire().await?;
        let mut tx = conn.begin().await?;
        {
            let sql_patt = "SELECT COUNT(`o_id`) FROM `voucher_order` WHERE `voucher_id`=? \
                            AND `usr_id`=?";
            let exec = tx.deref_mut();
            let stmt = exec.prepare(sql_patt).await?;
            let query = stmt.query().bind(order.voucher_id).bind(order.usr_id);
            let row = exec.fetch_one(query).await?;
            let cnt = row.try_get::<i64, usize>(0)?;
            if cnt > 0 {
                return Ok(OrderCreateOutcome::AlreadyPlaced);
            }
        } // tx dropped without commit on early return, nothing written yet
        {
            let sql_patt = "UPDATE `seckill_voucher` SET `stock`=`stock`-1 WHERE \
                            `voucher_id`=? AND `stock` > 0"
                .to_string();
            let mut args = MySqlArguments::default();
            let _ = args.add(order.voucher_id);
            let rs = run_query_once(&mut tx, sql_patt, args, None).await?;
            if rs.rows_affected() == 0 {
                return Ok(OrderCreateOutcome::OutOfStock);
            }
        }
        {
            let sql_patt = "INSERT INTO `voucher_order`(`o_id`,`usr_id`,`voucher_id`,\
                            `create_time`) VALUES (?,?,?,?)"
                .to_string();
            let mut args = MySqlArguments::default();
            let _ = args.add(order.order_id);
            let _ = args.add(order.usr_id);
            let _ = args.add(order.voucher_id);
            let _ = args.add(order.create_time.with_timezone(&Utc));
            let _rs = run_query_once(&mut tx, sql_patt, args, Some(1)).await?;
        }
        tx.commit().await?;
        Ok(OrderCreateOutcome::Created)
    } // end of fn create

    async fn fetch_by_user(
        &self,
        usr_id: u64,
        voucher_id: u64,
    ) -> DefaultResult<Option<VoucherOrderModel>, AppError> {
        let mut conn = self.pick_db().acquire().await?;
        let sql_patt = "SELECT `o_id`,`usr_id`,`voucher_id`,`create_time` FROM \
                        `voucher_order` WHERE `usr_id`=? AND `voucher_id`=?";
        let exec = conn.deref_mut();
        let stmt = exec.prepare(sql_patt).await?;
        let query = stmt.query().bind(usr_id).bind(voucher_id);
        let maybe_row = exec.fetch_optional(query).await?;
        maybe_row.map(VoucherOrderModel::try_from).transpose()
    }

    async fn num_orders_of_voucher(&self, voucher_id: u64) -> DefaultResult<usize, AppError> {
        let mut conn = self.pick_db().acquire().await?;
        let sql_patt = "SELECT COUNT(`o_id`) FROM `voucher_order` WHERE `voucher_id`=?";
        let exec = conn.deref_mut();
        let stmt = exec.prepare(sql_patt).await?;
        let query = stmt.query().bind(voucher_id);
        let row = exec.fetch_one(query).await?;
        let cnt = row.try_get::<i64, usize>(0)?;
        Ok(cnt as usize)
    }
} // end of impl VoucherOrderMariaDbRepo
