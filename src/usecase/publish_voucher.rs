use std::boxed::Box;
use std::result::Result as DefaultResult;
use std::sync::Arc;

use crate::error::AppError;
use crate::logging::{app_log_event, AppLogContext, AppLogLevel};
use crate::model::SeckillVoucherModel;
use crate::repository::{AbsVoucherOrderRepo, AbsVoucherStockRepo};

/// persists a voucher to the system of record then seeds its admission
/// state, admission calls for a voucher are valid only after this ran
pub struct PublishVoucherUseCase {
    pub repo_order: Box<dyn AbsVoucherOrderRepo>,
    pub repo_stock: Box<dyn AbsVoucherStockRepo>,
    pub logctx: Arc<AppLogContext>,
}

impl PublishVoucherUseCase {
    pub async fn execute(self, voucher: SeckillVoucherModel) -> DefaultResult<(), AppError> {
        self.repo_order.save_voucher(&voucher).await?;
        // seeding last, the admission gate must never observe stock for
        // a voucher the durable store does not know yet
        if let Err(e) = self.repo_stock.save(&voucher).await {
            let logctx_p = &self.logctx;
            app_log_event!(
                logctx_p,
                AppLogLevel::ERROR,
                "voucher:{}, seed-fail: {}",
                voucher.voucher_id,
                e
            );
            return Err(e);
        }
        Ok(())
    }
} // end of impl PublishVoucherUseCase
