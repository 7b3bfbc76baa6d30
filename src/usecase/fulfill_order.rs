use std::boxed::Box;
use std::result::Result as DefaultResult;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::eventstream::{AbstractEventStream, AppStreamRecord};
use crate::constant::lock_name;
use crate::error::AppError;
use crate::lock::{AbstractResourceLock, AppDStoreResourceLock};
use crate::logging::{app_log_event, AppLogContext, AppLogLevel};
use crate::model::VoucherOrderModel;
use crate::repository::{AbsVoucherOrderRepo, OrderCreateOutcome};
use crate::AppSharedState;

/// the durable order-creation step as its own explicitly-invoked unit,
/// the worker never reaches the repository transaction any other way
pub struct CreateVoucherOrderUseCase {
    pub repo: Box<dyn AbsVoucherOrderRepo>,
    pub logctx: Arc<AppLogContext>,
}

impl CreateVoucherOrderUseCase {
    pub async fn execute(
        &self,
        order: &VoucherOrderModel,
    ) -> DefaultResult<OrderCreateOutcome, AppError> {
        let outcome = self.repo.create(order).await?;
        let logctx_p = &self.logctx;
        match &outcome {
            OrderCreateOutcome::Created => {
                app_log_event!(
                    logctx_p,
                    AppLogLevel::DEBUG,
                    "order:{}, created",
                    order.order_id
                );
            }
            // both rejections mean the admitted entry reached the worker
            // more than once, or the admission store diverged, the final
            // durable state is correct either way
            OrderCreateOutcome::AlreadyPlaced => {
                app_log_event!(
                    logctx_p,
                    AppLogLevel::WARNING,
                    "order:{}, usr:{}, voucher:{}, duplicate skipped",
                    order.order_id,
                    order.usr_id,
                    order.voucher_id
                );
            }
            OrderCreateOutcome::OutOfStock => {
                app_log_event!(
                    logctx_p,
                    AppLogLevel::WARNING,
                    "order:{}, voucher:{}, durable stock exhausted",
                    order.order_id,
                    order.voucher_id
                );
            }
        }
        Ok(outcome)
    } // end of fn execute
} // end of impl CreateVoucherOrderUseCase

enum ProcessProgress {
    Acked,
    LockBusy,
}

/// single long-lived consumer of the order stream, reads entries
/// delivered to its consumer-group member, serializes per user through
/// the distributed lock, then runs the durable creation step, an entry
/// is acknowledged only after that step ran
pub struct FulfillOrderUseCase {
    pub glb_state: AppSharedState,
    pub create_uc: CreateVoucherOrderUseCase,
}

impl FulfillOrderUseCase {
    /// runs until the shared shutdown flag is raised, any read or
    /// processing failure triggers a pending-list recovery pass instead
    /// of terminating the task
    pub async fn run(self) {
        let logctx_p = self.glb_state.log_context().clone();
        let estream = self.glb_state.event_stream();
        let cfg = self.glb_state.config().clone();
        let es_cfg = &cfg.service.event_stream;
        let block = Duration::from_secs(es_cfg.block_secs as u64);
        if let Err(e) = estream
            .ensure_group(es_cfg.stream.as_str(), es_cfg.consumer_group.as_str())
            .await
        {
            app_log_event!(logctx_p, AppLogLevel::ERROR, "group-setup: {}", e);
            return;
        }
        // entries delivered before a previous crash are replayed first
        self.drain_pending().await;
        while !self.glb_state.shutdown().load(Ordering::Relaxed) {
            let result = estream
                .read_next(
                    es_cfg.stream.as_str(),
                    es_cfg.consumer_group.as_str(),
                    es_cfg.consumer_name.as_str(),
                    block,
                )
                .await;
            match result {
                Ok(None) => {} // idle timeout, re-poll
                Ok(Some(record)) => match self.process_one(&record).await {
                    Ok(_progress) => {}
                    Err(e) => {
                        app_log_event!(logctx_p, AppLogLevel::ERROR, "process: {}", e);
                        self.drain_pending().await;
                    }
                },
                Err(e) => {
                    app_log_event!(logctx_p, AppLogLevel::ERROR, "stream-read: {}", e);
                    self.drain_pending().await;
                }
            }
        } // end of live-read loop
        app_log_event!(logctx_p, AppLogLevel::INFO, "fulfill-worker-stopped");
    } // end of fn run

    async fn drain_pending(&self) {
        let logctx_p = self.glb_state.log_context().clone();
        let estream = self.glb_state.event_stream();
        let cfg = self.glb_state.config().clone();
        let es_cfg = &cfg.service.event_stream;
        while !self.glb_state.shutdown().load(Ordering::Relaxed) {
            let result = estream
                .read_pending(
                    es_cfg.stream.as_str(),
                    es_cfg.consumer_group.as_str(),
                    es_cfg.consumer_name.as_str(),
                )
                .await;
            match result {
                Ok(None) => break, // pending list drained, back to live reads
                Ok(Some(record)) => match self.process_one(&record).await {
                    Ok(ProcessProgress::Acked) => {}
                    Ok(ProcessProgress::LockBusy) => break,
                    // persistent infrastructure failure keeps the worker
                    // in recovery rather than losing the entry, transient
                    // ones resolve on a later attempt
                    Err(e) => {
                        app_log_event!(logctx_p, AppLogLevel::ERROR, "pending-retry: {}", e);
                        sleep(Duration::from_secs(1)).await;
                    }
                },
                Err(e) => {
                    app_log_event!(logctx_p, AppLogLevel::ERROR, "pending-read: {}", e);
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
    } // end of fn drain_pending

    async fn process_one(
        &self,
        record: &AppStreamRecord,
    ) -> DefaultResult<ProcessProgress, AppError> {
        let logctx_p = self.glb_state.log_context().clone();
        let cfg = self.glb_state.config().clone();
        let order = match VoucherOrderModel::try_from_stream_fields(&record.fields) {
            Ok(m) => m,
            Err(e) => {
                // corrupted entry, acknowledging it away is the only exit,
                // replay would fail the same way forever
                app_log_event!(
                    logctx_p,
                    AppLogLevel::ERROR,
                    "entry:{}, malformed: {}",
                    record.entry_id,
                    e
                );
                self.acknowledge(record.entry_id).await?;
                return Ok(ProcessProgress::Acked);
            }
        };
        let resource = format!("{}{}", lock_name::ORDER_USER_PREFIX, order.usr_id);
        let rlock =
            AppDStoreResourceLock::try_build(self.glb_state.datastore_inmem()?, resource).await?;
        let ttl = Duration::from_secs(cfg.service.seckill.order_lock_ttl_secs as u64);
        if !rlock.try_lock(ttl).await? {
            // another consumer is finishing the same user, leave the entry
            // pending, a later recovery pass picks it up
            app_log_event!(
                logctx_p,
                AppLogLevel::WARNING,
                "usr:{}, order-lock busy",
                order.usr_id
            );
            return Ok(ProcessProgress::LockBusy);
        }
        let create_result = self.create_uc.execute(&order).await;
        if let Err(e) = rlock.unlock().await {
            app_log_event!(logctx_p, AppLogLevel::ERROR, "unlock, usr:{}, {}", order.usr_id, e);
        } // released in every path before acknowledging
        let _outcome = create_result?;
        self.acknowledge(record.entry_id).await?;
        Ok(ProcessProgress::Acked)
    } // end of fn process_one

    async fn acknowledge(&self, entry_id: u64) -> DefaultResult<(), AppError> {
        let estream = self.glb_state.event_stream();
        let cfg = self.glb_state.config().clone();
        let es_cfg = &cfg.service.event_stream;
        let _known = estream
            .acknowledge(
                es_cfg.stream.as_str(),
                es_cfg.consumer_group.as_str(),
                entry_id,
            )
            .await?;
        Ok(())
    }
} // end of impl FulfillOrderUseCase
