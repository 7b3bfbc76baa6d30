use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local as LocalTime;
use tokio::time::{sleep, timeout};

use flashsale::eventstream::AbstractEventStream;
use flashsale::lock::{AbstractResourceLock, AppDStoreResourceLock};
use flashsale::model::{SeckillVerdict, VoucherOrderModel};
use flashsale::repository::{
    app_repo_voucher_order, app_repo_voucher_stock, AbsVoucherOrderRepo, AbsVoucherStockRepo,
};
use flashsale::usecase::{CreateVoucherOrderUseCase, FulfillOrderUseCase, PublishVoucherUseCase};
use flashsale::AppSharedState;

use super::super::model::ut_voucher;
use super::super::ut_setup_share_state;

const UT_STREAM: &str = "stream.orders";
const UT_GROUP: &str = "g1";
const UT_CONSUMER: &str = "c1";

fn ut_order(order_id: u64, usr_id: u64, voucher_id: u64) -> VoucherOrderModel {
    VoucherOrderModel {
        order_id,
        usr_id,
        voucher_id,
        create_time: LocalTime::now().fixed_offset(),
    }
}

async fn ut_publish_voucher(shr_state: &AppSharedState, voucher_id: u64, stock: u32) {
    let ds = shr_state.datastore();
    let repo_order = app_repo_voucher_order(ds.clone()).await.unwrap();
    let repo_stock = app_repo_voucher_stock(ds, shr_state.event_stream(), UT_STREAM.to_string())
        .await
        .unwrap();
    let uc = PublishVoucherUseCase {
        repo_order,
        repo_stock,
        logctx: shr_state.log_context().clone(),
    };
    uc.execute(ut_voucher(voucher_id, stock)).await.unwrap();
}

async fn ut_admit(shr_state: &AppSharedState, order: &VoucherOrderModel) {
    let repo_stock = app_repo_voucher_stock(
        shr_state.datastore(),
        shr_state.event_stream(),
        UT_STREAM.to_string(),
    )
    .await
    .unwrap();
    let verdict = repo_stock.try_admit(order).await.unwrap();
    assert_eq!(verdict, SeckillVerdict::Admitted);
}

async fn ut_spawn_worker(shr_state: &AppSharedState) -> tokio::task::JoinHandle<()> {
    let repo = app_repo_voucher_order(shr_state.datastore()).await.unwrap();
    let uc = FulfillOrderUseCase {
        glb_state: shr_state.clone(),
        create_uc: CreateVoucherOrderUseCase {
            repo,
            logctx: shr_state.log_context().clone(),
        },
    };
    tokio::task::spawn(uc.run())
}

async fn ut_stop_worker(shr_state: &AppSharedState, handle: tokio::task::JoinHandle<()>) {
    shr_state.shutdown().store(true, Ordering::Relaxed);
    let result = timeout(Duration::from_secs(5), handle).await;
    assert!(result.is_ok()); // worker observed the flag within one poll cycle
}

#[tokio::test(flavor = "multi_thread", worker_threads = 3)]
async fn admitted_order_becomes_durable() {
    let shr_state = ut_setup_share_state(300, 1);
    ut_publish_voucher(&shr_state, 510, 5).await;
    ut_admit(&shr_state, &ut_order(9001, 188, 510)).await;

    let handle = ut_spawn_worker(&shr_state).await;
    sleep(Duration::from_millis(400)).await;

    let repo = app_repo_voucher_order(shr_state.datastore()).await.unwrap();
    let created = repo.fetch_by_user(188, 510).await.unwrap().unwrap();
    assert_eq!(created.order_id, 9001);
    assert_eq!(repo.fetch_voucher(510).await.unwrap().stock, 4);
    assert_eq!(repo.num_orders_of_voucher(510).await.unwrap(), 1);
    // the queue entry was acknowledged after the durable write
    let estream = shr_state.event_stream();
    assert_eq!(estream.num_pending(UT_STREAM, UT_GROUP).await.unwrap(), 0);
    ut_stop_worker(&shr_state, handle).await;
} // end of fn admitted_order_becomes_durable

#[tokio::test(flavor = "multi_thread", worker_threads = 3)]
async fn pending_entry_recovered_after_crash() {
    let shr_state = ut_setup_share_state(300, 1);
    let estream = shr_state.event_stream();
    estream.ensure_group(UT_STREAM, UT_GROUP).await.unwrap();
    ut_publish_voucher(&shr_state, 510, 5).await;
    ut_admit(&shr_state, &ut_order(9001, 188, 510)).await;

    // the previous consumer incarnation took delivery then died without
    // acknowledging
    let rec = estream
        .read_next(UT_STREAM, UT_GROUP, UT_CONSUMER, Duration::from_millis(100))
        .await
        .unwrap();
    assert!(rec.is_some());
    assert_eq!(estream.num_pending(UT_STREAM, UT_GROUP).await.unwrap(), 1);

    // the restarted worker drains its pending list before live reads
    let handle = ut_spawn_worker(&shr_state).await;
    sleep(Duration::from_millis(400)).await;

    let repo = app_repo_voucher_order(shr_state.datastore()).await.unwrap();
    assert!(repo.fetch_by_user(188, 510).await.unwrap().is_some());
    assert_eq!(repo.num_orders_of_voucher(510).await.unwrap(), 1);
    assert_eq!(estream.num_pending(UT_STREAM, UT_GROUP).await.unwrap(), 0);
    ut_stop_worker(&shr_state, handle).await;
} // end of fn pending_entry_recovered_after_crash

#[tokio::test(flavor = "multi_thread", worker_threads = 3)]
async fn duplicate_delivery_creates_one_order() {
    let shr_state = ut_setup_share_state(300, 1);
    let estream = shr_state.event_stream();
    estream.ensure_group(UT_STREAM, UT_GROUP).await.unwrap();
    ut_publish_voucher(&shr_state, 510, 5).await;
    let order = ut_order(9001, 188, 510);
    ut_admit(&shr_state, &order).await;
    // the same logical purchase appended twice, as duplicate delivery
    // after a partial failure would look
    estream
        .append(UT_STREAM, order.to_stream_fields())
        .await
        .unwrap();

    let handle = ut_spawn_worker(&shr_state).await;
    sleep(Duration::from_millis(500)).await;

    let repo = app_repo_voucher_order(shr_state.datastore()).await.unwrap();
    assert_eq!(repo.num_orders_of_voucher(510).await.unwrap(), 1);
    assert_eq!(repo.fetch_voucher(510).await.unwrap().stock, 4);
    assert_eq!(estream.num_pending(UT_STREAM, UT_GROUP).await.unwrap(), 0);
    ut_stop_worker(&shr_state, handle).await;
} // end of fn duplicate_delivery_creates_one_order

#[tokio::test(flavor = "multi_thread", worker_threads = 3)]
async fn lock_busy_entry_stays_pending_until_restart() {
    let shr_state = ut_setup_share_state(300, 1);
    ut_publish_voucher(&shr_state, 510, 5).await;
    ut_admit(&shr_state, &ut_order(9001, 188, 510)).await;

    // another process is holding the per-user lock
    let foreign = AppDStoreResourceLock::try_build(
        shr_state.datastore_inmem().unwrap(),
        "order:188".to_string(),
    )
    .await
    .unwrap();
    assert_eq!(foreign.try_lock(Duration::from_secs(30)).await.unwrap(), true);

    let handle = ut_spawn_worker(&shr_state).await;
    sleep(Duration::from_millis(400)).await;
    let repo = app_repo_voucher_order(shr_state.datastore()).await.unwrap();
    // skipped without acknowledgment, nothing written durably yet
    assert!(repo.fetch_by_user(188, 510).await.unwrap().is_none());
    let estream = shr_state.event_stream();
    assert_eq!(estream.num_pending(UT_STREAM, UT_GROUP).await.unwrap(), 1);
    ut_stop_worker(&shr_state, handle).await;

    // holder finishes, the restarted worker recovers the entry from the
    // pending list
    assert_eq!(foreign.unlock().await.unwrap(), true);
    shr_state.shutdown().store(false, Ordering::Relaxed);
    let handle = ut_spawn_worker(&shr_state).await;
    sleep(Duration::from_millis(400)).await;
    assert!(repo.fetch_by_user(188, 510).await.unwrap().is_some());
    assert_eq!(estream.num_pending(UT_STREAM, UT_GROUP).await.unwrap(), 0);
    ut_stop_worker(&shr_state, handle).await;
} // end of fn lock_busy_entry_stays_pending_until_restart

#[tokio::test(flavor = "multi_thread", worker_threads = 3)]
async fn malformed_entry_acknowledged_away() {
    let shr_state = ut_setup_share_state(300, 1);
    let estream = shr_state.event_stream();
    estream.ensure_group(UT_STREAM, UT_GROUP).await.unwrap();
    ut_publish_voucher(&shr_state, 510, 5).await;
    // garbage entry ahead of a valid one
    let junk = std::collections::HashMap::from([("surprise".to_string(), "1".to_string())]);
    estream.append(UT_STREAM, junk).await.unwrap();
    ut_admit(&shr_state, &ut_order(9001, 188, 510)).await;

    let handle = ut_spawn_worker(&shr_state).await;
    sleep(Duration::from_millis(500)).await;

    let repo = app_repo_voucher_order(shr_state.datastore()).await.unwrap();
    // the valid order still went through, the junk did not wedge the
    // consumer nor stay pending
    assert!(repo.fetch_by_user(188, 510).await.unwrap().is_some());
    assert_eq!(estream.num_pending(UT_STREAM, UT_GROUP).await.unwrap(), 0);
    ut_stop_worker(&shr_state, handle).await;
} // end of fn malformed_entry_acknowledged_away
