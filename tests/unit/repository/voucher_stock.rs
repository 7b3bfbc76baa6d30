use std::sync::Arc;
use std::time::Duration;

use chrono::Local as LocalTime;

use flashsale::error::AppErrorCode;
use flashsale::eventstream::AbstractEventStream;
use flashsale::model::{SeckillVerdict, VoucherOrderModel};
use flashsale::repository::{AbsVoucherStockRepo, VoucherStockInMemRepo};

use super::super::model::ut_voucher;
use super::{ut_dstore, ut_estream, UT_CONSUMER, UT_GROUP, UT_STREAM};

fn ut_order(order_id: u64, usr_id: u64, voucher_id: u64) -> VoucherOrderModel {
    VoucherOrderModel {
        order_id,
        usr_id,
        voucher_id,
        create_time: LocalTime::now().fixed_offset(),
    }
}

async fn ut_setup_repo() -> (
    VoucherStockInMemRepo,
    Arc<Box<dyn flashsale::eventstream::AbstractEventStream>>,
) {
    let estream = ut_estream();
    estream.ensure_group(UT_STREAM, UT_GROUP).await.unwrap();
    let repo = VoucherStockInMemRepo::build(ut_dstore(50), estream.clone(), UT_STREAM.to_string())
        .await
        .unwrap();
    (repo, estream)
}

#[tokio::test]
async fn save_fetch_ok() {
    let (repo, _estream) = ut_setup_repo().await;
    let voucher = ut_voucher(510, 8);
    repo.save(&voucher).await.unwrap();
    let fetched = repo.fetch(510).await.unwrap();
    assert_eq!(fetched, voucher);
    let result = repo.fetch(511).await;
    assert!(result.is_err());
    assert_eq!(result.err().unwrap().code, AppErrorCode::VoucherNotExist);
}

#[tokio::test]
async fn admit_then_duplicate_rejected() {
    let (repo, estream) = ut_setup_repo().await;
    repo.save(&ut_voucher(510, 5)).await.unwrap();
    let verdict = repo.try_admit(&ut_order(9001, 188, 510)).await.unwrap();
    assert_eq!(verdict, SeckillVerdict::Admitted);
    // same user re-tries with a fresh order id, rejected before any
    // stock movement
    let verdict = repo.try_admit(&ut_order(9002, 188, 510)).await.unwrap();
    assert_eq!(verdict, SeckillVerdict::DuplicateOrder);
    let remaining = repo.fetch(510).await.unwrap().stock;
    assert_eq!(remaining, 4); // decremented exactly once
    // exactly one entry reached the queue
    let rec = estream
        .read_next(UT_STREAM, UT_GROUP, UT_CONSUMER, Duration::from_millis(50))
        .await
        .unwrap();
    assert!(rec.is_some());
    assert_eq!(rec.unwrap().fields.get("id").unwrap().as_str(), "9001");
    let rec = estream
        .read_next(UT_STREAM, UT_GROUP, UT_CONSUMER, Duration::from_millis(50))
        .await
        .unwrap();
    assert!(rec.is_none());
} // end of fn admit_then_duplicate_rejected

#[tokio::test]
async fn admit_until_out_of_stock() {
    let (repo, _estream) = ut_setup_repo().await;
    repo.save(&ut_voucher(510, 2)).await.unwrap();
    let verdict = repo.try_admit(&ut_order(9001, 111, 510)).await.unwrap();
    assert_eq!(verdict, SeckillVerdict::Admitted);
    let verdict = repo.try_admit(&ut_order(9002, 222, 510)).await.unwrap();
    assert_eq!(verdict, SeckillVerdict::Admitted);
    let verdict = repo.try_admit(&ut_order(9003, 333, 510)).await.unwrap();
    assert_eq!(verdict, SeckillVerdict::OutOfStock);
    assert_eq!(repo.fetch(510).await.unwrap().stock, 0);
}

#[tokio::test]
async fn duplicate_checked_before_stock() {
    let (repo, _estream) = ut_setup_repo().await;
    repo.save(&ut_voucher(510, 1)).await.unwrap();
    let verdict = repo.try_admit(&ut_order(9001, 188, 510)).await.unwrap();
    assert_eq!(verdict, SeckillVerdict::Admitted);
    // stock is exhausted AND the user already bought, the duplicate
    // verdict takes precedence
    let verdict = repo.try_admit(&ut_order(9002, 188, 510)).await.unwrap();
    assert_eq!(verdict, SeckillVerdict::DuplicateOrder);
}

#[tokio::test]
async fn admit_unknown_voucher_error() {
    let (repo, _estream) = ut_setup_repo().await;
    let result = repo.try_admit(&ut_order(9001, 188, 404)).await;
    assert!(result.is_err());
    assert_eq!(result.err().unwrap().code, AppErrorCode::VoucherNotExist);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stock_one_concurrent_users_single_winner() {
    let (repo, estream) = ut_setup_repo().await;
    repo.save(&ut_voucher(510, 1)).await.unwrap();
    let repo = Arc::new(repo);
    let mut handles = Vec::new();
    for usr_id in [111u64, 222u64] {
        let repo_p = repo.clone();
        handles.push(tokio::task::spawn(async move {
            repo_p
                .try_admit(&ut_order(9000 + usr_id, usr_id, 510))
                .await
                .unwrap()
        }));
    }
    let mut verdicts = Vec::new();
    for h in handles {
        verdicts.push(h.await.unwrap());
    }
    let num_ok = verdicts
        .iter()
        .filter(|v| **v == SeckillVerdict::Admitted)
        .count();
    let num_oos = verdicts
        .iter()
        .filter(|v| **v == SeckillVerdict::OutOfStock)
        .count();
    assert_eq!(num_ok, 1);
    assert_eq!(num_oos, 1);
    assert_eq!(repo.fetch(510).await.unwrap().stock, 0);
    // the queue holds exactly the single admitted order
    let rec = estream
        .read_next(UT_STREAM, UT_GROUP, UT_CONSUMER, Duration::from_millis(50))
        .await
        .unwrap();
    assert!(rec.is_some());
    let rec = estream
        .read_next(UT_STREAM, UT_GROUP, UT_CONSUMER, Duration::from_millis(50))
        .await
        .unwrap();
    assert!(rec.is_none());
} // end of fn stock_one_concurrent_users_single_winner

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_oversell_under_burst() {
    const INIT_STOCK: u32 = 5;
    const NUM_USERS: u64 = 24;
    let (repo, _estream) = ut_setup_repo().await;
    repo.save(&ut_voucher(510, INIT_STOCK)).await.unwrap();
    let repo = Arc::new(repo);
    let mut handles = Vec::new();
    for usr_id in 1..=NUM_USERS {
        let repo_p = repo.clone();
        handles.push(tokio::task::spawn(async move {
            repo_p
                .try_admit(&ut_order(77000 + usr_id, usr_id, 510))
                .await
                .unwrap()
        }));
    }
    let mut num_admitted = 0usize;
    for h in handles {
        if h.await.unwrap() == SeckillVerdict::Admitted {
            num_admitted += 1;
        }
    }
    assert_eq!(num_admitted, INIT_STOCK as usize);
    assert_eq!(repo.fetch(510).await.unwrap().stock, 0);
}
