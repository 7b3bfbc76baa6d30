use std::boxed::Box;
use std::sync::Arc;
use std::time::Duration;

use flashsale::datastore::{AbstInMemoryDStore, AppInMemoryDStore};
use flashsale::lock::{AbstractResourceLock, AppDStoreResourceLock};
use flashsale::AppInMemoryDbCfg;

fn ut_dstore() -> Arc<Box<dyn AbstInMemoryDStore>> {
    let cfg = AppInMemoryDbCfg {
        alias: "Sheipa".to_string(),
        max_items: 25,
    };
    Arc::new(Box::new(AppInMemoryDStore::new(&cfg)))
}

#[tokio::test]
async fn mutual_exclusion_ok() {
    let dstore = ut_dstore();
    let holder_a = AppDStoreResourceLock::try_build(dstore.clone(), "order:141".to_string())
        .await
        .unwrap();
    let holder_b = AppDStoreResourceLock::try_build(dstore.clone(), "order:141".to_string())
        .await
        .unwrap();
    let acquired = holder_a.try_lock(Duration::from_secs(5)).await.unwrap();
    assert_eq!(acquired, true);
    // single non-blocking attempt, the second holder is simply refused
    let acquired = holder_b.try_lock(Duration::from_secs(5)).await.unwrap();
    assert_eq!(acquired, false);
    let released = holder_a.unlock().await.unwrap();
    assert_eq!(released, true);
    let acquired = holder_b.try_lock(Duration::from_secs(5)).await.unwrap();
    assert_eq!(acquired, true);
    let _ = holder_b.unlock().await.unwrap();
} // end of fn mutual_exclusion_ok

#[tokio::test]
async fn distinct_resources_independent() {
    let dstore = ut_dstore();
    let holder_a = AppDStoreResourceLock::try_build(dstore.clone(), "order:141".to_string())
        .await
        .unwrap();
    let holder_b = AppDStoreResourceLock::try_build(dstore.clone(), "order:142".to_string())
        .await
        .unwrap();
    assert_eq!(holder_a.try_lock(Duration::from_secs(5)).await.unwrap(), true);
    assert_eq!(holder_b.try_lock(Duration::from_secs(5)).await.unwrap(), true);
    assert_eq!(holder_a.resource(), "order:141");
    assert_eq!(holder_b.resource(), "order:142");
}

#[tokio::test]
async fn foreign_token_never_releases() {
    let dstore = ut_dstore();
    let holder_a = AppDStoreResourceLock::try_build(dstore.clone(), "order:88".to_string())
        .await
        .unwrap();
    let intruder = AppDStoreResourceLock::try_build(dstore.clone(), "order:88".to_string())
        .await
        .unwrap();
    assert_eq!(holder_a.try_lock(Duration::from_secs(5)).await.unwrap(), true);
    // the intruder never acquired the lock, its delayed unlock call must
    // not remove the active holder's record
    let released = intruder.unlock().await.unwrap();
    assert_eq!(released, false);
    let acquired = intruder.try_lock(Duration::from_secs(5)).await.unwrap();
    assert_eq!(acquired, false);
    let released = holder_a.unlock().await.unwrap();
    assert_eq!(released, true);
} // end of fn foreign_token_never_releases

#[tokio::test]
async fn expiry_reclaims_crashed_holder() {
    let dstore = ut_dstore();
    let crashed = AppDStoreResourceLock::try_build(dstore.clone(), "order:13".to_string())
        .await
        .unwrap();
    let successor = AppDStoreResourceLock::try_build(dstore.clone(), "order:13".to_string())
        .await
        .unwrap();
    assert_eq!(crashed.try_lock(Duration::from_millis(30)).await.unwrap(), true);
    // no unlock from the first holder, expiry is the only recovery path
    tokio::time::sleep(Duration::from_millis(60)).await;
    let acquired = successor.try_lock(Duration::from_secs(5)).await.unwrap();
    assert_eq!(acquired, true);
    // the overrun holder coming back late must not delete the new record
    let released = crashed.unlock().await.unwrap();
    assert_eq!(released, false);
    let released = successor.unlock().await.unwrap();
    assert_eq!(released, true);
} // end of fn expiry_reclaims_crashed_holder

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquire_single_winner() {
    let dstore = ut_dstore();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let ds_p = dstore.clone();
        handles.push(tokio::task::spawn(async move {
            let holder = AppDStoreResourceLock::try_build(ds_p, "order:700".to_string())
                .await
                .unwrap();
            holder.try_lock(Duration::from_secs(5)).await.unwrap()
        }));
    }
    let mut num_winners = 0usize;
    for h in handles {
        if h.await.unwrap() {
            num_winners += 1;
        }
    }
    assert_eq!(num_winners, 1);
}
