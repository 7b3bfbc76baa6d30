use std::collections::HashMap;
use std::time::Duration;

use flashsale::error::AppErrorCode;
use flashsale::eventstream::{AbstractEventStream, AppInMemEventStream};

const UT_STREAM: &str = "stream.orders";
const UT_GROUP: &str = "g1";
const UT_CONSUMER: &str = "c1";

fn ut_fields(oid: u64) -> HashMap<String, String> {
    HashMap::from([
        ("id".to_string(), oid.to_string()),
        ("usr_id".to_string(), "188".to_string()),
    ])
}

#[tokio::test]
async fn append_read_ack_ok() {
    let estream = AppInMemEventStream::new(16);
    let result = estream.ensure_group(UT_STREAM, UT_GROUP).await;
    assert!(result.is_ok());
    let id0 = estream.append(UT_STREAM, ut_fields(9001)).await.unwrap();
    let id1 = estream.append(UT_STREAM, ut_fields(9002)).await.unwrap();
    assert!(id0 < id1);

    let result = estream
        .read_next(UT_STREAM, UT_GROUP, UT_CONSUMER, Duration::from_millis(50))
        .await;
    assert_eq!(result.is_ok(), true);
    let record = result.unwrap().unwrap();
    assert_eq!(record.entry_id, id0);
    assert_eq!(record.fields.get("id").unwrap().as_str(), "9001");
    assert_eq!(estream.num_pending(UT_STREAM, UT_GROUP).await.unwrap(), 1);

    let acked = estream.acknowledge(UT_STREAM, UT_GROUP, id0).await.unwrap();
    assert_eq!(acked, true);
    assert_eq!(estream.num_pending(UT_STREAM, UT_GROUP).await.unwrap(), 0);
    // acknowledging twice reports the entry is no longer pending
    let acked = estream.acknowledge(UT_STREAM, UT_GROUP, id0).await.unwrap();
    assert_eq!(acked, false);

    let record = estream
        .read_next(UT_STREAM, UT_GROUP, UT_CONSUMER, Duration::from_millis(50))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.entry_id, id1);
} // end of fn append_read_ack_ok

#[tokio::test]
async fn read_blocks_until_timeout() {
    let estream = AppInMemEventStream::new(16);
    estream.ensure_group(UT_STREAM, UT_GROUP).await.unwrap();
    let t_start = tokio::time::Instant::now();
    let result = estream
        .read_next(UT_STREAM, UT_GROUP, UT_CONSUMER, Duration::from_millis(120))
        .await;
    assert_eq!(result.is_ok(), true);
    assert!(result.unwrap().is_none());
    assert!(t_start.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn read_wakes_on_append() {
    let estream = std::sync::Arc::new(AppInMemEventStream::new(16));
    estream.ensure_group(UT_STREAM, UT_GROUP).await.unwrap();
    let estream_p = estream.clone();
    let producer = tokio::task::spawn(async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        estream_p.append(UT_STREAM, ut_fields(9005)).await.unwrap()
    });
    let record = estream
        .read_next(UT_STREAM, UT_GROUP, UT_CONSUMER, Duration::from_secs(2))
        .await
        .unwrap();
    assert!(record.is_some());
    assert_eq!(record.unwrap().fields.get("id").unwrap().as_str(), "9005");
    let _ = producer.await;
}

#[tokio::test]
async fn pending_recovered_after_restart() {
    let estream = AppInMemEventStream::new(16);
    estream.ensure_group(UT_STREAM, UT_GROUP).await.unwrap();
    let id0 = estream.append(UT_STREAM, ut_fields(9001)).await.unwrap();
    let id1 = estream.append(UT_STREAM, ut_fields(9002)).await.unwrap();
    // delivered but the consumer dies before acknowledging either
    let _r0 = estream
        .read_next(UT_STREAM, UT_GROUP, UT_CONSUMER, Duration::from_millis(50))
        .await
        .unwrap()
        .unwrap();
    let _r1 = estream
        .read_next(UT_STREAM, UT_GROUP, UT_CONSUMER, Duration::from_millis(50))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(estream.num_pending(UT_STREAM, UT_GROUP).await.unwrap(), 2);

    // the restarted consumer replays its pending list oldest-first
    let rec = estream
        .read_pending(UT_STREAM, UT_GROUP, UT_CONSUMER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rec.entry_id, id0);
    estream.acknowledge(UT_STREAM, UT_GROUP, id0).await.unwrap();
    let rec = estream
        .read_pending(UT_STREAM, UT_GROUP, UT_CONSUMER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rec.entry_id, id1);
    estream.acknowledge(UT_STREAM, UT_GROUP, id1).await.unwrap();
    let rec = estream
        .read_pending(UT_STREAM, UT_GROUP, UT_CONSUMER)
        .await
        .unwrap();
    assert!(rec.is_none());
} // end of fn pending_recovered_after_restart

#[tokio::test]
async fn pending_isolated_per_consumer() {
    let estream = AppInMemEventStream::new(16);
    estream.ensure_group(UT_STREAM, UT_GROUP).await.unwrap();
    let id0 = estream.append(UT_STREAM, ut_fields(9001)).await.unwrap();
    let _rec = estream
        .read_next(UT_STREAM, UT_GROUP, "c-other", Duration::from_millis(50))
        .await
        .unwrap()
        .unwrap();
    // the entry belongs to another member of the group
    let rec = estream
        .read_pending(UT_STREAM, UT_GROUP, UT_CONSUMER)
        .await
        .unwrap();
    assert!(rec.is_none());
    let rec = estream
        .read_pending(UT_STREAM, UT_GROUP, "c-other")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rec.entry_id, id0);
}

#[tokio::test]
async fn unknown_group_error() {
    let estream = AppInMemEventStream::new(16);
    let result = estream
        .read_next(UT_STREAM, UT_GROUP, UT_CONSUMER, Duration::from_millis(10))
        .await;
    assert_eq!(result.is_err(), true);
    let e = result.err().unwrap();
    assert_eq!(e.code, AppErrorCode::StreamGroupNotExist);
}

#[tokio::test]
async fn append_empty_fields_error() {
    let estream = AppInMemEventStream::new(16);
    let result = estream.append(UT_STREAM, HashMap::new()).await;
    assert_eq!(result.is_err(), true);
    let e = result.err().unwrap();
    assert_eq!(e.code, AppErrorCode::EmptyInputData);
}
