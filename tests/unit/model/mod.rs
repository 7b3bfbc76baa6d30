use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Local as LocalTime};

use flashsale::error::AppErrorCode;
use flashsale::model::{SeckillVerdict, SeckillVoucherModel, VoucherOrderModel};

pub(crate) fn ut_voucher(voucher_id: u64, stock: u32) -> SeckillVoucherModel {
    let timenow = LocalTime::now().fixed_offset();
    SeckillVoucherModel {
        voucher_id,
        begin_time: timenow - ChronoDuration::minutes(5),
        end_time: timenow + ChronoDuration::minutes(30),
        stock,
    }
}

#[test]
fn voucher_time_window() {
    let voucher = ut_voucher(510, 10);
    let timenow = LocalTime::now().fixed_offset();
    assert_eq!(voucher.is_active(&timenow), true);
    let before = voucher.begin_time - ChronoDuration::seconds(1);
    assert_eq!(voucher.is_active(&before), false);
    assert_eq!(voucher.is_active(&voucher.end_time), false);
    // the window is half-open, begin inclusive, end exclusive
    assert_eq!(voucher.is_active(&voucher.begin_time), true);
}

#[test]
fn voucher_cache_payload_roundtrip() {
    let voucher = ut_voucher(510, 37);
    let payload = voucher.to_cache_payload();
    let decoded = SeckillVoucherModel::try_from_cache_payload(payload.as_str()).unwrap();
    assert_eq!(decoded, voucher);
}

#[test]
fn voucher_cache_payload_corrupted() {
    let result = SeckillVoucherModel::try_from_cache_payload("{not-even-json");
    assert!(result.is_err());
    assert_eq!(result.err().unwrap().code, AppErrorCode::InvalidJsonFormat);
}

#[test]
fn voucher_storage_row_roundtrip() {
    let voucher = ut_voucher(623, 5);
    let row = voucher.to_storage_row();
    let decoded = SeckillVoucherModel::try_from_storage_row(623, &row).unwrap();
    assert_eq!(decoded, voucher);
}

#[test]
fn order_wire_roundtrip() {
    let order = VoucherOrderModel {
        order_id: 0x65a1_0000_0001u64,
        usr_id: 188,
        voucher_id: 510,
        create_time: DateTime::parse_from_rfc3339("2024-05-06T07:08:09+08:00").unwrap(),
    };
    let fields = order.to_stream_fields();
    let decoded = VoucherOrderModel::try_from_stream_fields(&fields).unwrap();
    assert_eq!(decoded, order);
}

#[test]
fn order_wire_tolerates_unknown_fields() {
    let order = VoucherOrderModel {
        order_id: 99,
        usr_id: 188,
        voucher_id: 510,
        create_time: DateTime::parse_from_rfc3339("2024-05-06T07:08:09+08:00").unwrap(),
    };
    let mut fields = order.to_stream_fields();
    fields.insert("trace_ctx".to_string(), "0xdeadbeef".to_string());
    let decoded = VoucherOrderModel::try_from_stream_fields(&fields).unwrap();
    assert_eq!(decoded, order);
}

#[test]
fn order_wire_missing_field_error() {
    let fields = HashMap::from([
        ("id".to_string(), "99".to_string()),
        ("usr_id".to_string(), "188".to_string()),
    ]);
    let result = VoucherOrderModel::try_from_stream_fields(&fields);
    assert!(result.is_err());
    let e = result.err().unwrap();
    assert_eq!(e.code, AppErrorCode::DataCorruption);
    assert!(e.detail.unwrap().contains("voucher_id"));
}

#[test]
fn order_wire_corrupted_field_error() {
    let fields = HashMap::from([
        ("id".to_string(), "ninety-nine".to_string()),
        ("usr_id".to_string(), "188".to_string()),
        ("voucher_id".to_string(), "510".to_string()),
        ("create_time".to_string(), "2024-05-06T07:08:09+08:00".to_string()),
    ]);
    let result = VoucherOrderModel::try_from_stream_fields(&fields);
    assert!(result.is_err());
    assert_eq!(result.err().unwrap().code, AppErrorCode::DataCorruption);
}

#[test]
fn verdict_status_codes() {
    assert_eq!(u8::from(SeckillVerdict::Admitted), 0);
    assert_eq!(u8::from(SeckillVerdict::OutOfStock), 1);
    assert_eq!(u8::from(SeckillVerdict::DuplicateOrder), 2);
    let decoded = SeckillVerdict::try_from(2u8).unwrap();
    assert_eq!(decoded, SeckillVerdict::DuplicateOrder);
    assert!(SeckillVerdict::try_from(7u8).is_err());
}
