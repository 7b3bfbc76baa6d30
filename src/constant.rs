pub mod app_meta {
    pub const LABEL: &str = "flashsale";
    pub const MACHINE_CODE: u8 = 1;
    // TODO, machine code to lock-token generator should be configurable
}

pub mod env_vars {
    pub const SYS_BASEPATH: &str = "SYS_BASE_PATH";
    pub const SERVICE_BASEPATH: &str = "SERVICE_BASE_PATH";
    // relative path starting from app / service home folder
    pub const CFG_FILEPATH: &str = "CONFIG_FILE_PATH";
    pub const EXPECTED_LABELS: [&str; 3] = [SYS_BASEPATH, SERVICE_BASEPATH, CFG_FILEPATH];
}

pub mod hard_limit {
    pub const MAX_ITEMS_STORED_PER_MODEL: u32 = 2200u32;
    pub const MAX_DB_CONNECTIONS: u32 = 10000u32;
    pub const MAX_SECONDS_DB_IDLE: u16 = 600u16;
    pub const MAX_NUM_CACHE_REBUILD_TASKS: u16 = 64u16;
    pub const MAX_SECONDS_STREAM_BLOCK: u16 = 30u16;
}

/// epoch the order-id sequencer counts seconds from, 2022-01-01T00:00:00Z,
/// high word of every generated id is relative to this instant
pub const SEQUENCER_EPOCH_SECS: i64 = 1_640_995_200;

pub mod datastore {
    // table labels in the key-value store shared by several components,
    // callers must create the tables they rely on before first access
    pub const TABLE_SECKILL_STOCK: &str = "seckill-stock";
    pub const TABLE_SECKILL_BOUGHT: &str = "seckill-bought";
    pub const TABLE_RESOURCE_LOCK: &str = "app-lock";
    pub const TABLE_SEQ_COUNTER: &str = "seq-counter";
    pub const TABLE_CACHE: &str = "app-cache";
    pub const TABLE_VOUCHER: &str = "seckill-voucher-db";
    pub const TABLE_VOUCHER_ORDER: &str = "voucher-order-db";
    pub const TABLE_VOUCHER_ORDER_IDX: &str = "voucher-order-usr-idx";
}

pub mod lock_name {
    pub const ORDER_USER_PREFIX: &str = "order:";
    pub const CACHE_REBUILD_PREFIX: &str = "cache:rebuild:";
}

pub mod cache_key {
    pub const VOUCHER_PREFIX: &str = "seckill:voucher:";
}

pub const SEQ_PREFIX_ORDER: &str = "order";

pub mod logging {
    use serde::Deserialize;

    #[allow(clippy::upper_case_acronyms)]
    #[derive(Deserialize)]
    pub enum Level {
        TRACE,
        DEBUG,
        INFO,
        WARNING,
        ERROR,
        FATAL,
    }

    #[allow(clippy::upper_case_acronyms)]
    #[derive(Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Destination {
        CONSOLE,
        LOCALFS,
    } // TODO, Fluentd
}
