use std::sync::atomic::{AtomicBool, AtomicU32};
use std::sync::Arc;

pub mod confidentiality;
pub mod constant;
pub mod error;
pub mod lock;
pub mod logging;
pub mod model;
pub mod repository;
pub mod sequence;
pub mod usecase;

mod config;
pub use config::{
    AppBasepathCfg, AppCacheCfg, AppCfgHardLimit, AppCfgInitArgs, AppConfidentialCfg, AppConfig,
    AppDataStoreCfg, AppDbServerCfg, AppDbServerType, AppEventStreamCfg, AppInMemoryDbCfg,
    AppLogHandlerCfg, AppLoggerCfg, AppLoggingCfg, AppSeckillCfg, AppServiceCfg,
};

mod adapter;
pub use adapter::cache;
pub use adapter::datastore;
pub use adapter::eventstream;

use confidentiality::AbstractConfidentiality;
use error::{AppError, AppErrorCode};
use eventstream::AbstractEventStream;

type AppLogAlias = Arc<String>;

pub struct AppDataStoreContext {
    pub in_mem: Option<Arc<Box<dyn datastore::AbstInMemoryDStore>>>,
    pub sql_dbs: Option<Vec<Arc<datastore::AppMariaDbStore>>>,
}

// global state shared by all tasks
pub struct AppSharedState {
    _cfg: Arc<AppConfig>,
    _log: Arc<logging::AppLogContext>,
    dstore: Arc<AppDataStoreContext>,
    _evt_stream: Arc<Box<dyn AbstractEventStream>>,
    _shutdown: Arc<AtomicBool>,
    _num_entries_processing: Arc<AtomicU32>,
}

impl AppSharedState {
    pub fn new(
        cfg: AppConfig,
        log: logging::AppLogContext,
        confidential: Box<dyn AbstractConfidentiality>,
    ) -> Self {
        let confidential = Arc::new(confidential);
        let log = Arc::new(log);
        let (in_mem, sql_dbs) =
            adapter::datastore::build_context(log.clone(), &cfg.service.data_store, confidential);
        let in_mem = in_mem.map(Arc::new);
        let sql_dbs = sql_dbs.map(|m| m.into_iter().map(Arc::new).collect());
        let ds_ctx = Arc::new(AppDataStoreContext { in_mem, sql_dbs });
        let evt_stream = adapter::eventstream::build_context(&cfg.service.event_stream);
        Self {
            _cfg: Arc::new(cfg),
            _log: log,
            dstore: ds_ctx,
            _evt_stream: Arc::new(evt_stream),
            _shutdown: Arc::new(AtomicBool::new(false)),
            _num_entries_processing: Arc::new(AtomicU32::new(0)),
        }
    } // end of fn new

    pub fn config(&self) -> &Arc<AppConfig> {
        &self._cfg
    }

    pub fn log_context(&self) -> &Arc<logging::AppLogContext> {
        &self._log
    }

    pub fn datastore(&self) -> Arc<AppDataStoreContext> {
        self.dstore.clone()
    }

    pub fn datastore_inmem(
        &self,
    ) -> Result<Arc<Box<dyn datastore::AbstInMemoryDStore>>, AppError> {
        self.dstore.in_mem.clone().ok_or(AppError {
            code: AppErrorCode::MissingDataStore,
            detail: Some("in-mem".to_string()),
        })
    }

    pub fn event_stream(&self) -> Arc<Box<dyn AbstractEventStream>> {
        self._evt_stream.clone()
    }

    pub fn shutdown(&self) -> Arc<AtomicBool> {
        self._shutdown.clone()
    }

    /// return atomic field which represents current number of queue
    /// entries being processed
    pub fn num_entries_processing(&self) -> Arc<AtomicU32> {
        self._num_entries_processing.clone()
    }
} // end of impl AppSharedState

impl Clone for AppSharedState {
    fn clone(&self) -> Self {
        Self {
            _cfg: self._cfg.clone(),
            _log: self._log.clone(),
            dstore: self.dstore.clone(),
            _evt_stream: self._evt_stream.clone(),
            _shutdown: self._shutdown.clone(),
            _num_entries_processing: self._num_entries_processing.clone(),
        }
    }
}
