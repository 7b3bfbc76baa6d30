use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::env;
use std::sync::atomic::Ordering;

use tokio::runtime::Builder as RuntimeBuilder;
use tokio::task;

use flashsale::confidentiality::{self, AbstractConfidentiality};
use flashsale::constant::env_vars::EXPECTED_LABELS;
use flashsale::logging::{app_log_event, AppLogContext, AppLogLevel};
use flashsale::repository::app_repo_voucher_order;
use flashsale::usecase::{CreateVoucherOrderUseCase, FulfillOrderUseCase};
use flashsale::{AppCfgHardLimit, AppCfgInitArgs, AppConfig, AppSharedState};

async fn start_fulfill_worker(shr_state: AppSharedState) {
    let logctx_p = shr_state.log_context().clone();
    let repo = match app_repo_voucher_order(shr_state.datastore()).await {
        Ok(r) => r,
        Err(e) => {
            app_log_event!(logctx_p, AppLogLevel::ERROR, "repo-init: {}", e);
            return;
        }
    };
    let uc = FulfillOrderUseCase {
        glb_state: shr_state.clone(),
        create_uc: CreateVoucherOrderUseCase {
            repo,
            logctx: logctx_p.clone(),
        },
    };
    let consumer_task = task::spawn(uc.run());
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            app_log_event!(logctx_p, AppLogLevel::INFO, "termination-signal-received");
        }
        Err(e) => {
            app_log_event!(logctx_p, AppLogLevel::ERROR, "signal-handler: {}", e);
        }
    }
    shr_state.shutdown().store(true, Ordering::Relaxed);
    // the consumer observes the flag within one blocking-read timeout
    if let Err(e) = consumer_task.await {
        app_log_event!(logctx_p, AppLogLevel::ERROR, "consumer-task-join: {}", e);
    }
} // end of fn start_fulfill_worker

fn start_async_runtime(cfg: AppConfig, cfdntl: Box<dyn AbstractConfidentiality>) {
    let log_ctx = AppLogContext::new(&cfg.basepath, &cfg.service.logging);
    let shr_state = AppSharedState::new(cfg, log_ctx, cfdntl);
    let cfg = shr_state.config();
    let stack_nbytes: usize = (cfg.service.stack_sz_kb as usize) << 10;
    let result = RuntimeBuilder::new_multi_thread()
        .worker_threads(cfg.service.num_workers as usize)
        .thread_stack_size(stack_nbytes)
        .thread_name("order-fulfill-worker")
        // manage low-level I/O drivers and timers used by the stream reads
        .enable_io()
        .enable_time()
        .build();
    match result {
        Ok(rt) => {
            // new worker threads spawned
            rt.block_on(async move {
                start_fulfill_worker(shr_state).await;
            }); // runtime started
        }
        Err(e) => {
            let log_ctx_p = shr_state.log_context();
            app_log_event!(
                log_ctx_p,
                AppLogLevel::ERROR,
                "async runtime failed to build, {} ",
                e
            );
        }
    };
} // end of fn start_async_runtime

fn main() {
    let iter = env::vars().filter(|(k, _v)| EXPECTED_LABELS.contains(&k.as_str()));
    let env_var_map: HashMap<String, String, RandomState> = HashMap::from_iter(iter);
    let args = AppCfgInitArgs {
        env_var_map,
        limit: AppCfgHardLimit::default(),
    };
    match AppConfig::new(args) {
        Ok(cfg) => match confidentiality::build_context(&cfg) {
            Ok(cfdntl) => {
                start_async_runtime(cfg, cfdntl);
            }
            Err(e) => {
                println!("app failed to init confidentiality handler, error code: {}", e);
            }
        },
        Err(e) => {
            println!("app failed to configure, error code: {}", e);
        }
    };
} // end of main
