pub(super) mod voucher_order;

use std::io::ErrorKind;
use std::ops::DerefMut;
use std::result::Result as DefaultResult;

use sqlx::error::Error;
use sqlx::mysql::{MySqlArguments, MySqlQueryResult};
use sqlx::{Executor, MySql, Statement, Transaction};

use crate::error::{AppError, AppErrorCode};

impl From<Error> for AppError {
    fn from(value: Error) -> Self {
        let (code, detail) = match value {
            Error::Configuration(e) => (
                AppErrorCode::InvalidInput,
                e.to_string() + " invalid-db-config",
            ),
            Error::Io(e) => (
                AppErrorCode::IOerror(e.kind()),
                e.to_string() + " io-err-mariadb",
            ),
            Error::Database(e) => (AppErrorCode::RemoteDbServerFailure, e.to_string()),
            Error::Protocol(errmsg) => (AppErrorCode::IOerror(ErrorKind::InvalidData), errmsg),
            Error::Decode(e) => (AppErrorCode::DataCorruption, e.to_string()),
            Error::ColumnDecode { index, source } => (
                AppErrorCode::DataCorruption,
                source.to_string() + ", when decoding column at idx " + index.as_str(),
            ),
            Error::TypeNotFound { type_name } => {
                (AppErrorCode::InvalidInput, type_name + " wrong-col-typ")
            }
            Error::ColumnNotFound(col_name) => (
                AppErrorCode::IOerror(ErrorKind::NotFound),
                col_name + " no-col",
            ),
            Error::RowNotFound => (
                AppErrorCode::IOerror(ErrorKind::NotFound),
                "no-row".to_string(),
            ),
            Error::ColumnIndexOutOfBounds { index, len } => (
                AppErrorCode::InvalidInput,
                format!("req-idx:{}, limit:{}", index, len),
            ),
            Error::PoolTimedOut => (
                AppErrorCode::DatabaseServerBusy,
                "no-conn-avail".to_string(),
            ),
            Error::PoolClosed => (AppErrorCode::Unknown, "pool-closed".to_string()),
            Error::WorkerCrashed => (
                AppErrorCode::Unknown,
                "low-level-db-worker-crashed".to_string(),
            ),
            _others => (
                AppErrorCode::Unknown,
                "internal-implementation-issue".to_string(),
            ),
        };
        Self {
            code,
            detail: Some(detail),
        }
    } // end of fn from
} // end of impl AppError

pub(super) async fn run_query_once(
    tx: &mut Transaction<'_, MySql>,
    sql_patt: String,
    args: MySqlArguments,
    expect_num_affected: Option<usize>,
) -> DefaultResult<MySqlQueryResult, AppError> {
    let exec = tx.deref_mut();
    let stmt = exec.prepare(sql_patt.as_str()).await?;
    let query = stmt.query_with(args);
    let resultset = exec.execute(query).await?;
    if let Some(expect) = expect_num_affected {
        let actual = resultset.rows_affected() as usize;
        if actual != expect {
            let detail = format!("rows-affected, actual:{}, expect:{}", actual, expect);
            return Err(AppError {
                code: AppErrorCode::DataCorruption,
                detail: Some(detail),
            });
        }
    }
    Ok(resultset)
}
