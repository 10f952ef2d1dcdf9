//! Serializes every write on one dedicated connection.
//!
//! SQLite allows a single writer at a time; funnelling writes through one
//! thread avoids `SQLITE_BUSY` between pooled connections. Each job runs in
//! its own transaction.

use std::any::Any;
use std::thread;

use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use ledgerline_core::{Error, Result};
use log::{debug, error};
use tokio::sync::{mpsc, oneshot};

use super::{get_connection, DbPool};
use crate::errors::StorageError;

type BoxedValue = Box<dyn Any + Send>;
type Job = Box<dyn FnOnce(&mut SqliteConnection) -> Result<BoxedValue> + Send>;

struct WriteRequest {
    job: Job,
    reply: oneshot::Sender<Result<BoxedValue>>,
}

const WRITE_QUEUE_CAPACITY: usize = 256;

/// Job failure or diesel failure inside the write transaction.
enum TxError {
    Job(Error),
    Diesel(diesel::result::Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        TxError::Diesel(err)
    }
}

impl From<TxError> for Error {
    fn from(err: TxError) -> Self {
        match err {
            TxError::Job(err) => err,
            TxError::Diesel(err) => StorageError::from(err).into(),
        }
    }
}

#[derive(Clone)]
pub struct WriteHandle {
    sender: mpsc::Sender<WriteRequest>,
}

impl WriteHandle {
    /// Runs `job` on the writer connection inside a transaction.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            let value = job(conn)?;
            Ok(Box::new(value) as BoxedValue)
        });
        self.sender
            .send(WriteRequest { job, reply })
            .await
            .map_err(|_| StorageError::WriterUnavailable("writer stopped".to_string()))?;

        let value = response
            .await
            .map_err(|_| StorageError::WriterUnavailable("writer dropped job".to_string()))??;
        value
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| Error::storage("write job returned an unexpected type"))
    }
}

/// Starts the writer thread. It exits once every handle is dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (sender, mut receiver) = mpsc::channel::<WriteRequest>(WRITE_QUEUE_CAPACITY);

    let spawned = thread::Builder::new()
        .name("ledgerline-db-writer".to_string())
        .spawn(move || {
            let mut pooled = match get_connection(&pool) {
                Ok(conn) => conn,
                Err(err) => {
                    error!("[Storage] Writer could not acquire a connection: {}", err);
                    return;
                }
            };
            let conn: &mut SqliteConnection = &mut pooled;
            while let Some(WriteRequest { job, reply }) = receiver.blocking_recv() {
                let outcome = conn
                    .transaction::<BoxedValue, TxError, _>(|tx| job(tx).map_err(TxError::Job))
                    .map_err(Error::from);
                let _ = reply.send(outcome);
            }
            debug!("[Storage] Writer stopped");
        });
    if let Err(err) = spawned {
        error!("[Storage] Failed to spawn writer thread: {}", err);
    }

    WriteHandle { sender }
}
