// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caller-facing connection handle.
//!
//! A [`Database`] is a cheap, cloneable handle to one connection's event loop.
//! Construction starts the open immediately; every other request goes through
//! the loop's scheduler. Dropping the last clone releases the external
//! reference, after which the connection is torn down once nothing is in
//! flight (closing the native handle in the background if it is still open).

use std::sync::Arc;

use strata_config::model::DatabaseConfig;
use strata_core::{Engine, Event, OpenMode, Snapshot, StrataError};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::warn;

use crate::connection::{deliver, Completion, EventLoop, Events, Message, Operation, Query, Work};
use crate::dispatch::Dispatcher;
use crate::engine::{SqliteEngine, SqliteHandle};

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Builder for a [`Database`].
pub struct DatabaseBuilder<E: Engine = SqliteEngine> {
    path: String,
    mode: OpenMode,
    engine: Arc<E>,
    dispatcher: Option<Dispatcher>,
    event_capacity: usize,
}

impl DatabaseBuilder<SqliteEngine> {
    /// Builder for a SQLite database at `path` with the default mode.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: OpenMode::default(),
            engine: Arc::new(SqliteEngine),
            dispatcher: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Builder populated from the `[database]` configuration section.
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self::new(config.path.clone())
            .mode(config.open_mode())
            .event_capacity(config.event_capacity)
    }
}

impl<E: Engine> DatabaseBuilder<E> {
    /// Swap the engine.
    pub fn engine<F: Engine>(self, engine: F) -> DatabaseBuilder<F> {
        DatabaseBuilder {
            path: self.path,
            mode: self.mode,
            engine: Arc::new(engine),
            dispatcher: self.dispatcher,
            event_capacity: self.event_capacity,
        }
    }

    pub fn mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    /// Run the connection's work on an existing dispatcher.
    pub fn dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Start opening. The outcome is reported through [`Event`]s.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime and no dispatcher was set.
    pub fn open(self) -> Database<E> {
        self.spawn(None)
    }

    /// Start opening and report the outcome to `completion`.
    ///
    /// An `Open` event is still emitted on success.
    pub fn open_with<C>(self, completion: C) -> Database<E>
    where
        C: FnOnce(Result<(), StrataError>) + Send + 'static,
    {
        self.spawn(Some(Box::new(completion)))
    }

    /// Open and wait for the outcome.
    pub async fn connect(self) -> Result<Database<E>, StrataError> {
        let (tx, rx) = oneshot::channel();
        let db = self.open_with(move |result| {
            let _ = tx.send(result);
        });
        match rx.await {
            Ok(Ok(())) => Ok(db),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(StrataError::Dispatch(
                "event loop stopped before the open completed".into(),
            )),
        }
    }

    fn spawn(self, completion: Option<Completion<()>>) -> Database<E> {
        let dispatcher = self.dispatcher.unwrap_or_else(Dispatcher::current);
        let path: Arc<str> = Arc::from(self.path);
        let (tx, rx) = mpsc::unbounded_channel();
        let events = Arc::new(Events::new(self.event_capacity));

        let event_loop = EventLoop::new(
            self.engine,
            Arc::clone(&path),
            self.mode,
            dispatcher.clone(),
            tx.clone(),
            rx,
            Arc::clone(&events),
        );
        dispatcher.spawn(event_loop.run(completion));

        Database {
            inner: Arc::new(Inner {
                filename: path,
                mode: self.mode,
                tx,
                events,
                dispatcher,
            }),
        }
    }
}

struct Inner<E: Engine> {
    filename: Arc<str>,
    mode: OpenMode,
    tx: mpsc::UnboundedSender<Message<E>>,
    events: Arc<Events>,
    dispatcher: Dispatcher,
}

impl<E: Engine> Drop for Inner<E> {
    fn drop(&mut self) {
        let _ = self.tx.send(Message::Release);
    }
}

/// Handle to a connection scheduled on its own event loop.
pub struct Database<E: Engine = SqliteEngine> {
    inner: Arc<Inner<E>>,
}

impl<E: Engine> Clone for Database<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Engine> std::fmt::Debug for Database<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("filename", &self.inner.filename)
            .field("mode", &self.inner.mode)
            .finish_non_exhaustive()
    }
}

impl Database<SqliteEngine> {
    pub fn builder(path: impl Into<String>) -> DatabaseBuilder<SqliteEngine> {
        DatabaseBuilder::new(path)
    }

    /// Start opening a SQLite database; the outcome arrives as an event.
    pub fn open(path: impl Into<String>, mode: OpenMode) -> Self {
        Self::builder(path).mode(mode).open()
    }

    /// Start opening a SQLite database and report the outcome to `completion`.
    pub fn open_with<C>(path: impl Into<String>, mode: OpenMode, completion: C) -> Self
    where
        C: FnOnce(Result<(), StrataError>) + Send + 'static,
    {
        Self::builder(path).mode(mode).open_with(completion)
    }

    /// Open a SQLite database and wait until it is usable.
    pub async fn connect(path: impl Into<String>, mode: OpenMode) -> Result<Self, StrataError> {
        Self::builder(path).mode(mode).connect().await
    }

    /// Run statements that return no rows.
    pub async fn execute_batch(&self, sql: impl Into<String>) -> Result<(), StrataError> {
        let sql = sql.into();
        self.call(move |handle: &SqliteHandle| handle.execute_batch(&sql))
            .await
    }
}

impl<E: Engine> Database<E> {
    /// Path the connection was opened with.
    pub fn filename(&self) -> &str {
        &self.inner.filename
    }

    pub fn mode(&self) -> OpenMode {
        self.inner.mode
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Subscribe to connection events.
    ///
    /// The first subscriber receives every event since construction, including
    /// an `Open` that may already have happened; later subscribers only see
    /// events from the moment they subscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    fn submit(&self, work: Work<E::Handle>) {
        if let Err(mpsc::error::SendError(message)) = self.inner.tx.send(Message::Submit(work)) {
            let err = StrataError::Dispatch("event loop is not running".into());
            let unclaimed = match message {
                Message::Submit(Work::Query(op)) => op.reject(err),
                Message::Submit(Work::Close(completion)) => deliver(completion, Err(err)),
                _ => None,
            };
            if let Some(err) = unclaimed {
                let error = err.to_string();
                if !self.inner.events.send(Event::Error(err)) {
                    warn!(path = %self.inner.filename, %error, "unobserved connection error");
                }
            }
        }
    }

    /// Queue a shared operation; `completion` receives its result on the event loop.
    pub fn call_with<F, T, C>(&self, f: F, completion: C)
    where
        F: FnOnce(&E::Handle) -> Result<T, StrataError> + Send + 'static,
        T: Send + 'static,
        C: FnOnce(Result<T, StrataError>) + Send + 'static,
    {
        let completion: Completion<T> = Box::new(completion);
        let op: Box<dyn Operation<E::Handle>> = Box::new(Query::new(f, Some(completion)));
        self.submit(Work::Query(op));
    }

    /// Queue a shared operation whose failure is reported as an `Error` event.
    pub fn call_detached<F>(&self, f: F)
    where
        F: FnOnce(&E::Handle) -> Result<(), StrataError> + Send + 'static,
    {
        let op: Box<dyn Operation<E::Handle>> = Box::new(Query::<F, ()>::new(f, None));
        self.submit(Work::Query(op));
    }

    /// Run a shared operation against the native handle and wait for its result.
    pub async fn call<F, T>(&self, f: F) -> Result<T, StrataError>
    where
        F: FnOnce(&E::Handle) -> Result<T, StrataError> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.call_with(f, move |result| {
            let _ = tx.send(result);
        });
        rx.await
            .unwrap_or_else(|_| Err(StrataError::Dispatch("operation was dropped".into())))
    }

    /// Queue a close; `completion` receives the outcome.
    pub fn close_with<C>(&self, completion: C)
    where
        C: FnOnce(Result<(), StrataError>) + Send + 'static,
    {
        self.submit(Work::Close(Some(Box::new(completion))));
    }

    /// Queue a close whose outcome is reported only through events.
    pub fn request_close(&self) {
        self.submit(Work::Close(None));
    }

    /// Close the connection and wait for the outcome.
    pub async fn close(&self) -> Result<(), StrataError> {
        let (tx, rx) = oneshot::channel();
        self.close_with(move |result| {
            let _ = tx.send(result);
        });
        rx.await
            .unwrap_or_else(|_| Err(StrataError::Dispatch("close was dropped".into())))
    }

    /// Current scheduler state.
    pub async fn snapshot(&self) -> Result<Snapshot, StrataError> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .tx
            .send(Message::Snapshot(tx))
            .map_err(|_| StrataError::Dispatch("event loop is not running".into()))?;
        rx.await
            .map_err(|_| StrataError::Dispatch("event loop is not running".into()))
    }
}
