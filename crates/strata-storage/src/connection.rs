// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The event loop that owns one connection.
//!
//! A single Tokio task receives every request and every worker completion
//! through one inbox, so the scheduler state is only touched from one place
//! and needs no locks. Workers never mutate state; they post a message and
//! the loop applies it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use strata_core::{Engine, Event, OpenMode, Snapshot, StrataError};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::dispatch::{panic_message, Dispatcher};
use crate::lifecycle::Lifecycle;
use crate::scheduler::{Admission, Call, ConnectionState, Step};

/// Completion action for a request. Always invoked on the event loop.
pub type Completion<T> = Box<dyn FnOnce(Result<T, StrataError>) + Send + 'static>;

/// Continuation produced by a finished shared operation, run on the event loop.
///
/// Returns the error when no completion action claimed it.
pub(crate) type Finish = Box<dyn FnOnce() -> Option<StrataError> + Send + 'static>;

/// Type-erased shared operation against the native handle.
pub(crate) trait Operation<H>: Send {
    /// Run on a worker thread.
    fn run(self: Box<Self>, handle: &H) -> Finish;

    /// Fail without running. Returns the error when no completion action claimed it.
    fn reject(self: Box<Self>, err: StrataError) -> Option<StrataError>;
}

pub(crate) struct Query<F, T> {
    f: F,
    completion: Option<Completion<T>>,
}

impl<F, T> Query<F, T> {
    pub(crate) fn new(f: F, completion: Option<Completion<T>>) -> Self {
        Self { f, completion }
    }
}

impl<H, F, T> Operation<H> for Query<F, T>
where
    F: FnOnce(&H) -> Result<T, StrataError> + Send + 'static,
    T: Send + 'static,
{
    fn run(self: Box<Self>, handle: &H) -> Finish {
        let Query { f, completion } = *self;
        let result = catch_unwind(AssertUnwindSafe(|| f(handle)))
            .unwrap_or_else(|_| Err(StrataError::Dispatch("operation panicked".into())));
        Box::new(move || deliver(completion, result))
    }

    fn reject(self: Box<Self>, err: StrataError) -> Option<StrataError> {
        deliver(self.completion, Err(err))
    }
}

/// Hand a result to its completion action, or give back the error if there is none.
///
/// A panicking completion action is contained and reported as
/// [`StrataError::Dispatch`], so the event loop keeps running.
pub(crate) fn deliver<T>(
    completion: Option<Completion<T>>,
    result: Result<T, StrataError>,
) -> Option<StrataError> {
    let completion = match completion {
        Some(completion) => completion,
        None => return result.err(),
    };
    match catch_unwind(AssertUnwindSafe(move || completion(result))) {
        Ok(()) => None,
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            warn!(%reason, "completion action panicked");
            Some(StrataError::Dispatch(format!(
                "completion action panicked: {reason}"
            )))
        }
    }
}

/// Event broadcast for one connection.
///
/// The receiver created with the channel is parked until the first
/// [`subscribe`](Self::subscribe), so that subscriber also sees events sent
/// before it arrived. The parked receiver does not count as an observer.
pub(crate) struct Events {
    sender: broadcast::Sender<Event>,
    parked: Mutex<Option<broadcast::Receiver<Event>>>,
}

impl Events {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, parked) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            parked: Mutex::new(Some(parked)),
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Event> {
        let mut parked = self.parked.lock().unwrap_or_else(PoisonError::into_inner);
        parked.take().unwrap_or_else(|| self.sender.subscribe())
    }

    /// Broadcast `event`. Returns `false` when no subscriber will see it.
    pub(crate) fn send(&self, event: Event) -> bool {
        let parked = self.parked.lock().unwrap_or_else(PoisonError::into_inner);
        let observers = self.sender.receiver_count() - usize::from(parked.is_some());
        let _ = self.sender.send(event);
        observers > 0
    }
}

/// Work carried by a queued [`Call`].
pub(crate) enum Work<H> {
    Query(Box<dyn Operation<H>>),
    Close(Option<Completion<()>>),
}

impl<H> Work<H> {
    fn into_call(self) -> Call<Work<H>> {
        if matches!(self, Work::Close(_)) {
            Call::exclusive(self)
        } else {
            Call::shared(self)
        }
    }
}

/// Messages accepted by the event loop.
pub(crate) enum Message<E: Engine> {
    /// A new request from a [`Database`](crate::Database) handle.
    Submit(Work<E::Handle>),
    Snapshot(oneshot::Sender<Snapshot>),
    /// The last external handle was dropped.
    Release,
    Opened {
        result: Result<E::Handle, StrataError>,
        completion: Option<Completion<()>>,
    },
    Closed {
        result: Result<Result<(), (E::Handle, StrataError)>, StrataError>,
        completion: Option<Completion<()>>,
    },
    QueryDone(Result<Finish, StrataError>),
    Finalized(Result<(), StrataError>),
}

pub(crate) struct EventLoop<E: Engine> {
    engine: Arc<E>,
    path: Arc<str>,
    mode: OpenMode,
    state: ConnectionState<Work<E::Handle>, E::Handle>,
    lifecycle: Lifecycle,
    dispatcher: Dispatcher,
    tx: mpsc::UnboundedSender<Message<E>>,
    rx: mpsc::UnboundedReceiver<Message<E>>,
    events: Arc<Events>,
}

impl<E: Engine> EventLoop<E> {
    pub(crate) fn new(
        engine: Arc<E>,
        path: Arc<str>,
        mode: OpenMode,
        dispatcher: Dispatcher,
        tx: mpsc::UnboundedSender<Message<E>>,
        rx: mpsc::UnboundedReceiver<Message<E>>,
        events: Arc<Events>,
    ) -> Self {
        Self {
            engine,
            path,
            mode,
            state: ConnectionState::new(),
            lifecycle: Lifecycle::new(),
            dispatcher,
            tx,
            rx,
            events,
        }
    }

    /// Open the connection, then serve messages until finalized.
    pub(crate) async fn run(mut self, completion: Option<Completion<()>>) {
        self.begin_open(completion);

        while let Some(message) = self.rx.recv().await {
            match message {
                Message::Submit(work) => self.submit(work),
                Message::Snapshot(reply) => {
                    let _ = reply.send(self.state.snapshot(self.lifecycle.refs()));
                }
                Message::Release => {
                    debug!(path = %self.path, refs = self.lifecycle.refs(), "external handle released");
                    self.lifecycle.detach();
                }
                Message::Opened { result, completion } => self.after_open(result, completion),
                Message::Closed { result, completion } => self.after_close(result, completion),
                Message::QueryDone(result) => self.after_query(result),
                Message::Finalized(result) => {
                    if let Err(err) = result {
                        warn!(path = %self.path, error = %err, "background close failed");
                    }
                    debug!(path = %self.path, "connection destroyed");
                    return;
                }
            }

            if self.lifecycle.try_finalize() && self.finalize() {
                debug!(path = %self.path, "connection destroyed");
                return;
            }
        }
    }

    /// Bracket a dispatch with the lifecycle guard.
    fn dispatch<T, W, C>(&mut self, work: W, wrap: C)
    where
        T: Send + 'static,
        W: FnOnce() -> T + Send + 'static,
        C: FnOnce(Result<T, StrataError>) -> Message<E> + Send + 'static,
    {
        self.lifecycle.acquire();
        let tx = self.tx.clone();
        self.dispatcher.dispatch(work, move |result| {
            let _ = tx.send(wrap(result));
        });
    }

    fn emit(&self, event: Event) {
        let error = match &event {
            Event::Error(err) => Some(err.to_string()),
            _ => None,
        };
        if !self.events.send(event)
            && let Some(error) = error
        {
            warn!(path = %self.path, %error, "unobserved connection error");
        }
    }

    fn emit_unclaimed(&self, err: Option<StrataError>) {
        if let Some(err) = err {
            self.emit(Event::Error(err));
        }
    }

    fn begin_open(&mut self, completion: Option<Completion<()>>) {
        info!(path = %self.path, mode = ?self.mode, "opening connection");
        self.state.begin_open();
        let engine = Arc::clone(&self.engine);
        let path = Arc::clone(&self.path);
        let mode = self.mode;
        self.dispatch(
            move || engine.open(&path, mode),
            move |result| Message::Opened {
                result: result.and_then(|opened| opened),
                completion,
            },
        );
    }

    fn after_open(
        &mut self,
        result: Result<E::Handle, StrataError>,
        completion: Option<Completion<()>>,
    ) {
        self.lifecycle.release();
        match result {
            Ok(handle) => {
                self.state.opened(Arc::new(handle));
                info!(path = %self.path, queued = self.state.queued(), "connection open");
                self.emit_unclaimed(deliver(completion, Ok(())));
                self.emit(Event::Open);
            }
            Err(err) => {
                self.state.open_failed();
                warn!(path = %self.path, error = %err, "open failed");
                self.emit_unclaimed(deliver(completion, Err(err)));
            }
        }
        self.drain();
    }

    fn submit(&mut self, work: Work<E::Handle>) {
        match self.state.submit(work.into_call()) {
            Admission::Dispatch(call) => self.execute(call),
            Admission::Queued => {
                debug!(
                    path = %self.path,
                    queued = self.state.queued(),
                    pending = self.state.pending(),
                    "request queued"
                );
            }
            Admission::Rejected(call) => self.reject(call, StrataError::closed()),
        }
    }

    fn drain(&mut self) {
        while let Some(step) = self.state.next() {
            match step {
                Step::Dispatch(call) => self.execute(call),
                Step::Reject(call) => self.reject(call, StrataError::closed()),
            }
        }
    }

    fn reject(&self, call: Call<Work<E::Handle>>, err: StrataError) {
        debug!(path = %self.path, exclusive = call.exclusive, "request rejected");
        let unclaimed = match call.work {
            Work::Query(op) => op.reject(err),
            Work::Close(completion) => deliver(completion, Err(err)),
        };
        self.emit_unclaimed(unclaimed);
    }

    fn execute(&mut self, call: Call<Work<E::Handle>>) {
        match call.work {
            Work::Query(op) => self.execute_query(op),
            Work::Close(completion) => self.execute_close(completion),
        }
    }

    fn execute_query(&mut self, op: Box<dyn Operation<E::Handle>>) {
        let Some(handle) = self.state.handle().cloned() else {
            self.state.finish_shared();
            self.emit_unclaimed(op.reject(StrataError::Internal(
                "open connection has no native handle".into(),
            )));
            return;
        };
        debug!(path = %self.path, pending = self.state.pending(), "dispatching query");
        self.dispatch(
            move || {
                let finish = op.run(&handle);
                // The clone must be gone before the loop sees the completion.
                drop(handle);
                finish
            },
            Message::QueryDone,
        );
    }

    fn after_query(&mut self, result: Result<Finish, StrataError>) {
        self.lifecycle.release();
        self.state.finish_shared();
        let unclaimed = match result {
            Ok(finish) => finish(),
            Err(err) => Some(err),
        };
        self.emit_unclaimed(unclaimed);
        self.drain();
    }

    fn execute_close(&mut self, completion: Option<Completion<()>>) {
        let handle = self.state.take_handle().map(Arc::try_unwrap);
        let handle = match handle {
            Some(Ok(handle)) => handle,
            Some(Err(shared)) => {
                self.state.close_failed(shared);
                self.emit_unclaimed(deliver(
                    completion,
                    Err(StrataError::Internal("native handle still borrowed".into())),
                ));
                self.drain();
                return;
            }
            None => {
                self.state.closed();
                self.emit_unclaimed(deliver(
                    completion,
                    Err(StrataError::Internal("open connection has no native handle".into())),
                ));
                self.drain();
                return;
            }
        };

        info!(path = %self.path, "closing connection");
        let engine = Arc::clone(&self.engine);
        self.dispatch(
            move || engine.close(handle),
            move |result| Message::Closed { result, completion },
        );
    }

    fn after_close(
        &mut self,
        result: Result<Result<(), (E::Handle, StrataError)>, StrataError>,
        completion: Option<Completion<()>>,
    ) {
        self.lifecycle.release();
        match result {
            Ok(Ok(())) => {
                self.state.closed();
                info!(path = %self.path, "connection closed");
                self.emit_unclaimed(deliver(completion, Ok(())));
                self.emit(Event::Close);
            }
            Ok(Err((handle, err))) => {
                self.state.close_failed(Arc::new(handle));
                warn!(path = %self.path, error = %err, "close failed");
                self.emit_unclaimed(deliver(completion, Err(err)));
            }
            Err(err) => {
                // The worker died holding the handle; there is nothing left to close.
                self.state.closed();
                warn!(path = %self.path, error = %err, "close aborted");
                self.emit_unclaimed(deliver(completion, Err(err)));
            }
        }
        self.drain();
    }

    /// Release the native handle of a dropped connection.
    ///
    /// Returns `true` when the connection can be destroyed right away, or
    /// `false` when a background close was dispatched and the loop must wait
    /// for [`Message::Finalized`].
    fn finalize(&mut self) -> bool {
        let Some(handle) = self.state.take_handle() else {
            return true;
        };

        let handle = match Arc::try_unwrap(handle) {
            Ok(handle) => handle,
            Err(_) => {
                warn!(path = %self.path, "native handle still borrowed at finalization");
                return true;
            }
        };

        info!(path = %self.path, "connection dropped while open; closing in background");
        let engine = Arc::clone(&self.engine);
        let tx = self.tx.clone();
        self.dispatcher.dispatch(
            move || engine.close(handle).map_err(|(_, err)| err),
            move |result| {
                let _ = tx.send(Message::Finalized(result.and_then(|closed| closed)));
            },
        );
        false
    }
}
