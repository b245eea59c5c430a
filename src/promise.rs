//! Defines the `Promise` type, a single-assignment result container.
//!
//! A `Promise` is settled at most once, either with a value ([`Promise::complete`])
//! or with a fault ([`Promise::fault`]), from any thread. Concurrent attempts
//! race on an atomic compare-and-swap and exactly one of them wins; the others
//! get `false` back and their payload is dropped.
//!
//! Settling never runs consumer code on the settling thread. The winner takes a
//! pooled [`Dispatch`](crate::Dispatch) wrapper, binds it to the promise and
//! submits it to the promise's [`Scheduler`]. When the scheduler runs it, every
//! callback registered through [`Promise::on_settled`] is invoked once, in
//! registration order, on the scheduler's thread.

use std::{
    cell::UnsafeCell,
    error::Error,
    fmt, mem,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU8, Ordering},
    },
};

use futures::channel::oneshot;
use log::{debug, trace};

use crate::{
    dispatch::{DispatchPool, Notify},
    scheduler::Scheduler,
    state::{RESOLVING, State},
    wait::Wait,
};

/// The opaque error payload stored by a faulted promise.
pub type Fault = Arc<dyn Error + Send + Sync + 'static>;

type Callback<T> = Box<dyn FnOnce(&Promise<T>) + Send>;

/// Errors reported when reading from or waiting on a promise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromiseError {
    /// [`Promise::result`] was called while the promise was not completed.
    /// Carries the state the promise was in.
    NotCompleted(State),

    /// Every handle to the promise was dropped before its subscribers were
    /// dispatched, so a [`Wait`] future can never receive the outcome.
    Abandoned,
}

impl fmt::Display for PromiseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromiseError::NotCompleted(state) => {
                write!(f, "Promise has no result, it is {state}")
            }
            PromiseError::Abandoned => {
                write!(f, "Promise was dropped before its subscribers were notified")
            }
        }
    }
}

impl Error for PromiseError {}

enum Payload<T> {
    Empty,
    Value(T),
    Fault(Fault),
}

struct Subscribers<T> {
    callbacks: Vec<Callback<T>>,
    // Set once the dispatch has drained `callbacks`. Later registrations go
    // straight to the scheduler.
    dispatched: bool,
}

struct Inner<T> {
    state: AtomicU8,
    payload: UnsafeCell<Payload<T>>,
    subscribers: Mutex<Subscribers<T>>,
    scheduler: Arc<dyn Scheduler>,
    pool: DispatchPool,
}

// SAFETY: `payload` is written exactly once, by the thread that moved `state`
// from pending to `RESOLVING`, before it publishes the terminal state with a
// release store. Readers only touch `payload` after an acquire load observed a
// terminal state, and nothing writes it afterwards, so shared access never
// races with the write. `T: Sync` is required because `result` hands out `&T`
// to any thread.
unsafe impl<T: Send + Sync> Sync for Inner<T> {}

/// A shared, single-assignment slot for the outcome of an asynchronous
/// operation.
///
/// Cloning a `Promise` is cheap and yields another handle to the same slot, so
/// the producer and any number of consumers can each hold one.
///
/// # Example
/// ```
/// # use tickpromise::{Promise, State, TickQueue};
/// #
/// let mut queue = TickQueue::new();
/// let promise = Promise::<&str>::new(queue.handle());
///
/// promise.on_settled(|p| assert_eq!(p.result(), Ok(&"done")));
///
/// let producer = promise.clone();
/// std::thread::spawn(move || producer.complete("done")).join().unwrap();
///
/// assert_eq!(promise.state(), State::Completed);
/// // A second attempt loses and changes nothing.
/// assert!(!promise.complete("again"));
///
/// queue.tick();
/// ```
pub struct Promise<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Send + Sync + 'static> Promise<T> {
    /// Creates a pending promise whose subscribers are notified through
    /// `scheduler`, using the process-wide [`DispatchPool::global`] pool.
    #[must_use]
    pub fn new(scheduler: impl Scheduler + 'static) -> Self {
        Self::with_pool(scheduler, DispatchPool::global().clone())
    }

    /// Creates a pending promise that takes its dispatch wrappers from `pool`.
    #[must_use]
    pub fn with_pool(scheduler: impl Scheduler + 'static, pool: DispatchPool) -> Self {
        Promise {
            inner: Arc::new(Inner {
                state: AtomicU8::new(u8::from(State::Pending)),
                payload: UnsafeCell::new(Payload::Empty),
                subscribers: Mutex::new(Subscribers {
                    callbacks: Vec::new(),
                    dispatched: false,
                }),
                scheduler: Arc::new(scheduler),
                pool,
            }),
        }
    }

    /// Settles the promise with `value`.
    ///
    /// Returns `true` if this call moved the promise out of
    /// [`State::Pending`]. Returns `false` if the promise was already settled,
    /// by any earlier or concurrent `complete` or `fault`; `value` is dropped
    /// in that case and nothing else happens.
    pub fn complete(&self, value: T) -> bool {
        self.settle(State::Completed, Payload::Value(value))
    }

    /// Settles the promise with a fault.
    ///
    /// Accepts any error type as well as `&str` and `String` messages. Returns
    /// `true` on success and `false` if the promise was already settled, with
    /// the same race semantics as [`complete`](Self::complete).
    pub fn fault(&self, error: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> bool {
        let error: Box<dyn Error + Send + Sync + 'static> = error.into();
        self.fault_with(Fault::from(error))
    }

    /// Settles the promise with an already shared [`Fault`].
    ///
    /// The fault is stored as is, so forwarding another promise's
    /// [`error`](Self::error) keeps the same allocation and its concrete error
    /// type stays reachable through `downcast_ref`.
    pub fn fault_with(&self, fault: Fault) -> bool {
        self.settle(State::Faulted, Payload::Fault(fault))
    }

    /// Registers `callback` to run once the promise is settled.
    ///
    /// Callbacks always run on the scheduler's thread, never on the caller's.
    /// Those registered before the settlement is dispatched run together, in
    /// registration order. A callback registered after that dispatch has
    /// already happened is submitted to the scheduler on its own and still runs
    /// exactly once.
    pub fn on_settled(&self, callback: impl FnOnce(&Promise<T>) + Send + 'static) {
        let mut subscribers = self.lock_subscribers();
        if !subscribers.dispatched {
            subscribers.callbacks.push(Box::new(callback));
            return;
        }
        drop(subscribers);

        trace!("late subscriber on a dispatched promise, scheduling it directly");
        let promise = self.clone();
        self.inner
            .scheduler
            .submit(Box::new(move || callback(&promise)));
    }

    /// Returns a future that resolves with a copy of the outcome once the
    /// promise's subscribers are dispatched.
    ///
    /// The future is woken from the scheduler thread, so it only resolves if
    /// the scheduler keeps ticking. If the promise is dropped without ever being
    /// dispatched, the future resolves to a [`PromiseError::Abandoned`] fault.
    pub fn wait(&self) -> Wait<T>
    where
        T: Clone,
    {
        let (sender, receiver) = oneshot::channel();
        self.on_settled(move |promise| {
            let outcome = match promise.outcome() {
                Some(Ok(value)) => Ok(value.clone()),
                Some(Err(fault)) => Err(Arc::clone(fault)),
                None => return,
            };
            let _ = sender.send(outcome);
        });
        Wait::new(receiver)
    }

    fn settle(&self, target: State, payload: Payload<T>) -> bool {
        if self
            .inner
            .state
            .compare_exchange(
                u8::from(State::Pending),
                RESOLVING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            debug!("promise already settled, discarding {target} payload");
            return false;
        }

        // SAFETY: only the thread that won the exchange above reaches this
        // point, and no reader looks at `payload` until the release store below
        // makes the terminal state visible.
        unsafe {
            *self.inner.payload.get() = payload;
        }
        self.inner.state.store(u8::from(target), Ordering::Release);

        let mut dispatch = self.inner.pool.acquire();
        dispatch.bind(Arc::clone(&self.inner) as Arc<dyn Notify>);
        self.inner.scheduler.submit(dispatch);
        true
    }

    fn dispatch(&self) {
        let callbacks = {
            let mut subscribers = self.lock_subscribers();
            subscribers.dispatched = true;
            mem::take(&mut subscribers.callbacks)
        };
        trace!("dispatching {} promise subscribers", callbacks.len());
        for callback in callbacks {
            callback(self);
        }
    }
}

impl<T> Promise<T> {
    /// Snapshot of the current state. Never blocks.
    pub fn state(&self) -> State {
        State::from_raw(self.inner.state.load(Ordering::Acquire))
    }

    /// Returns `true` if the promise has not been settled yet.
    pub fn is_pending(&self) -> bool {
        self.state() == State::Pending
    }

    /// Returns `true` if the promise was settled with a value.
    pub fn is_completed(&self) -> bool {
        self.state() == State::Completed
    }

    /// Returns `true` if the promise was settled with a fault.
    pub fn is_faulted(&self) -> bool {
        self.state() == State::Faulted
    }

    /// Returns the value of a completed promise.
    ///
    /// # Errors
    ///
    /// `PromiseError::NotCompleted` with the current state if the promise is
    /// pending or faulted. Check [`state`](Self::state) or
    /// [`is_completed`](Self::is_completed) first.
    pub fn result(&self) -> Result<&T, PromiseError> {
        match self.payload() {
            Some(Payload::Value(value)) => Ok(value),
            _ => Err(PromiseError::NotCompleted(self.state())),
        }
    }

    /// Returns the fault of a faulted promise, or `None` in any other state.
    pub fn error(&self) -> Option<&Fault> {
        match self.payload() {
            Some(Payload::Fault(fault)) => Some(fault),
            _ => None,
        }
    }

    /// Returns the outcome of a settled promise, or `None` while it is pending.
    pub fn outcome(&self) -> Option<Result<&T, &Fault>> {
        match self.payload()? {
            Payload::Value(value) => Some(Ok(value)),
            Payload::Fault(fault) => Some(Err(fault)),
            Payload::Empty => None,
        }
    }

    fn payload(&self) -> Option<&Payload<T>> {
        if !self.state().is_terminal() {
            return None;
        }
        // SAFETY: the acquire load in `state` observed a terminal state, which
        // is stored only after the single write to `payload` has finished.
        // `payload` is never written again, so a shared borrow tied to `&self`
        // stays valid.
        Some(unsafe { &*self.inner.payload.get() })
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Subscribers<T>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send + Sync + 'static> Notify for Inner<T> {
    fn notify(self: Arc<Self>) {
        Promise { inner: self }.dispatch();
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
