//! Pooled wrappers that carry a settled promise's notification to the
//! scheduler.
//!
//! Every successful `complete`/`fault` needs one deferred action to notify the
//! promise's subscribers. Rather than allocating a fresh action per settlement,
//! a [`Dispatch`] is taken from a [`DispatchPool`], bound to the promise,
//! submitted to the scheduler, and put back on the free list once it has run.

use std::{
    fmt,
    sync::{
        Arc, Mutex, OnceLock, PoisonError, Weak,
        atomic::{AtomicUsize, Ordering},
    },
};

use log::trace;

use crate::scheduler::Deferred;

static GLOBAL_POOL: OnceLock<DispatchPool> = OnceLock::new();

/// Something a [`Dispatch`] can notify once it runs on the scheduler thread.
pub(crate) trait Notify: Send + Sync {
    fn notify(self: Arc<Self>);
}

struct Shared {
    free: Mutex<Vec<Box<Dispatch>>>,
    created: AtomicUsize,
}

/// A reusable deferred action that notifies exactly one promise per run.
///
/// Obtained from [`DispatchPool::acquire`]. When run by a scheduler it notifies
/// the promise it is bound to (if any), unbinds, and returns itself to the pool
/// it came from. If that pool no longer exists the wrapper is simply dropped.
pub struct Dispatch {
    target: Option<Arc<dyn Notify>>,
    home: Weak<Shared>,
}

impl Dispatch {
    pub(crate) fn bind(&mut self, target: Arc<dyn Notify>) {
        self.target = Some(target);
    }

    /// Returns `true` while the wrapper is bound to a promise awaiting dispatch.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.target.is_some()
    }
}

impl Deferred for Dispatch {
    fn run(mut self: Box<Self>) {
        if let Some(target) = self.target.take() {
            target.notify();
        }
        if let Some(shared) = self.home.upgrade() {
            DispatchPool { shared }.release(self);
        }
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// A thread-safe free list of [`Dispatch`] wrappers.
///
/// Cloning the pool yields another handle to the same free list. The pool has
/// no upper bound: it grows to the largest number of notifications that were
/// ever in flight at once and stays there.
#[derive(Clone)]
pub struct DispatchPool {
    shared: Arc<Shared>,
}

impl DispatchPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a pool with `capacity` wrappers already on the free list.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let pool = DispatchPool {
            shared: Arc::new(Shared {
                free: Mutex::new(Vec::with_capacity(capacity)),
                created: AtomicUsize::new(0),
            }),
        };
        for _ in 0..capacity {
            let dispatch = pool.create();
            pool.release(dispatch);
        }
        pool
    }

    /// The process-wide pool used by promises that were not given one.
    pub fn global() -> &'static DispatchPool {
        GLOBAL_POOL.get_or_init(DispatchPool::new)
    }

    /// Takes an unbound wrapper from the free list, or builds a new one if the
    /// list is empty.
    #[must_use]
    pub fn acquire(&self) -> Box<Dispatch> {
        let reused = self
            .shared
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        reused.unwrap_or_else(|| self.create())
    }

    /// Unbinds `dispatch` and puts it on this pool's free list.
    ///
    /// Wrappers release themselves after running, so this only needs to be
    /// called for wrappers that were acquired but never submitted.
    pub fn release(&self, mut dispatch: Box<Dispatch>) {
        dispatch.target = None;
        if !std::ptr::eq(dispatch.home.as_ptr(), Arc::as_ptr(&self.shared)) {
            dispatch.home = Arc::downgrade(&self.shared);
        }
        self.shared
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(dispatch);
    }

    /// Total number of wrappers this pool has ever built.
    #[must_use]
    pub fn created(&self) -> usize {
        self.shared.created.load(Ordering::Relaxed)
    }

    /// Number of wrappers currently waiting on the free list.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.shared
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn create(&self) -> Box<Dispatch> {
        let created = self.shared.created.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("dispatch pool grew to {created} wrappers");
        Box::new(Dispatch {
            target: None,
            home: Arc::downgrade(&self.shared),
        })
    }
}

impl Default for DispatchPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DispatchPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchPool")
            .field("created", &self.created())
            .field("idle", &self.idle())
            .finish()
    }
}
