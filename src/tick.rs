//! A minimal cooperative scheduler driven by explicit ticks.
//!
//! `TickQueue` is the thread-confined end of the queue: whoever owns it decides
//! when a processing cycle happens by calling [`TickQueue::tick`], typically once
//! per frame of the host loop. Producers on any thread hold a cloneable
//! [`TickHandle`] and submit actions through the [`Scheduler`] trait.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use futures::{
    FutureExt, StreamExt,
    channel::mpsc::{self, UnboundedReceiver, UnboundedSender},
};
use log::{trace, warn};

use crate::scheduler::{Deferred, Scheduler};

type Action = Box<dyn Deferred>;

/// The submitting side of a [`TickQueue`].
///
/// Cheap to clone and safe to share between threads. Actions submitted after
/// the owning `TickQueue` has been dropped are discarded without running.
#[derive(Clone)]
pub struct TickHandle {
    sender: UnboundedSender<Action>,
    queued: Arc<AtomicUsize>,
}

impl TickHandle {
    /// Number of actions submitted but not yet run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }
}

impl Scheduler for TickHandle {
    fn submit(&self, action: Box<dyn Deferred>) {
        self.queued.fetch_add(1, Ordering::AcqRel);
        if self.sender.unbounded_send(action).is_err() {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            warn!("tick queue is gone, dropping submitted action");
        }
    }
}

/// A single-threaded queue of deferred actions, drained one cycle at a time.
///
/// # Example
/// ```
/// # use tickpromise::{Promise, TickQueue};
/// #
/// let mut queue = TickQueue::new();
/// let promise = Promise::<u32>::new(queue.handle());
///
/// promise.on_settled(|p| println!("settled with {:?}", p.result()));
/// std::thread::scope(|s| {
///     s.spawn(|| promise.complete(42));
/// });
///
/// // The subscriber runs here, on the thread that owns the queue.
/// assert_eq!(queue.tick(), 1);
/// ```
pub struct TickQueue {
    receiver: UnboundedReceiver<Action>,
    handle: TickHandle,
    batch: Vec<Action>,
}

impl TickQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded();
        TickQueue {
            receiver,
            handle: TickHandle {
                sender,
                queued: Arc::new(AtomicUsize::new(0)),
            },
            batch: Vec::new(),
        }
    }

    /// Returns a handle that submits actions to this queue.
    #[must_use]
    pub fn handle(&self) -> TickHandle {
        self.handle.clone()
    }

    /// Number of actions submitted but not yet run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.handle.pending()
    }

    /// Runs one processing cycle and returns how many actions ran.
    ///
    /// Only actions that were queued when the tick started are run, in the order
    /// they were submitted. Anything submitted while the tick is in progress,
    /// including by the actions themselves, waits for the next tick.
    pub fn tick(&mut self) -> usize {
        // Collect the cycle's batch before running anything, so actions submitted
        // by the batch itself cannot join it. The budget only caps the drain
        // against producers that keep submitting while it happens.
        let budget = self.handle.pending();
        while self.batch.len() < budget {
            let Some(Some(action)) = self.receiver.next().now_or_never() else {
                break;
            };
            self.handle.queued.fetch_sub(1, Ordering::AcqRel);
            self.batch.push(action);
        }

        let ran = self.batch.len();
        for action in self.batch.drain(..) {
            action.run();
        }
        if ran > 0 {
            trace!("tick ran {ran} deferred actions");
        }
        ran
    }
}

impl Default for TickQueue {
    fn default() -> Self {
        Self::new()
    }
}
