//! The contract between promises and the cooperative scheduler that notifies
//! their subscribers.
//!
//! A promise never runs consumer code on the thread that settles it. Instead it
//! hands a [`Deferred`] action to a [`Scheduler`], which is expected to run it
//! exactly once, on its own thread, in submission order.

use std::sync::Arc;

/// A unit of work submitted to a [`Scheduler`] for a single deferred run.
///
/// Implemented for every `FnOnce() + Send + 'static` closure, so plain closures
/// can be submitted with `Box::new(|| ...)`. The crate's pooled dispatch
/// wrappers implement it directly, which lets them be submitted without
/// allocating a closure per notification.
pub trait Deferred: Send {
    /// Consumes the action and runs it.
    fn run(self: Box<Self>);
}

impl<F> Deferred for F
where
    F: FnOnce() + Send + 'static,
{
    fn run(self: Box<Self>) {
        (*self)()
    }
}

/// A single-threaded cooperative execution context.
///
/// `submit` may be called from any thread. Implementations must run every
/// submitted action exactly once, on the scheduler's own thread, and must keep
/// actions submitted from the same thread in submission order. How often the
/// queue is drained (once per frame, once per tick) is up to the host.
pub trait Scheduler: Send + Sync {
    /// Enqueues `action` for deferred execution.
    fn submit(&self, action: Box<dyn Deferred>);
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn submit(&self, action: Box<dyn Deferred>) {
        (**self).submit(action);
    }
}

impl<S: Scheduler + ?Sized> Scheduler for &'static S {
    fn submit(&self, action: Box<dyn Deferred>) {
        (**self).submit(action);
    }
}
