//! Single-assignment promises with scheduler-confined notification.
//!
//! `tickpromise` hands the result of work done on an arbitrary thread to code
//! that must react on one designated, cooperatively ticked thread, such as the
//! main loop of a game or a simulation.
//!
//! - A [`Promise`] is settled exactly once, with a value or a fault, from any
//!   thread. Competing settlements race on an atomic compare-and-swap and only
//!   the winner's payload is ever observable.
//! - Subscribers registered with [`Promise::on_settled`] are never run on the
//!   settling thread. The settlement is handed to a [`Scheduler`], which runs the
//!   subscribers in registration order on its own thread.
//! - The hand-off reuses [`Dispatch`] wrappers from a [`DispatchPool`], so a
//!   settlement does not allocate on the hot path.
//! - [`TickQueue`] is a small ready-made [`Scheduler`] that the host drains once
//!   per cycle with [`TickQueue::tick`].
//!
//! The crate offers no cancellation, timeouts or combinators over several
//! promises; those belong to the code that settles them.

pub mod dispatch;
pub mod promise;
pub mod scheduler;
pub mod state;
pub mod tick;
pub mod wait;

pub use dispatch::{Dispatch, DispatchPool};
pub use promise::{Fault, Promise, PromiseError};
pub use scheduler::{Deferred, Scheduler};
pub use state::State;
pub use tick::{TickHandle, TickQueue};
pub use wait::Wait;
