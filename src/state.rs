use std::fmt;

/// Observable lifecycle of a [`Promise`](crate::Promise).
///
/// A promise starts out [`State::Pending`] and moves exactly once to one of the
/// two terminal states. There is no transition out of a terminal state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum State {
    /// No result has been published yet.
    #[default]
    Pending = 0,

    /// The promise holds a value.
    Completed = 1,

    /// The promise holds a fault.
    Faulted = 2,
}

// Held only by the thread that won the transition while it writes the payload.
// Never observable through the public API, snapshot reads report it as pending.
pub(crate) const RESOLVING: u8 = 3;

impl State {
    /// Returns `true` for [`State::Completed`] and [`State::Faulted`].
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, State::Pending)
    }

    pub(crate) const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => State::Completed,
            2 => State::Faulted,
            _ => State::Pending,
        }
    }
}

impl From<State> for u8 {
    fn from(state: State) -> Self {
        state as u8
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Pending => write!(f, "pending"),
            State::Completed => write!(f, "completed"),
            State::Faulted => write!(f, "faulted"),
        }
    }
}
