use crate::core::subscriber::Subscriber;
use crate::error::FluxError;

/// One event of the protocol as a value.
///
/// Useful for subscribers that record what they observe.
#[derive(Debug, Clone)]
pub enum Signal<T> {
    /// A value.
    Next(T),
    /// The error terminal.
    Error(FluxError),
    /// The completion terminal.
    Complete,
}

impl<T> Signal<T> {
    /// Returns `true` for `Error` and `Complete`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Signal::Next(_))
    }

    /// Returns the carried value, if any.
    pub fn into_next(self) -> Option<T> {
        match self {
            Signal::Next(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> From<Terminal> for Signal<T> {
    fn from(terminal: Terminal) -> Self {
        match terminal {
            Terminal::Complete => Signal::Complete,
            Terminal::Error(error) => Signal::Error(error),
        }
    }
}

/// A terminal signal waiting to be delivered.
#[derive(Debug, Clone)]
pub(crate) enum Terminal {
    Complete,
    Error(FluxError),
}

impl Terminal {
    pub(crate) fn is_error(&self) -> bool {
        matches!(self, Terminal::Error(_))
    }

    /// Hands the terminal to `subscriber`.
    pub(crate) fn deliver<T, S>(self, subscriber: &mut S)
    where
        S: Subscriber<T> + ?Sized,
    {
        match self {
            Terminal::Complete => subscriber.on_complete(),
            Terminal::Error(error) => subscriber.on_error(error),
        }
    }
}
