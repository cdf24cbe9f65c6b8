/// The error type for all archive writing and block compression operations.
///
/// Errors are opaque; use [`Error::kind`] to match on the underlying cause.
#[derive(Debug)]
pub struct Error {
    inner: Box<ErrorKind>,
}

impl Error {
    pub(crate) fn io(err: std::io::Error) -> Error {
        Error::from(ErrorKind::IO(err))
    }

    pub(crate) fn invalid_state(msg: &str) -> Error {
        Error::from(ErrorKind::InvalidState {
            msg: msg.to_string(),
        })
    }

    pub(crate) fn invalid_input(msg: &str) -> Error {
        Error::from(ErrorKind::InvalidInput {
            msg: msg.to_string(),
        })
    }

    /// Returns the kind of error that occurred.
    pub fn kind(&self) -> &ErrorKind {
        &self.inner
    }
}

#[derive(Debug)]
pub enum ErrorKind {
    /// The destination does not uphold the byte sink contract.
    InvalidOutput,

    /// An operation was invoked out of sequence.
    InvalidState { msg: String },

    /// The number of body bytes streamed for an entry does not equal the
    /// size declared when the entry was opened.
    EntryBodySizeMismatch { expected: u64, actual: u64 },

    /// A caller-supplied argument was rejected.
    InvalidInput { msg: String },

    /// An I/O failure from the destination, propagated unmodified.
    IO(std::io::Error),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &*self.inner {
            ErrorKind::IO(err) => Some(err),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            ErrorKind::InvalidOutput => {
                write!(f, "Destination does not satisfy the byte sink contract")
            }
            ErrorKind::InvalidState { ref msg } => {
                write!(f, "Invalid state: {}", msg)
            }
            ErrorKind::EntryBodySizeMismatch { expected, actual } => {
                write!(
                    f,
                    "Wrong number of bytes written for entry (expected {}, got {})",
                    expected, actual
                )
            }
            ErrorKind::InvalidInput { ref msg } => {
                write!(f, "Invalid input: {}", msg)
            }
            ErrorKind::IO(ref err) => err.fmt(f),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            inner: Box::new(kind),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::io(err)
    }
}
