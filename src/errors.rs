use std::error;
use std::fmt;

/// The ways a tree operation can fail.
///
/// Every error is reported synchronously by the operation that hit it;
/// nothing is retried internally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The path is not a valid absolute path.
    InvalidArgument,
    /// An intermediate or final component of the path does not exist.
    NotFound,
    /// The name to create or move to is already taken.
    AlreadyExists,
    /// The directory to remove still has children.
    NotEmpty,
    /// The operation is forbidden on the root directory.
    Busy,
    /// The move target lies inside the subtree being moved.
    InvalidMove,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Error::InvalidArgument => "invalid path",
            Error::NotFound => "no such directory",
            Error::AlreadyExists => "directory already exists",
            Error::NotEmpty => "directory not empty",
            Error::Busy => "operation not permitted on the root directory",
            Error::InvalidMove => "cannot move a directory into its own subtree",
        })
    }
}

impl error::Error for Error {}
