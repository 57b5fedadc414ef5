// mapping engine results onto the negative-errno return convention.

use h2o::error::Error;

pub use libc::{EFAULT, EINTR, ENOSPC};

/// Error number corresponding to an engine error
pub fn errno(error: &Error) -> libc::c_int {
    match error {
        Error::Interrupted(_) => EINTR,
        Error::Fault(_) => EFAULT,
        Error::CapacityExceeded(_) => ENOSPC,
    }
}

/// Convert the result of a read or write to what a read or write system call returns
///
/// A byte count on success, the negated [`errno`] on failure, except that a write which
/// committed some bytes before running out of capacity reports those bytes like a short write.
pub fn to_ssize(result: Result<usize, Error>) -> isize {
    match result {
        Ok(n) => n as isize,
        Err(Error::CapacityExceeded(e)) if e.committed > 0 => e.committed as isize,
        Err(e) => -(errno(&e) as isize),
    }
}
