use std::ffi::{c_int, CStr};

/// Result type for our error type.
pub type Result<T> = std::result::Result<T, Error>;

/// An error which records the failing operation (cause), what we were doing at the time
/// (context), and the `errno` left behind, all without allocating.
///
/// Because it never touches the heap, an [`Error`] can be built and printed from inside a
/// freshly cloned context (see [`crate::report::Reporter`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error {
    pub errno: c_int,
    pub cause: Option<&'static str>,
    pub context: Option<&'static str>,
}

impl Error {
    /// Create an empty error, with no errno.
    pub const fn new() -> Error {
        Error::from_errno(0)
    }

    /// Create an error carrying a specific errno.
    pub const fn from_errno(errno: c_int) -> Error {
        Error {
            errno,
            cause: None,
            context: None,
        }
    }

    /// Create an error from the calling context's last OS error.
    pub fn last_os_error() -> Error {
        Error::from_errno(unsafe { *libc::__errno_location() })
    }

    /// Replace the cause of an error.
    pub fn cause(self, msg: &'static str) -> Error {
        Error {
            cause: Some(msg),
            ..self
        }
    }

    /// Replace the context of an error.
    pub fn context(self, msg: &'static str) -> Error {
        Error {
            context: Some(msg),
            ..self
        }
    }

    /// Does this error carry the given errno?
    pub fn is_errno(&self, errno: c_int) -> bool {
        self.errno == errno
    }
}

impl Default for Error {
    fn default() -> Self {
        Self::new()
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::from_errno(e.raw_os_error().unwrap_or(0))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if let Some(context) = self.context {
            write!(f, "{context}: ")?;
        }
        if let Some(cause) = self.cause {
            f.write_str(cause)?;
            if self.errno == 0 {
                return Ok(());
            }
            f.write_str(": ")?;
        }

        // strerror(3) may hand back a shared buffer; copy into our own instead.
        let mut buf = [0u8; 128];
        let rc = unsafe { libc::strerror_r(self.errno, buf.as_mut_ptr().cast(), buf.len()) };
        let msg = match CStr::from_bytes_until_nul(&buf) {
            Ok(msg) if rc == 0 => msg.to_str().unwrap_or("unknown error"),
            _ => "unknown error",
        };
        write!(f, "{} (errno {})", msg, self.errno)
    }
}

impl std::error::Error for Error {}

// Define a macro, bail!, which returns an error with no errno and a custom message.
macro_rules! bail {
    ($msg:expr) => {
        return Err($crate::error::Error::new().cause($msg))
    };
}
pub(crate) use bail;

// Define a macro, bail_errno!, which returns an error with the last OS error:
//
// - `bail_errno!()` returns an error with the last OS error.
// - `bail_errno!(msg)` returns an error with the last OS error and a cause.
macro_rules! bail_errno {
    () => {
        return Err($crate::error::Error::last_os_error())
    };
    ($msg:expr) => {
        return Err($crate::error::Error::last_os_error().cause($msg))
    };
}
pub(crate) use bail_errno;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_cause_and_context() {
        let err = Error::from_errno(libc::EPERM)
            .cause("write uid_map")
            .context("mapping identity");
        assert_eq!(
            err.to_string(),
            "mapping identity: write uid_map: Operation not permitted (errno 1)"
        );
    }

    #[test]
    fn display_without_errno_omits_strerror() {
        let err = Error::new().cause("share_signal_handlers requires share_memory");
        assert_eq!(
            err.to_string(),
            "share_signal_handlers requires share_memory"
        );
    }

    #[test]
    fn display_bare_errno() {
        let err = Error::from_errno(libc::ENOENT);
        assert_eq!(err.to_string(), "No such file or directory (errno 2)");
        assert!(err.is_errno(libc::ENOENT));
    }

    #[test]
    fn from_io_error_keeps_errno() {
        let io = std::io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(Error::from(io).errno, libc::EACCES);
    }
}
