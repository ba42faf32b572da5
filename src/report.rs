//! Raw, allocation-free output for code running in a freshly cloned context.
//!
//! Nothing in here buffers, locks, or allocates: a child created with `clone(2)` cannot rely on
//! `std::io::stdout()` (its lock and buffer may be mid-use in the parent, or share the parent's
//! thread-local state). Every line is assembled in a fixed stack buffer and handed to `write(2)`.

#[cfg(test)]
use alloc_counter::no_alloc;
use std::ffi::{c_int, c_void};

/// Maximum number of decimal digits in an `i64`, plus its sign.
const DECIMAL_LEN: usize = 20;

/// Size of the per-line stack scratch used by [`Reporter::value`].
pub const LINE_LEN: usize = 256;

/// Format a message (given in `format_args!` style) on the stack and write it to a reporter.
///
/// This cannot allocate: output is truncated to a 512-byte stack buffer.
///
/// ```ignore
/// report_fd!(reporter, "open uid_map: {}", err)
/// ```
macro_rules! report_fd {
    ($reporter:expr, $($arg:tt)*) => {
        {
            use std::io::Write as _;
            let mut buffer = [0u8; 512];
            let mut cursor = std::io::Cursor::new(&mut buffer[..]);
            let _ = writeln!(cursor, $($arg)*);
            let len = cursor.position() as usize;
            $reporter.raw(&buffer[..len]);
        }
    };
}
pub(crate) use report_fd;

/// The decimal representation of an integer, held in a fixed-size array.
#[derive(Clone, Copy)]
pub struct Decimal {
    digits: [u8; DECIMAL_LEN],
    start: usize,
}

impl Decimal {
    /// Format `value` without allocating.
    ///
    /// The magnitude is taken as unsigned before extracting digits, so `i64::MIN` needs no
    /// special case.
    #[cfg_attr(test, no_alloc)]
    pub fn new(value: i64) -> Decimal {
        let mut digits = [0u8; DECIMAL_LEN];
        let mut start = DECIMAL_LEN;

        if value == 0 {
            start -= 1;
            digits[start] = b'0';
            return Decimal { digits, start };
        }

        let mut magnitude: u64 = value.unsigned_abs();
        while magnitude > 0 {
            start -= 1;
            digits[start] = b'0' + (magnitude % 10) as u8;
            magnitude /= 10;
        }
        if value < 0 {
            start -= 1;
            digits[start] = b'-';
        }

        Decimal { digits, start }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.digits[self.start..]
    }
}

impl std::fmt::Display for Decimal {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        // Only ASCII digits and '-' are ever stored.
        f.write_str(std::str::from_utf8(self.as_bytes()).map_err(|_| std::fmt::Error)?)
    }
}

/// Assemble `label`, the decimal form of `value`, and a newline into `out`, returning the number
/// of bytes used. Labels too long to fit alongside the number are truncated.
#[cfg_attr(test, no_alloc)]
pub fn compose_line(label: &[u8], value: i64, out: &mut [u8; LINE_LEN]) -> usize {
    let decimal = Decimal::new(value);
    let digits = decimal.as_bytes();

    let label_len = label.len().min(LINE_LEN - digits.len() - 1);
    out[..label_len].copy_from_slice(&label[..label_len]);

    let mut len = label_len;
    out[len..len + digits.len()].copy_from_slice(digits);
    len += digits.len();
    out[len] = b'\n';
    len + 1
}

/// Writes labelled integers to a raw file descriptor.
///
/// A `Reporter` is just an fd; copying it into a child's argument block is free. It never closes
/// the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reporter {
    fd: c_int,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::stdout()
    }
}

impl Reporter {
    pub const fn new(fd: c_int) -> Reporter {
        Reporter { fd }
    }

    pub const fn stdout() -> Reporter {
        Reporter::new(libc::STDOUT_FILENO)
    }

    pub fn fd(&self) -> c_int {
        self.fd
    }

    /// Emit `label` immediately followed by `value` in decimal and a newline, e.g.
    /// `getpid()  = 1234`.
    pub fn value(&self, label: &str, value: i64) {
        let mut line = [0u8; LINE_LEN];
        let len = compose_line(label.as_bytes(), value, &mut line);
        self.raw(&line[..len]);
    }

    /// Emit `msg` followed by a newline, in a single write when it fits in a line buffer.
    pub fn line(&self, msg: &str) {
        let msg = msg.as_bytes();
        if msg.len() >= LINE_LEN {
            self.raw(msg);
            self.raw(b"\n");
            return;
        }
        let mut line = [0u8; LINE_LEN];
        line[..msg.len()].copy_from_slice(msg);
        line[msg.len()] = b'\n';
        self.raw(&line[..=msg.len()]);
    }

    /// Write bytes as-is. Best effort: short writes are continued, and the first error drops the
    /// remainder.
    pub fn raw(&self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            let written =
                unsafe { libc::write(self.fd, bytes.as_ptr() as *const c_void, bytes.len()) };
            if written <= 0 {
                return;
            }
            bytes = &bytes[written as usize..];
        }
    }
}
