#[cfg(test)]
use alloc_counter::no_alloc;
use c_str_macro::c_str;
use std::ffi::{c_char, c_void};
use std::io::Write;

use crate::error::{bail_errno, Error, Result};
use crate::report::{report_fd, Reporter};

/// Longest record we render: three `u32`s, two spaces and a newline.
pub const RECORD_LEN: usize = 3 * 10 + 3;

/// Map the range of IDs `[inner_id, inner_id + qty)` inside a user namespace to
/// `[outer_id, outer_id + qty)` in its parent.
#[derive(Clone, Debug, Copy, Eq, PartialEq)]
pub struct Mapping {
    pub inner_id: u32,
    pub outer_id: u32,
    pub qty: u32,
}

impl Mapping {
    /// The namespace's root is the parent namespace's root.
    pub const ROOT_TO_ROOT: Mapping = Mapping {
        inner_id: 0,
        outer_id: 0,
        qty: 1,
    };

    /// Render as a `uid_map` record (`"inner outer qty\n"`) into `buf`, without allocating.
    /// Returns the number of bytes used.
    #[cfg_attr(test, no_alloc)]
    pub fn write_record(&self, buf: &mut [u8; RECORD_LEN]) -> usize {
        let mut cursor = std::io::Cursor::new(&mut buf[..]);
        // Cannot fail: RECORD_LEN fits the widest record.
        let _ = writeln!(cursor, "{} {} {}", self.inner_id, self.outer_id, self.qty);
        cursor.position() as usize
    }
}

/// What happened when a context tried to map its own identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapOutcome {
    /// The control file could not be opened; nothing was written.
    OpenFailed(Error),
    /// The control file was opened but the record was refused.
    WriteFailed(Error),
    /// The record was accepted. `elevated` is whether `setuid(0)` then succeeded.
    Mapped { elevated: bool },
}

/// Write one record to a `uid_map`-style file in a single `write(2)`, as the kernel requires.
#[cfg_attr(test, no_alloc)]
fn write_mapping(path: *const c_char, mapping: Mapping) -> std::result::Result<(), MapOutcome> {
    let fd = unsafe { libc::open(path, libc::O_RDWR | libc::O_CLOEXEC) };
    if fd < 0 {
        return Err(MapOutcome::OpenFailed(
            Error::last_os_error().cause("open uid_map"),
        ));
    }

    let mut record = [0u8; RECORD_LEN];
    let len = mapping.write_record(&mut record);
    let written = unsafe { libc::write(fd, record.as_ptr() as *const c_void, len) };
    let result = if written < 0 {
        Err(MapOutcome::WriteFailed(
            Error::last_os_error().cause("write uid_map"),
        ))
    } else if written as usize != len {
        Err(MapOutcome::WriteFailed(
            Error::new().cause("short write to uid_map"),
        ))
    } else {
        Ok(())
    };

    unsafe { libc::close(fd) };
    result
}

/// Become uid 0 in the current user namespace.
#[cfg_attr(test, no_alloc)]
fn become_root() -> Result<()> {
    let 0 = (unsafe { libc::setuid(0) }) else {
        bail_errno!("setuid(0)");
    };
    Ok(())
}

/// Map this context's own user namespace with `mapping`, then try to become root in it.
///
/// Must run inside the namespace (the file is `/proc/self/uid_map`). Every failure is reported
/// through `reporter` and ends the attempt; none of them are fatal to the caller. Safe to call
/// from a freshly cloned child: nothing here allocates.
pub fn map_self(reporter: Reporter, mapping: Mapping) -> MapOutcome {
    if let Err(outcome) = write_mapping(c_str!("/proc/self/uid_map").as_ptr(), mapping) {
        if let MapOutcome::OpenFailed(err) | MapOutcome::WriteFailed(err) = outcome {
            report_fd!(reporter, ": {}", err);
        }
        return outcome;
    }

    let elevated = match become_root() {
        Ok(()) => {
            reporter.value(": setuid() = ", 0);
            true
        }
        Err(err) => {
            reporter.value(": setuid() = ", -1);
            report_fd!(reporter, ": {}", err);
            false
        }
    };
    MapOutcome::Mapped { elevated }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::fd::FromRawFd;

    fn record(mapping: Mapping) -> String {
        let mut buf = [0u8; RECORD_LEN];
        let len = mapping.write_record(&mut buf);
        String::from_utf8(buf[..len].to_vec()).unwrap()
    }

    #[test]
    fn root_to_root_record() {
        assert_eq!(record(Mapping::ROOT_TO_ROOT), "0 0 1\n");
    }

    #[test]
    fn widest_record_fits() {
        let mapping = Mapping {
            inner_id: u32::MAX,
            outer_id: u32::MAX,
            qty: u32::MAX,
        };
        assert_eq!(record(mapping), "4294967295 4294967295 4294967295\n");
    }

    #[test]
    fn missing_control_file_is_an_open_failure() {
        let outcome = write_mapping(
            c_str!("/nonexistent/uid_map").as_ptr(),
            Mapping::ROOT_TO_ROOT,
        );
        match outcome {
            Err(MapOutcome::OpenFailed(err)) => assert_eq!(err.errno, libc::ENOENT),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn initial_namespace_refuses_a_second_mapping() {
        // The initial user namespace's map has been written since boot, so any write is refused.
        let outcome = write_mapping(c_str!("/proc/self/uid_map").as_ptr(), Mapping::ROOT_TO_ROOT);
        assert!(
            matches!(
                outcome,
                Err(MapOutcome::WriteFailed(_)) | Err(MapOutcome::OpenFailed(_))
            ),
            "{outcome:?}"
        );
    }

    #[test]
    fn refused_mapping_is_reported_and_not_elevated() {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let [read_fd, write_fd] = fds;

        // We are already in a mapped namespace, so the record is refused before setuid(0).
        let outcome = map_self(Reporter::new(write_fd), Mapping::ROOT_TO_ROOT);
        unsafe { libc::close(write_fd) };

        let mut output = String::new();
        let mut read_end = unsafe { std::fs::File::from_raw_fd(read_fd) };
        read_end.read_to_string(&mut output).unwrap();

        assert!(
            matches!(outcome, MapOutcome::OpenFailed(_) | MapOutcome::WriteFailed(_)),
            "{outcome:?}"
        );
        assert!(output.starts_with(": "), "{output}");
        assert!(output.contains("uid_map"), "{output}");
        assert!(!output.contains("setuid()"), "{output}");
    }
}
