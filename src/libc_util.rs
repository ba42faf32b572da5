#[cfg(test)]
use alloc_counter::no_alloc;
use std::ffi::{c_int, c_void};
use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use crate::error::{bail, Error, Result};

/// Get the topmost valid stack pointer inside a segment of stack memory.
pub fn get_topmost_stack_pointer(stack: &mut [u8]) -> *mut c_void {
    let top_addr = stack.as_mut_ptr_range().end as usize;

    // Align downwards, multiple of 16.
    (top_addr & !0xf) as *mut c_void
}

/// The thread ID of the caller. Unlike `getpid()`, this differs between threads of one process.
pub fn gettid() -> libc::pid_t {
    unsafe { libc::syscall(libc::SYS_gettid) as libc::pid_t }
}

/// Block the calling context for `duration` using `nanosleep(2)` directly, resuming after signal
/// interruptions.
///
/// Doesn't consult `errno`: a `chimera` or `thread` child shares it with the parent's main thread.
/// The kernel only fills in the remaining time when the sleep was interrupted, so a non-zero
/// remainder is what tells EINTR apart from a real failure.
#[cfg_attr(test, no_alloc)]
pub fn sleep(duration: Duration) {
    let mut request = libc::timespec {
        tv_sec: duration.as_secs() as libc::time_t,
        tv_nsec: duration.subsec_nanos() as _,
    };
    loop {
        let mut remaining = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        if unsafe { libc::nanosleep(&request, &mut remaining) } == 0 {
            return;
        }
        if remaining.tv_sec == 0 && remaining.tv_nsec == 0 {
            return;
        }
        request = remaining;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Code(c_int),
    Signal(c_int),
}

impl ExitStatus {
    pub fn from_wait_status(wait_status: c_int) -> Result<ExitStatus> {
        if libc::WIFEXITED(wait_status) {
            return Ok(ExitStatus::Code(libc::WEXITSTATUS(wait_status)));
        }
        if libc::WIFSIGNALED(wait_status) {
            return Ok(ExitStatus::Signal(libc::WTERMSIG(wait_status)));
        }

        bail!("invalid wait status")
    }

    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Code(0))
    }
}

/// Wait for a cloned child process to exit.
///
/// Uses `__WALL`, so children created without `SIGCHLD` as their termination signal (e.g. with
/// only `CLONE_VM`) can be reaped too.
pub fn waitpid(pid: libc::pid_t) -> Result<ExitStatus> {
    let mut status: c_int = 0;
    loop {
        let rc = unsafe { libc::waitpid(pid, &mut status as *mut c_int, libc::__WALL) };
        if rc >= 0 {
            break;
        }
        let err = Error::last_os_error();
        if !err.is_errno(libc::EINTR) {
            return Err(err.cause("waitpid failed"));
        }
    }
    ExitStatus::from_wait_status(status)
}

/// Block until the kernel clears `word` to zero.
///
/// `word` must have been registered with `CLONE_CHILD_CLEARTID`; the kernel zeroes it and issues
/// a `FUTEX_WAKE` when the thread that owns it exits.
pub fn wait_for_cleared_tid(word: &AtomicI32) -> Result<()> {
    loop {
        let current = word.load(Ordering::Acquire);
        if current == 0 {
            return Ok(());
        }
        let rc = unsafe {
            libc::syscall(
                libc::SYS_futex,
                word.as_ptr(),
                libc::FUTEX_WAIT,
                current,
                ptr::null::<libc::timespec>(),
            )
        };
        if rc == -1 {
            let err = Error::last_os_error();
            // EAGAIN: the word changed before we slept. EINTR: a signal woke us. Either way, look
            // again.
            if !err.is_errno(libc::EAGAIN) && !err.is_errno(libc::EINTR) {
                return Err(err.cause("futex wait on child tid failed"));
            }
        }
    }
}
