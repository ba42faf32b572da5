//! Code that runs first inside a freshly cloned context.
//!
//! Nothing here may allocate, lock, or touch thread-local storage: in `chimera` and `thread` modes
//! the child runs on the parent's TLS pointer, and in every mode the parent may have been holding
//! the allocator's or stdout's lock at the instant of the clone.

use std::ffi::{c_int, c_void};
use std::time::Duration;

use crate::counter::SharedCounter;
use crate::id_map::{self, MapOutcome, Mapping};
use crate::libc_util::gettid;
use crate::report::Reporter;

/// Exit code of a child whose entry point panicked.
pub const PANIC_EXIT_CODE: c_int = 126;

/// Everything the child needs, prepared by the parent before `clone(2)`.
#[derive(Debug)]
pub(crate) struct ChildArg {
    /// Points into the parent's `Arc<SharedCounter>`, which the `Task` keeps alive.
    pub counter: *const SharedCounter,
    pub reporter: Reporter,
    pub threshold: i32,
    pub interval: Duration,
    pub mapping: Option<Mapping>,
}

pub(crate) extern "C" fn child_extern(arg: *mut c_void) -> c_int {
    let arg: &ChildArg = unsafe { &*(arg as *const ChildArg) };
    let reporter = arg.reporter;

    // Unwinding out of an `extern "C"` fn aborts the whole address space; catch it here instead.
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| child_entrypoint(arg))) {
        Ok(()) => 0,
        Err(_) => {
            reporter.line(": caught panic in child_entry");
            PANIC_EXIT_CODE
        }
    }
}

fn child_entrypoint(arg: &ChildArg) {
    let out = arg.reporter;

    out.line(": Hello from child_entry");
    out.value(": getppid() = ", unsafe { libc::getppid() } as i64);
    out.value(": getpid()  = ", unsafe { libc::getpid() } as i64);
    out.value(": gettid()  = ", gettid() as i64);
    out.value(": getuid()  = ", unsafe { libc::getuid() } as i64);

    if let Some(mapping) = arg.mapping {
        match id_map::map_self(out, mapping) {
            MapOutcome::Mapped { elevated: true } => {}
            MapOutcome::Mapped { elevated: false }
            | MapOutcome::OpenFailed(_)
            | MapOutcome::WriteFailed(_) => out.line(": continuing unprivileged"),
        }
        out.value(": getuid()  = ", unsafe { libc::getuid() } as i64);
    }

    // Without CLONE_VM this is our own copy of the counter, and the parent never sees these
    // increments.
    let counter: &SharedCounter = unsafe { &*arg.counter };
    counter.run_to_threshold(arg.threshold, arg.interval, |_| {});
}
