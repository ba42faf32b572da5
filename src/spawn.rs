use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::AtomicI32;
use std::sync::Arc;

use tracing::{debug, span, warn, Level};

use crate::child::{child_extern, ChildArg};
use crate::config::Experiment;
use crate::counter::SharedCounter;
use crate::error::{bail_errno, Result};
use crate::flags::IsolationFlags;
use crate::id_map::Mapping;
use crate::libc_util::{get_topmost_stack_pointer, wait_for_cleared_tid, waitpid, ExitStatus};
use crate::mode::Mode;

/// A spawned execution context, and the memory it runs on.
///
/// The stack, the argument block, and the counter are all heap allocations owned here, so moving
/// a `Task` never moves anything the child is using. Dropping a `Task` joins it first; leaking
/// one leaks its stack along with it.
pub struct Task {
    id: libc::pid_t,
    flags: IsolationFlags,

    // Only ever touched by the child after clone(2). Must outlive it.
    #[allow(dead_code)]
    stack: Vec<u8>,
    #[allow(dead_code)]
    arg: Arc<ChildArg>,
    counter: Arc<SharedCounter>,

    /// For thread-group members: set to the child's tid by the kernel, and cleared when it exits.
    tid_word: Option<Arc<AtomicI32>>,

    termination: Option<Termination>,
}

/// How a [`Task`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// A separate process, reaped with `waitpid(2)`.
    Process(ExitStatus),
    /// A member of our own thread group. Threads have no exit status of their own.
    Thread,
}

/// Spawn a context for one of the named [`Mode`]s.
pub fn spawn(mode: Mode, experiment: &Experiment, counter: Arc<SharedCounter>) -> Result<Task> {
    let span = span!(Level::DEBUG, "spawn", %mode);
    let _span_guard = span.enter();
    spawn_with_flags(mode.flags(), mode.identity_mapping(), experiment, counter)
}

/// Spawn a context with an arbitrary set of [`IsolationFlags`].
///
/// If `mapping` is set, the child writes it to its own `/proc/self/uid_map` before entering its
/// counter loop. Nothing is created if `flags` or `experiment` fail validation.
pub fn spawn_with_flags(
    flags: IsolationFlags,
    mapping: Option<Mapping>,
    experiment: &Experiment,
    counter: Arc<SharedCounter>,
) -> Result<Task> {
    flags
        .validate()
        .map_err(|e| e.context("invalid isolation flags"))?;
    experiment
        .validate()
        .map_err(|e| e.context("invalid experiment"))?;

    let mut clone_flags = flags.clone_flags();

    // A thread can't be waitpid()ed. Have the kernel publish its tid into `tid_word` before
    // clone() returns, and clear it (with a futex wake) once the thread is gone.
    let tid_word = if flags.is_process() {
        None
    } else {
        clone_flags |= libc::CLONE_PARENT_SETTID | libc::CLONE_CHILD_CLEARTID;
        Some(Arc::new(AtomicI32::new(0)))
    };
    let tid_ptr = tid_word
        .as_ref()
        .map_or(ptr::null_mut(), |word| word.as_ptr());

    // Allocate the stack, and get its topmost address.
    let mut stack = vec![0u8; experiment.stack_size];
    let stack_ptr = get_topmost_stack_pointer(&mut stack);

    // Construct the argument to the child entrypoint.
    let arg = Arc::new(ChildArg {
        counter: Arc::as_ptr(&counter),
        reporter: experiment.reporter,
        threshold: experiment.threshold,
        interval: experiment.interval,
        mapping,
    });

    debug!(?flags, clone_flags, "cloning");

    let id @ 0.. = (unsafe {
        libc::clone(
            child_extern,
            stack_ptr,
            clone_flags,
            Arc::as_ptr(&arg) as *mut c_void,
            tid_ptr,
            ptr::null_mut::<c_void>(),
            tid_ptr,
        )
    }) else {
        bail_errno!("clone(2) failed");
    };

    debug!(%id, "spawned");

    Ok(Task {
        id,
        flags,
        stack,
        arg,
        counter,
        tid_word,
        termination: None,
    })
}

impl Task {
    /// The pid (for processes) or tid (for threads) of the context.
    pub fn id(&self) -> libc::pid_t {
        self.id
    }

    pub fn flags(&self) -> IsolationFlags {
        self.flags
    }

    /// The counter handed to the child. Only shared with it if `share_memory` is set.
    pub fn counter(&self) -> &Arc<SharedCounter> {
        &self.counter
    }

    /// How the task ended, if it has been joined.
    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// Block until the context has terminated. Calling this again returns the same result.
    pub fn join(&mut self) -> Result<Termination> {
        if let Some(termination) = self.termination {
            return Ok(termination);
        }

        let termination = match &self.tid_word {
            Some(word) => {
                wait_for_cleared_tid(word).map_err(|e| e.context("failed to join thread"))?;
                Termination::Thread
            }
            None => {
                let status =
                    waitpid(self.id).map_err(|e| e.context("failed to wait for child exit"))?;
                Termination::Process(status)
            }
        };
        debug!(id = self.id, ?termination, "joined");

        self.termination = Some(termination);
        Ok(termination)
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        if self.termination.is_none() {
            if let Err(err) = self.join() {
                warn!(id = self.id, %err, "failed to join task on drop");
            }
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("flags", &self.flags)
            .field("termination", &self.termination)
            .finish_non_exhaustive()
    }
}
