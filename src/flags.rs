use std::ffi::c_int;

use crate::error::{bail, Result};

/// The sharing facets of a new execution context.
///
/// Each field maps to one `clone(2)` flag. Everything left `false` is private to the child (it
/// gets a copy, or a fresh instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IsolationFlags {
    /// `CLONE_VM`: run in the parent's address space.
    pub share_memory: bool,

    /// `CLONE_SIGHAND`: share the table of signal handlers. Requires `share_memory`.
    pub share_signal_handlers: bool,

    /// `CLONE_THREAD`: join the parent's thread group, so `getpid()` matches the parent.
    /// Requires `share_signal_handlers`.
    pub same_thread_group: bool,

    /// `CLONE_NEWUSER`: start in a fresh user namespace.
    pub new_identity_namespace: bool,

    /// Send `SIGCHLD` to the parent on exit, like a `fork(2)`ed process.
    pub reparent: bool,
}

impl IsolationFlags {
    /// Check the combinations the kernel refuses, before anything is cloned.
    pub fn validate(&self) -> Result<()> {
        if self.share_signal_handlers && !self.share_memory {
            bail!("share_signal_handlers requires share_memory");
        }
        if self.same_thread_group && !self.share_signal_handlers {
            bail!("same_thread_group requires share_signal_handlers");
        }
        if self.new_identity_namespace && (self.same_thread_group || self.share_signal_handlers) {
            bail!("new_identity_namespace cannot be combined with thread-group or signal-handler sharing");
        }
        if self.same_thread_group && self.reparent {
            bail!("same_thread_group contexts have no termination signal to reparent with");
        }
        Ok(())
    }

    /// The flag word to hand to `clone(2)`. Includes the termination signal in the low byte.
    pub fn clone_flags(&self) -> c_int {
        let mut clone_flags = 0;

        if self.reparent {
            clone_flags |= libc::SIGCHLD;
        }
        if self.share_memory {
            clone_flags |= libc::CLONE_VM;
        }
        if self.share_signal_handlers {
            clone_flags |= libc::CLONE_SIGHAND;
        }
        if self.same_thread_group {
            clone_flags |= libc::CLONE_THREAD;
        }
        if self.new_identity_namespace {
            clone_flags |= libc::CLONE_NEWUSER;
        }

        clone_flags
    }

    /// Does the new context run in a separate thread group (i.e. is it a "process")?
    pub fn is_process(&self) -> bool {
        !self.same_thread_group
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_fully_private() {
        let flags = IsolationFlags::default();
        assert!(flags.validate().is_ok());
        assert_eq!(flags.clone_flags(), 0);
        assert!(flags.is_process());
    }

    #[test]
    fn thread_semantics_translate_to_clone_flags() {
        let flags = IsolationFlags {
            share_memory: true,
            share_signal_handlers: true,
            same_thread_group: true,
            ..IsolationFlags::default()
        };
        assert!(flags.validate().is_ok());
        assert_eq!(
            flags.clone_flags(),
            libc::CLONE_VM | libc::CLONE_SIGHAND | libc::CLONE_THREAD
        );
        assert!(!flags.is_process());
    }

    #[test]
    fn signal_handlers_need_shared_memory() {
        let flags = IsolationFlags {
            share_signal_handlers: true,
            ..IsolationFlags::default()
        };
        let err = flags.validate().unwrap_err();
        assert_eq!(err.cause, Some("share_signal_handlers requires share_memory"));
    }

    #[test]
    fn thread_group_needs_signal_handlers() {
        let flags = IsolationFlags {
            share_memory: true,
            same_thread_group: true,
            ..IsolationFlags::default()
        };
        assert!(flags.validate().is_err());
    }

    #[test]
    fn user_namespace_cannot_be_a_thread() {
        let flags = IsolationFlags {
            share_memory: true,
            share_signal_handlers: true,
            same_thread_group: true,
            new_identity_namespace: true,
            ..IsolationFlags::default()
        };
        assert!(flags.validate().is_err());
    }

    #[test]
    fn threads_cannot_reparent() {
        let flags = IsolationFlags {
            share_memory: true,
            share_signal_handlers: true,
            same_thread_group: true,
            reparent: true,
            ..IsolationFlags::default()
        };
        assert!(flags.validate().is_err());
    }
}
