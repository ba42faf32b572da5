use std::fmt;
use std::str::FromStr;

use crate::flags::IsolationFlags;
use crate::id_map::Mapping;

/// A named preset of [`IsolationFlags`], selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Emulate `fork(2)` with `clone(2)`: a separate process with a copy of everything.
    Fork,
    /// A process/thread chimera: a separate process that shares our address space.
    Chimera,
    /// A new thread in this process.
    Thread,
    /// A new process in a fresh user namespace, which then maps its own root user.
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseModeError {
    #[error("invalid clone() mode: {0}")]
    Unknown(String),
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Fork, Mode::Chimera, Mode::Thread, Mode::User];

    pub fn name(&self) -> &'static str {
        match self {
            Mode::Fork => "fork",
            Mode::Chimera => "chimera",
            Mode::Thread => "thread",
            Mode::User => "user",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Mode::Fork => "emulate fork with clone",
            Mode::Chimera => "create process/thread chimera",
            Mode::Thread => "create a new thread in a process",
            Mode::User => "create a new process and alter its UID namespace",
        }
    }

    pub fn flags(&self) -> IsolationFlags {
        match self {
            Mode::Fork => IsolationFlags {
                reparent: true,
                ..IsolationFlags::default()
            },
            Mode::Chimera => IsolationFlags {
                share_memory: true,
                ..IsolationFlags::default()
            },
            // Since Linux 2.5.35, CLONE_THREAD requires CLONE_SIGHAND, and since 2.6.0
            // CLONE_SIGHAND requires CLONE_VM.
            Mode::Thread => IsolationFlags {
                share_memory: true,
                share_signal_handlers: true,
                same_thread_group: true,
                ..IsolationFlags::default()
            },
            Mode::User => IsolationFlags {
                new_identity_namespace: true,
                ..IsolationFlags::default()
            },
        }
    }

    /// The uid mapping the child should write for itself, if any.
    pub fn identity_mapping(&self) -> Option<Mapping> {
        match self {
            Mode::User => Some(Mapping::ROOT_TO_ROOT),
            _ => None,
        }
    }

    /// One line per mode, for usage text.
    pub fn usage() -> String {
        let mut usage = String::from("MODE:\n");
        for mode in Mode::ALL {
            usage.push_str(&format!("  - {:<7} -- {}\n", mode.name(), mode.description()));
        }
        usage
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Mode, ParseModeError> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.name() == s)
            .ok_or_else(|| ParseModeError::Unknown(s.to_owned()))
    }
}
