mod libc_util;

mod child;
mod config;
mod counter;
mod error;
mod flags;
mod id_map;
mod mode;
pub mod report;
pub mod spawn;

pub mod dump;
pub mod logging;

pub use child::PANIC_EXIT_CODE;
pub use config::{Experiment, MIN_STACK_SIZE};
pub use counter::SharedCounter;
pub use error::{Error, Result};
pub use flags::IsolationFlags;
pub use id_map::{map_self, MapOutcome, Mapping};
pub use libc_util::{gettid, ExitStatus};
pub use mode::{Mode, ParseModeError};
pub use report::Reporter;
pub use spawn::{spawn, spawn_with_flags, Task, Termination};

/// In test builds, count allocations so the functions which must run inside a freshly cloned
/// context can be checked for not allocating.
#[cfg(test)]
#[global_allocator]
static ALLOC: alloc_counter::AllocCounterSystem = alloc_counter::AllocCounterSystem;
