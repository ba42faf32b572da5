//! # cleave
//!
//! Create a child with `clone(2)` in one of several sharing modes, and watch which state it
//! shares with us.
//!
//! - `fork`: the child counts to 4 on its own copy of the counter; ours stays at 0 forever.
//! - `chimera` / `thread`: the child's increments show up in our `counter = ` lines.
//! - `thread`: the child reports our `getpid()`, with a different `gettid()`.
//! - `user`: the child starts as the overflow uid, and becomes root if its map is accepted.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use cleave::{Experiment, Mode, SharedCounter};

#[derive(Debug, Parser)]
#[command(version, about, after_help = Mode::usage())]
struct Cli {
    /// Which kind of context to clone.
    mode: Mode,
}

pub fn main() -> eyre::Result<()> {
    cleave::logging::configure_logging();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // A usage error lists the modes too, not just the `--help` page.
        Err(err) if err.use_stderr() => {
            let _ = err.print();
            eprint!("\n{}", Mode::usage());
            std::process::exit(err.exit_code());
        }
        Err(err) => err.exit(),
    };

    let experiment = Experiment::default();
    let out = experiment.reporter;

    out.line("> Hello from main!");
    out.value("> getppid() = ", unsafe { libc::getppid() } as i64);
    out.value("> getpid()  = ", unsafe { libc::getpid() } as i64);
    out.value("> gettid()  = ", cleave::gettid() as i64);
    out.value("> getuid()  = ", unsafe { libc::getuid() } as i64);

    let counter = Arc::new(SharedCounter::new());

    // A failed clone is reported, and we still run our own loop.
    let task = match cleave::spawn(cli.mode, &experiment, counter.clone()) {
        Ok(task) => {
            out.value("Created process: ", task.id() as i64);
            Some(task)
        }
        Err(err) => {
            out.value("Created process: ", -1);
            error!(%err, mode = %cli.mode, "clone");
            None
        }
    };

    out.line("\n!!!!! Press C-c to terminate. !!!!!");
    counter.watch_to_threshold(experiment.threshold, experiment.interval, |value| {
        out.value("counter = ", value as i64)
    });

    if let Some(mut task) = task {
        let termination = task.join()?;
        info!(id = task.id(), ?termination, "child finished");
    }

    Ok(())
}
