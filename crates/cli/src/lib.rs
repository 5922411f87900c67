#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The trackfs command-line frontend: argument parsing, option wiring
//! into the [`base::options::Context`], and the thin action bodies that
//! glue the walker, the engine and the administrative area together.
//!
//! The working copy is always the current directory; its bookkeeping
//! lives under the `TRACKFS_WAA` / `TRACKFS_CONF` roots.

mod actions;
mod args;
mod output;

use base::ErrorKind;
use base::exit_code::ExitCode;

/// Parses `argv`, runs the requested action, and returns the process
/// exit code.
pub fn run<I, S>(argv: I) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<std::ffi::OsString> + Clone,
{
    let parsed = match args::parse(argv) {
        Ok(parsed) => parsed,
        Err(e) => {
            // clap renders its own message (including --help/--version).
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::Syntax.as_i32()
            } else {
                ExitCode::Ok.as_i32()
            };
        }
    };

    logging::init(parsed.ctx.verbosity.value());

    match actions::dispatch(parsed) {
        Ok(()) => ExitCode::Ok.as_i32(),
        Err(e) => {
            if e.kind() != ErrorKind::BrokenPipe {
                eprintln!("trackfs: {e}");
            }
            ExitCode::from_kind(e.kind()).as_i32()
        }
    }
}
