//! crates/cli/src/args.rs
//!
//! The command-line surface and its translation into option values.

use base::options::{ConflictPolicy, Context, Priority};
use base::status::StatusBits;
use clap::{Arg, ArgAction, Command};

/// The selected action with its parameters.
#[derive(Debug)]
pub enum Action {
    /// Add repository URLs (or list them with no arguments).
    Urls { specs: Vec<String> },
    /// Add ignore patterns (or list them with no arguments).
    Ignore { patterns: Vec<String> },
    /// Report local changes.
    Status { paths: Vec<String>, check: bool },
    /// Send local changes to the repository.
    Commit { message: String, paths: Vec<String> },
    /// Apply repository changes to the working copy.
    Update { revision: Option<u64> },
    /// Undo local changes back to BASE.
    Revert { paths: Vec<String> },
    /// Mark conflicts as resolved.
    Resolved { paths: Vec<String> },
}

/// Everything the dispatcher needs.
#[derive(Debug)]
pub struct Parsed {
    /// Option values with their priorities applied.
    pub ctx: Context,
    /// The action to run.
    pub action: Action,
}

fn command() -> Command {
    let paths = Arg::new("paths")
        .num_args(0..)
        .value_name("PATH")
        .help("Restrict the action to these working-copy paths");

    Command::new("trackfs")
        .about("Whole-filesystem version control with out-of-tree bookkeeping")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::Count)
                .global(true)
                .help("More output; repeatable"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .action(ArgAction::Count)
                .global(true)
                .help("Less output; repeatable"),
        )
        .arg(
            Arg::new("filter")
                .short('f')
                .long("filter")
                .value_name("KINDS")
                .global(true)
                .help("Only handle entries with these change kinds (comma list of new, deleted, changed, meta)"),
        )
        .arg(
            Arg::new("non-recursive")
                .short('N')
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Do not descend into subdirectories"),
        )
        .subcommand(
            Command::new("urls")
                .about("Define or list the repository URLs of this working copy")
                .arg(Arg::new("specs").num_args(0..).value_name("URL")),
        )
        .subcommand(
            Command::new("ignore")
                .about("Add or list ignore patterns")
                .arg(Arg::new("patterns").num_args(0..).value_name("PATTERN")),
        )
        .subcommand(
            Command::new("status")
                .about("Show local modifications")
                .arg(paths.clone())
                .arg(
                    Arg::new("check")
                        .short('C')
                        .action(ArgAction::SetTrue)
                        .help("Settle possibly-changed entries by content"),
                ),
        )
        .subcommand(
            Command::new("commit")
                .about("Send changes to the repository")
                .arg(
                    Arg::new("message")
                        .short('m')
                        .long("message")
                        .required(true)
                        .value_name("TEXT"),
                )
                .arg(paths.clone()),
        )
        .subcommand(
            Command::new("update")
                .about("Bring the working copy to a repository revision")
                .arg(
                    Arg::new("revision")
                        .short('r')
                        .long("revision")
                        .value_name("REV")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    Arg::new("conflict")
                        .long("conflict")
                        .value_name("POLICY")
                        .help("stop, local, remote, both, or merge"),
                ),
        )
        .subcommand(
            Command::new("revert")
                .about("Undo local changes back to BASE")
                .arg(paths.clone()),
        )
        .subcommand(
            Command::new("resolved")
                .about("Forget recorded conflicts for the given paths")
                .arg(paths),
        )
}

fn parse_filter(spec: &str) -> Result<StatusBits, clap::Error> {
    let mut bits = StatusBits::empty();
    for token in spec.split(',') {
        bits |= match token {
            "new" => StatusBits::NEW,
            "deleted" | "removed" => StatusBits::REMOVED,
            "changed" | "text" => StatusBits::CHANGED | StatusBits::LIKELY,
            "meta" => StatusBits::META_CHANGED,
            "props" => StatusBits::PROPERTIES,
            "" => StatusBits::empty(),
            other => {
                return Err(clap::Error::raw(
                    clap::error::ErrorKind::InvalidValue,
                    format!("unknown filter kind \"{other}\"\n"),
                ));
            }
        };
    }
    Ok(bits)
}

fn string_values(matches: &clap::ArgMatches, name: &str) -> Vec<String> {
    matches
        .get_many::<String>(name)
        .map(|v| v.cloned().collect())
        .unwrap_or_default()
}

/// Parses `argv` into the context and action.
pub fn parse<I, S>(argv: I) -> Result<Parsed, clap::Error>
where
    I: IntoIterator<Item = S>,
    S: Into<std::ffi::OsString> + Clone,
{
    let matches = command().try_get_matches_from(argv)?;
    let mut ctx = Context::from_env();

    let verbose = matches.get_count("verbose");
    let quiet = matches.get_count("quiet");
    if verbose > 0 || quiet > 0 {
        let level = 1i16 + i16::from(verbose) - i16::from(quiet);
        ctx.verbosity
            .set(Priority::CommandLine, level.clamp(0, 4) as u8);
    }
    if let Some(filter) = matches.get_one::<String>("filter") {
        ctx.filter.set(Priority::CommandLine, parse_filter(filter)?);
    }
    if matches.get_flag("non-recursive") {
        ctx.recurse.set(Priority::CommandLine, false);
    }

    let (name, sub) = matches.subcommand().expect("subcommand is required");
    let action = match name {
        "urls" => Action::Urls {
            specs: string_values(sub, "specs"),
        },
        "ignore" => Action::Ignore {
            patterns: string_values(sub, "patterns"),
        },
        "status" => Action::Status {
            paths: string_values(sub, "paths"),
            check: sub.get_flag("check"),
        },
        "commit" => Action::Commit {
            message: sub
                .get_one::<String>("message")
                .expect("message is required")
                .clone(),
            paths: string_values(sub, "paths"),
        },
        "update" => {
            if let Some(policy) = sub.get_one::<String>("conflict") {
                let policy: ConflictPolicy = policy.parse().map_err(|e: String| {
                    clap::Error::raw(clap::error::ErrorKind::InvalidValue, format!("{e}\n"))
                })?;
                ctx.conflict.set(Priority::CommandLine, policy);
            }
            Action::Update {
                revision: sub.get_one::<u64>("revision").copied(),
            }
        }
        "revert" => Action::Revert {
            paths: string_values(sub, "paths"),
        },
        "resolved" => Action::Resolved {
            paths: string_values(sub, "paths"),
        },
        other => unreachable!("unknown subcommand {other}"),
    };

    Ok(Parsed { ctx, action })
}
