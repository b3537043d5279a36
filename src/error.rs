//! Diagnostic error types for rich error reporting via miette.
//!
//! Every variant here corresponds to a "log and continue" path from the
//! error-handling design: these are constructed, logged, and the caller
//! moves on to the next poll tick rather than propagating to the top of the
//! event loop.

use miette::Diagnostic;
use thiserror::Error;

/// Errors parsing or applying a ProcessSpec config file.
#[derive(Debug, Error, Diagnostic)]
pub enum SpecError {
    #[error("malformed spec JSON in '{name}'")]
    #[diagnostic(
        code(ward::spec::malformed),
        help("fix the JSON in the config file; ward will pick it up on the next poll")
    )]
    MalformedJson {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("spec '{name}' has an empty 'args' array")]
    #[diagnostic(code(ward::spec::empty_args))]
    EmptyArgs { name: String },
}

/// Errors parsing or applying a Message file.
#[derive(Debug, Error, Diagnostic)]
pub enum MessageError {
    #[error("malformed message JSON")]
    #[diagnostic(code(ward::message::malformed))]
    MalformedJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown message type '{type_}'")]
    #[diagnostic(
        code(ward::message::unknown_type),
        help("expected one of RESTART, RESTART-ALL, RESTART-GROUP")
    )]
    UnknownType { type_: String },

    #[error("RESTART message is missing required key 'name'")]
    #[diagnostic(code(ward::message::missing_name))]
    MissingName,

    #[error("RESTART-GROUP message is missing required key 'group'")]
    #[diagnostic(code(ward::message::missing_group))]
    MissingGroup,
}

/// Errors related to process spawn/kill/pid-file bookkeeping.
#[derive(Debug, Error, Diagnostic)]
pub enum ProcessError {
    #[error("failed to spawn process for '{name}'")]
    #[diagnostic(code(ward::process::spawn_failed))]
    SpawnFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to deliver signal to '{name}' (pid {pid})")]
    #[diagnostic(code(ward::process::signal_failed))]
    SignalFailed { name: String, pid: u32 },

    #[error("failed to write pid file for '{name}'")]
    #[diagnostic(code(ward::process::pidfile_write_failed))]
    PidFileWriteFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors reading/writing the config or messages directories.
#[derive(Debug, Error, Diagnostic)]
pub enum DirectoryError {
    #[error("failed to read directory '{}'", path.display())]
    #[diagnostic(code(ward::directory::read_failed))]
    ReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to delete message file '{}'", path.display())]
    #[diagnostic(
        code(ward::directory::delete_failed),
        help("this message will be redelivered on the next poll, which may cause it to run twice")
    )]
    DeleteFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Find the most similar daemon name for a "did you mean" suggestion.
pub fn find_similar_name<'a>(
    name: &str,
    available: impl Iterator<Item = &'a str>,
) -> Option<String> {
    use fuzzy_matcher::FuzzyMatcher;
    use fuzzy_matcher::skim::SkimMatcherV2;

    let matcher = SkimMatcherV2::default();
    available
        .filter_map(|candidate| {
            matcher
                .fuzzy_match(candidate, name)
                .map(|score| (candidate, score))
        })
        .max_by_key(|(_, score)| *score)
        .filter(|(_, score)| *score > 0)
        .map(|(candidate, _)| format!("did you mean '{candidate}'?"))
}
