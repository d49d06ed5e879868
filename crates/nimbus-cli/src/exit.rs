//! Exit code classification for CLI tooling.
//!
//! `0` success, `1` general error, `2` bad usage, `3` connection error,
//! `4` timeout. Clap already exits `2` for its own parse failures; this
//! module covers everything a command discovers once parsing succeeds.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// Well-formed command line, but the arguments don't make sense
    /// together (e.g. an invalid UUID, an unknown enum value).
    #[error("{0}")]
    Usage(String),
    /// Could not reach the database.
    #[error("{0:#}")]
    Connection(anyhow::Error),
    /// A request or wait exceeded its deadline.
    #[error("{0:#}")]
    Timeout(anyhow::Error),
    /// Anything else.
    #[error("{0:#}")]
    General(anyhow::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 2,
            Self::Connection(_) => 3,
            Self::Timeout(_) => 4,
            Self::General(_) => 1,
        }
    }

    /// Wrap a failure from `create_pool`/`ensure_database_exists` -- the
    /// only two calls that can fail before a command even starts doing
    /// its own work, so any error from them is a connection error.
    pub fn from_connect_error(e: anyhow::Error) -> Self {
        Self::Connection(e)
    }
}

impl From<anyhow::Error> for CliError {
    fn from(e: anyhow::Error) -> Self {
        Self::General(e)
    }
}
