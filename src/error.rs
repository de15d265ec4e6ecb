use snafu::Snafu;

/// Errors surfaced by the ingestion core.
///
/// Parse and config errors are swallowed at the call sites that can recover
/// from them (a worker drops the offending line and continues); IO errors are
/// fatal to the listener task that produced them. See the error handling
/// design notes for the propagation rules.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("malformed statsd line {line:?}: {reason}"))]
    Parse { line: String, reason: String },

    #[snafu(display("invalid configuration: {reason}"))]
    Config { reason: String },

    #[snafu(display("io error during {during}: {source}"))]
    Io {
        during: &'static str,
        source: std::io::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn is_parse(&self) -> bool {
        matches!(self, Error::Parse { .. })
    }
}
