/// Errors surfaced by the record codec.
///
/// A malformed trace reaching the epoch builder is not represented here;
/// it's raised via `assert!` as a fatal bug rather than a recoverable
/// condition.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed record stream: {0}")]
    Format(String),
}
