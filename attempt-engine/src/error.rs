/// Engine error taxonomy.
///
/// `Persistence` is the only transient kind: auto-save recovers from it by
/// retrying on the next edit, while start and submit surface it to the
/// caller, whose retry is safe because in-memory state is only advanced
/// after the durable write succeeds.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid attempt state: {0}")]
    InvalidState(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("not authorized: {0}")]
    Authorization(String),
}
