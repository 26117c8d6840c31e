use thiserror::Error;

/// Errors raised while exporting the event journal.
#[derive(Error, Debug)]
pub enum EventsError {
    #[error("could not encode journal entry: {0}")]
    Serialization(#[from] serde_json::Error),
}
