#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound(String),
    /// Store-side arbitration rejected an overlapping interval.
    Conflict(String),
    /// Payload failed the store's own validation.
    Rejected(String),
    Transport(String),
    Decode(String),
    Journal(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "booking not found: {id}"),
            StoreError::Conflict(id) => write!(f, "conflicts with booking: {id}"),
            StoreError::Rejected(msg) => write!(f, "rejected: {msg}"),
            StoreError::Transport(msg) => write!(f, "transport error: {msg}"),
            StoreError::Decode(msg) => write!(f, "decode error: {msg}"),
            StoreError::Journal(msg) => write!(f, "journal error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Transport(e.to_string())
    }
}
