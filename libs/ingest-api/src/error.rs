/// Category of a collaborator error. Lets the cycle decide how loud to be
/// (and the health probe how to report) without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration — permanent, fail at startup.
    Config,
    /// Upstream/downstream unreachable, non-2xx, broken pipe.
    Io,
    /// Call exceeded the caller-configured timeout.
    Timeout,
    /// Malformed payload (feed body is not `{ "txs": [...] }`, bad JSON).
    Format,
    /// The bus accepted the call but rejected the entry.
    Rejected,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Io => f.write_str("io"),
            ErrorKind::Timeout => f.write_str("timeout"),
            ErrorKind::Format => f.write_str("format"),
            ErrorKind::Rejected => f.write_str("rejected"),
        }
    }
}

/// Unified error type for all collaborator trait methods
/// (fetcher, publisher, metrics sink).
///
/// Carries an `ErrorKind` for categorization and a human-readable message.
/// `From` impls assign the kind automatically so adapters can use `?`.
#[derive(Clone, PartialEq, Eq)]
pub struct IngestError {
    kind: ErrorKind,
    message: String,
}

impl IngestError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Config, message: msg.into() }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Io, message: msg.into() }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Timeout, message: msg.into() }
    }

    pub fn format_err(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Format, message: msg.into() }
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Rejected, message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Debug for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for IngestError {}

impl From<std::io::Error> for IngestError {
    fn from(e: std::io::Error) -> Self { Self { kind: ErrorKind::Io, message: e.to_string() } }
}

impl From<serde_json::Error> for IngestError {
    fn from(e: serde_json::Error) -> Self { Self { kind: ErrorKind::Format, message: e.to_string() } }
}
