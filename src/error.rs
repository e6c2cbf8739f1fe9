//! Error types for the Sigil library.
//!
//! All fallible operations return [`Result`], whose error type is the
//! [`SigilError`] enum. Lifecycle violations on the term table surface as
//! [`SigilError::NotSealed`] and [`SigilError::Sealed`]; data errors such as
//! a corrupt serialized table or a malformed plan are recoverable and leave
//! the object in its pre-call state.

use std::io;

use thiserror::Error;

/// The main error type for Sigil operations.
#[derive(Error, Debug)]
pub enum SigilError {
    /// I/O errors (file operations, stream read/write).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A term table query was made before the table was sealed.
    #[error("term table is not sealed: {0}")]
    NotSealed(String),

    /// A term table mutator was called after the table was sealed.
    #[error("term table is sealed: {0}")]
    Sealed(String),

    /// Two explicit terms were closed with the same hash.
    #[error("duplicate term: hash {0:#018x}")]
    DuplicateTerm(u64),

    /// A serialized plan tree failed to parse.
    #[error("malformed plan: {0}")]
    MalformedPlan(String),

    /// A serialized term table failed to deserialize.
    #[error("corrupt term table: {0}")]
    CorruptTable(String),

    /// A treatment policy was constructed with out-of-range parameters.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid operation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Generic anyhow error.
    #[error("error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with SigilError.
pub type Result<T> = std::result::Result<T, SigilError>;

impl SigilError {
    /// Create a new not-sealed error.
    pub fn not_sealed<S: Into<String>>(msg: S) -> Self {
        SigilError::NotSealed(msg.into())
    }

    /// Create a new sealed error.
    pub fn sealed<S: Into<String>>(msg: S) -> Self {
        SigilError::Sealed(msg.into())
    }

    /// Create a new malformed-plan error.
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        SigilError::MalformedPlan(msg.into())
    }

    /// Create a new corrupt-table error.
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        SigilError::CorruptTable(msg.into())
    }

    /// Create a new invalid-config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        SigilError::InvalidConfig(msg.into())
    }

    /// Create a new invalid-operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        SigilError::InvalidOperation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = SigilError::not_sealed("query before seal");
        assert_eq!(
            error.to_string(),
            "term table is not sealed: query before seal"
        );

        let error = SigilError::corrupt("bad magic");
        assert_eq!(error.to_string(), "corrupt term table: bad magic");

        let error = SigilError::DuplicateTerm(0xDEAD);
        assert_eq!(error.to_string(), "duplicate term: hash 0x000000000000dead");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error = SigilError::from(io_error);

        match error {
            SigilError::Io(_) => {}
            _ => panic!("Expected IO error variant"),
        }
    }
}
