use thiserror::Error;

use crate::ObjectId;
use crate::encryption::DecryptionError;

pub type Result<T> = std::result::Result<T, Error>;

/// Detailed error raised inside the engine.
///
/// Library users driving the phases one by one see this type; [`crate::clean`] folds it into
/// the coarser [`CleanError`].
#[derive(Debug, Error)]
pub enum Error {
    /// An Object has the wrong type, e.g. the Object is an Array where a Name would be expected.
    #[error("object has wrong type; expected type {expected} but found type {found}")]
    ObjectType {
        expected: &'static str,
        found: &'static str,
    },
    /// Dictionary key was not found.
    #[error("missing required dictionary key \"{0}\"")]
    DictKey(String),
    /// The stream couldn't be decompressed.
    #[error("couldn't decompress stream: {0}")]
    Decompress(#[from] DecompressError),
    /// Failed to parse input.
    #[error("couldn't parse input: {0}")]
    Parse(#[from] ParseError),
    /// Error while parsing cross reference table.
    #[error("invalid cross-reference table: {0}")]
    Xref(#[from] XrefError),
    /// Error when decrypting the contents of the file.
    #[error("decryption error: {0}")]
    Decryption(#[from] DecryptionError),
    /// Invalid indirect object while parsing at offset.
    #[error("invalid indirect object at byte offset {offset}")]
    IndirectObject { offset: usize },
    /// Found object ID does not match the expected object ID.
    #[error("expected object {} {} but found {} {}", expected.0, expected.1, found.0, found.1)]
    ObjectIdMismatch { expected: ObjectId, found: ObjectId },
    /// The object ID was not found.
    #[error("object {0:?} not found")]
    ObjectNotFound(ObjectId),
    /// Resolving an indirect value led back to an object already being read.
    #[error("reference cycle at object {0:?}")]
    ReferenceCycle(ObjectId),
    /// Offset in file is invalid.
    #[error("invalid file offset {0}")]
    InvalidOffset(usize),
    /// The object stream could not be expanded.
    #[error("invalid object stream: {0}")]
    InvalidObjectStream(String),
    /// A stream has no `endstream` keyword.
    #[error("stream starting at byte offset {offset} is not terminated")]
    TruncatedStream { offset: usize },
    /// A live object is a stream whose payload could not be read.
    #[error("object {} {} at byte offset {offset} is an unreadable stream", id.0, id.1)]
    UnreadableStream { id: ObjectId, offset: usize },
    /// The memory budget of the operation is exhausted.
    #[error("memory limit of {limit} bytes exceeded ({requested} bytes requested)")]
    MemoryLimit { limit: usize, requested: usize },
    /// The header declares a version this engine does not read.
    #[error("unsupported PDF version {0}")]
    UnsupportedVersion(String),
    /// The document uses a security handler other than the standard one.
    #[error("unsupported security handler {}", String::from_utf8_lossy(.0))]
    UnsupportedSecurityHandler(Vec<u8>),
    /// The serialized output does not match the document it was written from.
    #[error("output verification failed: {0}")]
    Verification(String),
    /// IO error
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DecompressError {
    #[error("decoding ASCII85 failed: {0}")]
    Ascii85(&'static str),
    #[error("decoding ASCIIHex failed: {0}")]
    AsciiHex(&'static str),
    #[error("decoding RunLength failed: unexpected end of data")]
    RunLength,
    #[error("decoding Flate failed: {0}")]
    Flate(std::io::Error),
    #[error("decoding LZW failed: {0}")]
    Lzw(String),
    #[error("predictor failed: {0}")]
    Predictor(String),
    #[error("unsupported filter {0}")]
    UnsupportedFilter(String),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid file header")]
    InvalidFileHeader,
    #[error("invalid file trailer")]
    InvalidTrailer,
    #[error("invalid cross reference table")]
    InvalidXref,
    #[error("no document catalog found")]
    MissingCatalog,
}

#[derive(Debug, Error)]
pub enum XrefError {
    /// Could not parse cross reference table.
    #[error("could not parse xref")]
    Parse,
    /// Could not find start of cross reference table.
    #[error("invalid start value")]
    Start,
    /// The trailer's "Prev" field was invalid.
    #[error("invalid start value in Prev field")]
    PrevStart,
    /// The trailer's "XRefStm" field was invalid.
    #[error("invalid stream start value")]
    StreamStart,
}

/// Outcome classes of a [`crate::clean`] operation.
#[derive(Debug, Error)]
pub enum CleanError {
    /// The input cannot be turned into a document, even after recovery.
    #[error("malformed document structure: {0}")]
    MalformedStructure(#[source] Error),
    /// Neither the user nor the owner password matches.
    #[error("{}", if *empty_password { "document is encrypted and no password was supplied" } else { "incorrect password" })]
    AuthenticationFailed { empty_password: bool },
    #[error("unsupported PDF version {0}")]
    UnsupportedVersion(String),
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    /// The input file could not be read.
    #[error("failed to read input: {0}")]
    ReadFailed(#[source] std::io::Error),
    /// The sink rejected the output.
    #[error("failed to write output: {0}")]
    WriteFailed(#[source] std::io::Error),
    /// The serializer produced output that does not describe the cleaned document.
    #[error("internal consistency check failed: {0}")]
    InternalConsistency(String),
}

impl CleanError {
    /// Record whether the failing authentication was attempted with an empty password.
    pub(crate) fn with_password(self, password: &str) -> Self {
        match self {
            CleanError::AuthenticationFailed { .. } => CleanError::AuthenticationFailed {
                empty_password: password.is_empty(),
            },
            other => other,
        }
    }
}

impl From<Error> for CleanError {
    fn from(err: Error) -> Self {
        match err {
            Error::Decryption(DecryptionError::IncorrectPassword) => {
                CleanError::AuthenticationFailed { empty_password: false }
            }
            Error::Decryption(
                err @ (DecryptionError::UnsupportedEncryption | DecryptionError::UnsupportedRevision),
            ) => CleanError::UnsupportedFeature(err.to_string()),
            Error::UnsupportedSecurityHandler(name) => CleanError::UnsupportedFeature(format!(
                "security handler {}",
                String::from_utf8_lossy(&name)
            )),
            Error::UnsupportedVersion(version) => CleanError::UnsupportedVersion(version),
            Error::Verification(message) => CleanError::InternalConsistency(message),
            Error::IO(err) => CleanError::WriteFailed(err),
            other => CleanError::MalformedStructure(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_errors() {
        let err = CleanError::from(Error::Decryption(DecryptionError::IncorrectPassword)).with_password("");
        assert!(matches!(err, CleanError::AuthenticationFailed { empty_password: true }));

        let err = CleanError::from(Error::UnsupportedVersion("3.0".into()));
        assert!(matches!(err, CleanError::UnsupportedVersion(v) if v == "3.0"));

        let err = CleanError::from(Error::UnsupportedSecurityHandler(b"Adobe.PubSec".to_vec()));
        assert!(matches!(err, CleanError::UnsupportedFeature(_)));

        let err = CleanError::from(Error::TruncatedStream { offset: 12 });
        assert!(matches!(err, CleanError::MalformedStructure(Error::TruncatedStream { offset: 12 })));

        let err = CleanError::from(Error::Verification("offset mismatch".into()));
        assert!(matches!(err, CleanError::InternalConsistency(_)));
    }

    #[test]
    fn malformed_structure_keeps_detail() {
        let err = CleanError::from(Error::UnreadableStream { id: (4, 0), offset: 120 });
        assert_eq!(
            err.to_string(),
            "malformed document structure: object 4 0 at byte offset 120 is an unreadable stream"
        );
    }
}
