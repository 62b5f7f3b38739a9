//! Error types for epubkit operations.

use thiserror::Error;

/// Errors that can occur while reading, editing, or saving a project.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Structurally invalid input; aborts the parse.
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// The pointer document or a referenced file is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A manifest id referenced elsewhere does not exist.
    #[error("Dangling reference: manifest item '{0}' does not exist")]
    DanglingReference(String),

    /// A navigation insert position outside `1..=bound`.
    #[error("Play order {value} is out of range (expected 1..={bound})")]
    OutOfRange { value: usize, bound: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::MalformedDocument(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
