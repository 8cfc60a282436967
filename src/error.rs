use thiserror::Error;

/// The engine's single error taxonomy, surfaced unchanged across every public boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("file header failed verification")]
    CorruptHeader,

    #[error("invalid page number: {0}")]
    PageNo(u32),

    #[error("cell ordinal {0} out of range")]
    CellNo(u16),

    #[error("key not found")]
    NotFound,

    #[error("key already exists")]
    Duplicate,

    #[error("node has no cells")]
    Empty,

    #[error("allocation failed")]
    NoMem,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encoding(String),
}

pub type Result<T> = std::result::Result<T, Error>;
