/// Error type for the shared domain layer. The stores carry their own
/// typed errors (`CatalogError`, `BlobError`, `AuthError`); this one covers
/// configuration and the odd cross-cutting failure.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
