use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("File already exists: {0}")]
    AlreadyExists(String),

    #[error("Is a directory: {0}")]
    IsDirectory(String),

    #[error("Not a directory: {0}")]
    NotDirectory(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Path is not managed by any mount: {0}")]
    NotManaged(String),

    #[error("File is read-only")]
    ReadOnlyFile,

    #[error("File is write-only")]
    WriteOnlyFile,

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Bad file descriptor: {0}")]
    BadDescriptor(i32),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, Error>;
