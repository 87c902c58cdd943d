//! Error types for the surface pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("Data format error: {0}")]
    DataFormat(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type SurfaceResult<T> = Result<T, SurfaceError>;

impl SurfaceError {
    pub fn data_format(msg: impl Into<String>) -> Self {
        Self::DataFormat(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn numerical(msg: impl Into<String>) -> Self {
        Self::Numerical(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// True for errors raised because the input CSV does not have the
    /// expected shape (missing columns, nothing left after cleaning).
    pub fn is_data_format(&self) -> bool {
        matches!(self, Self::DataFormat(_))
    }
}
