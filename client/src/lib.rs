pub mod client;

pub use client::{Account, Client, Health};
pub use futures::future::{AbortHandle, AbortRegistration};

use thiserror::Error;

/// Error type for client operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("failed: {status}: {body}")]
    FailedWithBody {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("too many transactions in one submission: {got} (max {max})")]
    TooManyTransactions { max: usize, got: usize },
    #[error("empty submission")]
    EmptySubmission,
    #[error("invalid data: {0}")]
    InvalidData(#[from] commonware_codec::Error),
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid URL scheme: {0} (expected http or https)")]
    InvalidScheme(String),
    #[error("timed out waiting for receipt")]
    Timeout,
    #[error("cancelled")]
    Cancelled,
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
