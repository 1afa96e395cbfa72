use crate::storage::base::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Captcha error: {0}")]
    CaptchaError(String),

    #[error("Extraction error: {0}")]
    ExtractionError(String),
}

impl ScraperError {
    /// Setup failures that must stop the process instead of being absorbed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScraperError::ConnectionError(_)
                | ScraperError::ConfigError(_)
                | ScraperError::StorageError(StorageError::Connection(_))
        )
    }
}

pub type ScraperResult<T> = Result<T, ScraperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ScraperError::ConnectionError("down".into()).is_fatal());
        assert!(ScraperError::ConfigError("missing uri".into()).is_fatal());
        assert!(ScraperError::StorageError(StorageError::Connection("ping".into())).is_fatal());
        assert!(!ScraperError::CaptchaError("unsolved".into()).is_fatal());
        assert!(!ScraperError::StorageError(StorageError::Operation("write".into())).is_fatal());
    }
}
