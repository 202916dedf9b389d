use rhythmcat_core::CoreError;
use thiserror::Error;

/// Errors raised while talking to the TTPlayer lyric server.
#[derive(Debug, Error)]
pub enum TtPlayerError {
    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// A request failed after the retry middleware gave up.
    #[error("Request failed: {0}")]
    Request(#[from] reqwest_middleware::Error),

    /// The server answered with a non-success status.
    #[error("Server returned status {status}")]
    Status { status: reqwest::StatusCode },

    /// The search response was not the expected XML.
    #[error("Malformed search response: {0}")]
    Xml(#[from] quick_xml::Error),

    /// A search hit carried an id that is not a number.
    #[error("Invalid lyric id: {id}")]
    InvalidId { id: String },

    /// The download succeeded but contained no lyrics.
    #[error("Empty lyric document")]
    EmptyLyrics,
}

impl From<TtPlayerError> for CoreError {
    fn from(err: TtPlayerError) -> Self {
        Self::CrawlerFailed {
            crawler: crate::CRAWLER_NAME.to_string(),
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TtPlayerError>;
