mod code;
mod error;

pub use code::{download_code, encode_term};
pub use error::TtPlayerError;

use async_trait::async_trait;
use error::Result;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use rhythmcat_core::{CoreError, LyricCandidate, LyricCrawler, LyricQuery};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Name used in `[lyrics] crawlers`
pub const CRAWLER_NAME: &str = "ttplayer";

const DEFAULT_BASE_URL: &str = "http://ttlrcct.qianqian.com/dll/lyricsvr.dll";

/// Default timeout for HTTP requests (10 seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Default number of retry attempts
const DEFAULT_MAX_RETRIES: u32 = 3;

/// One `<lrc>` entry of a search response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub id: String,
    pub artist: String,
    pub title: String,
}

/// TTPlayer lyric server crawler
pub struct TtPlayerCrawler {
    client: ClientWithMiddleware,
    base_url: String,
}

impl TtPlayerCrawler {
    /// Create a crawler for the public server with a 10-second timeout and 3 retries.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> std::result::Result<Self, CoreError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a crawler for a server at `base_url` (the `lyricsvr.dll` endpoint).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_base_url(base_url: impl Into<String>) -> std::result::Result<Self, CoreError> {
        let base_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .user_agent("RhythmCat/2 (https://github.com/supercatexpert/RhythmCat2)")
            .build()
            .map_err(TtPlayerError::from)?;

        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(DEFAULT_MAX_RETRIES);
        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    #[must_use]
    pub fn search_url(&self, query: &LyricQuery) -> String {
        format!(
            "{}?sh?Artist={}&Title={}&Flags=0",
            self.base_url,
            encode_term(&query.artist),
            encode_term(&query.title)
        )
    }

    #[must_use]
    pub fn download_url(&self, id: u32, artist: &str, title: &str) -> String {
        format!(
            "{}?dl?Id={}&Code={}",
            self.base_url,
            id,
            download_code(id, artist, title)
        )
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        debug!("TTPlayer GET: {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!("TTPlayer returned status: {}", status);
            return Err(TtPlayerError::Status { status });
        }
        Ok(response.text().await?)
    }

    async fn search_hits(&self, query: &LyricQuery) -> Result<Vec<SearchHit>> {
        let body = self.get_text(&self.search_url(query)).await?;
        parse_search_response(&body)
    }

    async fn download_lyrics(&self, candidate: &LyricCandidate) -> Result<String> {
        let id: u32 = candidate
            .id
            .trim()
            .parse()
            .map_err(|_| TtPlayerError::InvalidId {
                id: candidate.id.clone(),
            })?;
        let url = candidate
            .url
            .clone()
            .unwrap_or_else(|| self.download_url(id, &candidate.artist, &candidate.title));

        let text = self.get_text(&url).await?;
        if text.trim().is_empty() {
            return Err(TtPlayerError::EmptyLyrics);
        }
        Ok(text.trim_start_matches('\u{feff}').to_string())
    }
}

/// Parse `<result><lrc id="…" artist="…" title="…"/>…</result>`.
///
/// Entries without an id are skipped.
///
/// # Errors
///
/// Returns an XML error if the document is malformed.
pub fn parse_search_response(xml: &str) -> Result<Vec<SearchHit>> {
    let mut reader = Reader::from_str(xml);
    let mut hits = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(element) | Event::Empty(element) if element.name().as_ref() == b"lrc" => {
                let mut hit = SearchHit {
                    id: String::new(),
                    artist: String::new(),
                    title: String::new(),
                };
                for attribute in element.attributes() {
                    let attribute = attribute.map_err(quick_xml::Error::from)?;
                    let value = attribute.unescape_value()?.into_owned();
                    match attribute.key.as_ref() {
                        b"id" => hit.id = value,
                        b"artist" => hit.artist = value,
                        b"title" => hit.title = value,
                        _ => {}
                    }
                }
                if hit.id.is_empty() {
                    debug!("Skipping TTPlayer result without id");
                } else {
                    hits.push(hit);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(hits)
}

#[async_trait]
impl LyricCrawler for TtPlayerCrawler {
    fn name(&self) -> &'static str {
        CRAWLER_NAME
    }

    async fn search(&self, query: &LyricQuery) -> std::result::Result<Vec<LyricCandidate>, CoreError> {
        info!(
            "Searching TTPlayer for: {} - {}",
            query.artist, query.title
        );
        let hits = self.search_hits(query).await?;
        info!("TTPlayer returned {} result(s)", hits.len());

        Ok(hits
            .into_iter()
            .map(|hit| {
                let url = hit
                    .id
                    .parse::<u32>()
                    .ok()
                    .map(|id| self.download_url(id, &hit.artist, &hit.title));
                LyricCandidate {
                    provider: CRAWLER_NAME.to_string(),
                    id: hit.id,
                    title: hit.title,
                    artist: hit.artist,
                    url,
                }
            })
            .collect())
    }

    async fn download(&self, candidate: &LyricCandidate) -> std::result::Result<String, CoreError> {
        info!(
            "Downloading TTPlayer lyrics {} ({} - {})",
            candidate.id, candidate.artist, candidate.title
        );
        Ok(self.download_lyrics(candidate).await?)
    }
}
