//! Maps a raw classifier output to the `[url, label, message]` triple shown
//! to users.

use crate::classifier::{LEGITIMATE_CLASS, PHISHING_CLASS};
use crate::shortener::LinkShortener;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const ERROR_MESSAGE: &str = "Error in processing";

#[derive(Debug, Error, PartialEq)]
pub enum ConvertError {
    #[error("unknown prediction class {0}")]
    UnknownClass(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Safe,
    NotSafe,
}

impl Verdict {
    pub fn from_class(class: i64) -> Result<Self, ConvertError> {
        match class {
            LEGITIMATE_CLASS => Ok(Verdict::Safe),
            PHISHING_CLASS => Ok(Verdict::NotSafe),
            other => Err(ConvertError::UnknownClass(other)),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Verdict::Safe => "Safe",
            Verdict::NotSafe => "Not Safe",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Verdict::Safe => "Continue",
            Verdict::NotSafe => "Still want to Continue",
        }
    }
}

/// Serialized as a 3-element JSON array: `[display_url, label, message]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String, String)", into = "(String, String, String)")]
pub struct ConversionResult {
    pub display_url: String,
    pub label: String,
    pub message: String,
}

impl ConversionResult {
    pub fn new(display_url: impl Into<String>, verdict: Verdict) -> Self {
        Self {
            display_url: display_url.into(),
            label: verdict.label().to_string(),
            message: verdict.message().to_string(),
        }
    }

    /// Result reported for a URL whose processing failed
    pub fn processing_error(url: &str) -> Self {
        Self {
            display_url: url.to_string(),
            label: Verdict::NotSafe.label().to_string(),
            message: ERROR_MESSAGE.to_string(),
        }
    }

    pub fn is_safe(&self) -> bool {
        self.label == Verdict::Safe.label()
    }
}

impl From<(String, String, String)> for ConversionResult {
    fn from((display_url, label, message): (String, String, String)) -> Self {
        Self {
            display_url,
            label,
            message,
        }
    }
}

impl From<ConversionResult> for (String, String, String) {
    fn from(result: ConversionResult) -> Self {
        (result.display_url, result.label, result.message)
    }
}

pub struct LabelConverter {
    shortener: Option<Arc<dyn LinkShortener>>,
    shorten_timeout: Duration,
}

impl LabelConverter {
    pub fn new(shortener: Option<Arc<dyn LinkShortener>>, shorten_timeout: Duration) -> Self {
        Self {
            shortener,
            shorten_timeout,
        }
    }

    /// Converter that always displays the original URL
    pub fn plain() -> Self {
        Self::new(None, Duration::from_secs(0))
    }

    pub async fn convert(&self, url: &str, class: i64) -> Result<ConversionResult, ConvertError> {
        let verdict = Verdict::from_class(class)?;
        let display_url = self.display_url(url).await;
        Ok(ConversionResult::new(display_url, verdict))
    }

    async fn display_url(&self, url: &str) -> String {
        let Some(shortener) = &self.shortener else {
            return url.to_string();
        };

        match tokio::time::timeout(self.shorten_timeout, shortener.shorten(url)).await {
            Ok(Ok(short)) => short,
            Ok(Err(e)) => {
                log::debug!("Shortening failed for {url}: {e}");
                url.to_string()
            }
            Err(_) => {
                log::debug!("Shortening timed out for {url}");
                url.to_string()
            }
        }
    }
}
