//! OCR of a single page image: the model seam and the recovery policy.
//!
//! [`OcrModel`] is the collaborator that turns one image into text. It is
//! constructed once (with credentials) and handed to the [`OcrDriver`], so
//! tests substitute a scripted double and never touch the network.
//!
//! ## Recovery policy
//!
//! | Signal from the model | Driver behaviour |
//! |-----------------------|------------------|
//! | success               | text returned as-is |
//! | rate limited          | wait the cooldown once, retry once; a second rate limit is fatal for the page |
//! | content filtered      | no retry; [`CONTENT_FILTERED_SENTINEL`] becomes the page text |
//! | any other failure     | fatal for the page |
//!
//! There is no retry loop: a provider that keeps rate-limiting
//! after a full cooldown is out of budget, and the document is rerun later.

use crate::config::IngestConfig;
use crate::error::{IngestError, OcrError};
use crate::prompts::{CONTENT_FILTERED_SENTINEL, OCR_INSTRUCTION};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, LlmError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Text returned by one successful model call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OcrResponse {
    pub text: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

impl OcrResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// An external model that reads the text off a page image.
#[async_trait]
pub trait OcrModel: Send + Sync {
    async fn recognize(&self, image: ImageData) -> Result<OcrResponse, OcrError>;
}

/// [`OcrModel`] backed by any edgequake-llm vision provider.
pub struct VisionOcrModel {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl VisionOcrModel {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &IngestConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }
}

#[async_trait]
impl OcrModel for VisionOcrModel {
    async fn recognize(&self, image: ImageData) -> Result<OcrResponse, OcrError> {
        // Single user turn: the instruction text plus the page image.
        let messages = vec![ChatMessage::user_with_images(OCR_INSTRUCTION, vec![image])];

        match self.provider.chat(&messages, Some(&self.options)).await {
            Ok(response) => Ok(OcrResponse {
                text: response.content,
                prompt_tokens: response.prompt_tokens,
                completion_tokens: response.completion_tokens,
            }),
            Err(e) => Err(classify_llm_error(&e)),
        }
    }
}

/// Build `CompletionOptions` from the ingestion config.
fn build_options(config: &IngestConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

// Throttling: HTTP 429 as a whole number, or the wording providers use.
static RE_RATE_LIMITED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b429\b|\brate[ _-]?limit|\btoo many requests\b").unwrap()
});

// Moderation and request rejection: a content-filter finish reason, or a 400
// that is reported as a status (not any 400 that appears in the message).
static RE_CONTENT_FILTERED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bcontent[ _-]?filter|\bcontent management policy\b|\bbad[ _]request\b|\binvalid[ _]request(_error)?\b|\b(status|http|code)\W{0,3}400\b",
    )
    .unwrap()
});

/// Map an edgequake-llm error onto an OCR signal.
///
/// A typed rate limit is taken at its word; everything else is classified
/// from its rendered message, since content-filter finishes arrive folded
/// into `ApiError`.
pub fn classify_llm_error(error: &LlmError) -> OcrError {
    match error {
        LlmError::RateLimited(detail) => OcrError::RateLimited(detail.clone()),
        other => classify_provider_error(&other.to_string()),
    }
}

/// Map a provider error message onto an OCR signal.
///
/// Status codes only count as whole numbers: `4290 tokens` is not a rate
/// limit and `retry after 400 seconds` is not a rejected request. Anything
/// unrecognised (timeouts, 5xx, network errors) is a plain failure.
pub fn classify_provider_error(message: &str) -> OcrError {
    if RE_RATE_LIMITED.is_match(message) {
        OcrError::RateLimited(message.to_string())
    } else if RE_CONTENT_FILTERED.is_match(message) {
        OcrError::ContentFiltered(message.to_string())
    } else {
        OcrError::Failed(message.to_string())
    }
}

/// Raw text for one page, plus how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub raw: String,
    pub blocked: bool,
    pub retries: u8,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

impl PageText {
    fn recognized(response: OcrResponse, retries: u8) -> Self {
        Self {
            raw: response.text,
            blocked: false,
            retries,
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
        }
    }

    fn blocked(retries: u8) -> Self {
        Self {
            raw: CONTENT_FILTERED_SENTINEL.to_string(),
            blocked: true,
            retries,
            prompt_tokens: 0,
            completion_tokens: 0,
        }
    }
}

/// Applies the recovery policy around an [`OcrModel`].
#[derive(Clone)]
pub struct OcrDriver {
    model: Arc<dyn OcrModel>,
    cooldown: Duration,
}

impl OcrDriver {
    pub fn new(model: Arc<dyn OcrModel>, cooldown: Duration) -> Self {
        Self { model, cooldown }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// OCR one page. `page_num` is only used for logs and error context.
    pub async fn recognize_page(
        &self,
        page_num: usize,
        image: ImageData,
    ) -> Result<PageText, IngestError> {
        let start = Instant::now();

        let first = self.model.recognize(image.clone()).await;
        let result = match first {
            Ok(response) => Ok(PageText::recognized(response, 0)),
            Err(OcrError::ContentFiltered(detail)) => {
                warn!("Page {}: blocked by content filtering: {}", page_num, detail);
                Ok(PageText::blocked(0))
            }
            Err(OcrError::RateLimited(detail)) => {
                warn!(
                    "Page {}: hit rate limit ({}), waiting {}s before retrying",
                    page_num,
                    detail,
                    self.cooldown.as_secs()
                );
                sleep(self.cooldown).await;
                self.retry(page_num, image).await
            }
            Err(OcrError::Failed(detail)) => Err(IngestError::OcrFailed {
                page: page_num,
                detail,
            }),
        };

        if let Ok(ref text) = result {
            debug!(
                "Page {}: {} chars, {} input tokens, {} output tokens, {:?}",
                page_num,
                text.raw.len(),
                text.prompt_tokens,
                text.completion_tokens,
                start.elapsed()
            );
        }
        result
    }

    /// The single retry after a rate-limit cooldown.
    async fn retry(&self, page_num: usize, image: ImageData) -> Result<PageText, IngestError> {
        match self.model.recognize(image).await {
            Ok(response) => Ok(PageText::recognized(response, 1)),
            Err(OcrError::ContentFiltered(detail)) => {
                warn!(
                    "Page {}: blocked by content filtering on retry: {}",
                    page_num, detail
                );
                Ok(PageText::blocked(1))
            }
            Err(OcrError::RateLimited(detail)) => Err(IngestError::RateLimitExhausted {
                page: page_num,
                cooldown_secs: self.cooldown.as_secs(),
                detail,
            }),
            Err(OcrError::Failed(detail)) => Err(IngestError::OcrFailed {
                page: page_num,
                detail,
            }),
        }
    }
}
