//! Strip the result delimiters from raw model output.
//!
//! The OCR prompt asks the model to wrap recognised text in
//! [`OCR_RESULT_OPEN`]…[`OCR_RESULT_CLOSE`]. Everything else the model says
//! (the "no text" phrase, the content-filter sentinel) passes through
//! untouched apart from whitespace trimming.

use crate::prompts::{OCR_RESULT_CLOSE, OCR_RESULT_OPEN};

/// Remove every delimiter occurrence and trim surrounding whitespace.
pub fn clean_ocr_text(raw: &str) -> String {
    raw.replace(OCR_RESULT_OPEN, "")
        .replace(OCR_RESULT_CLOSE, "")
        .trim()
        .to_string()
}
