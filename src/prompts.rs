//! Prompt text and fixed strings exchanged with the OCR model.
//!
//! Every string the pipeline sends to, or expects back from, the model
//! lives here so the cleaner, the driver and the tests agree on one copy.

/// Opening delimiter the model wraps recognised text in.
pub const OCR_RESULT_OPEN: &str = "<ocr_result>";

/// Closing delimiter the model wraps recognised text in.
pub const OCR_RESULT_CLOSE: &str = "</ocr_result>";

/// Phrase the model answers with when a page carries no text.
pub const NO_TEXT_DETECTED: &str = "No text detected in the image.";

/// Raw text substituted for a page the provider refused to process.
pub const CONTENT_FILTERED_SENTINEL: &str = "<OUTPUT BLOCKED BY CONTENT FILTERING POLICY>";

/// Instruction sent alongside each page image.
pub const OCR_INSTRUCTION: &str = r#"Image for OCR is attached.

Please use an OCR tool or library to recognize and extract any text contained in the image. If the
image does not contain any recognizable text, simply respond "No text detected in the image."

If text is successfully extracted from the image, format the output as follows:
<ocr_result>
Extracted text goes here
</ocr_result>

Do not include any other explanatory text or notes in your response, only the extracted text inside
the <ocr_result> tags. If no text is detected, respond with only "No text detected in the image.""#;
