//! Contract for the external same-person judgment service.

use crate::types::EncodedImage;
use std::future::Future;
use thiserror::Error;

/// Instruction sent alongside both images. The comparator must answer with
/// exactly one of the two literal tokens.
pub const COMPARISON_PROMPT: &str = "Analyze the two images provided. Is the person in the first image the same individual as the person in the second image? Your entire response must be only the word 'Yes' or 'No'.";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComparisonError {
    #[error("comparator unavailable: {0}")]
    Unavailable(String),
    #[error("comparator API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("comparator returned no judgment")]
    EmptyResponse,
    #[error("comparator returned an ambiguous judgment: {0:?}")]
    Ambiguous(String),
    #[error("malformed comparator response: {0}")]
    Malformed(String),
}

/// Decides whether two images depict the same individual.
///
/// Both images are submitted for joint analysis. Implementations own any
/// retry or rate-limit policy; callers treat every error as final.
pub trait Comparator {
    fn compare(
        &self,
        first: &EncodedImage,
        second: &EncodedImage,
    ) -> impl Future<Output = Result<bool, ComparisonError>> + Send;
}

/// Strictly map a model answer to a verdict.
///
/// Only `yes` or `no` (ASCII case-insensitive, surrounding whitespace ignored)
/// are accepted. Extra words or punctuation are rejected, not guessed at.
pub fn parse_verdict(text: &str) -> Result<bool, ComparisonError> {
    let answer = text.trim();
    if answer.is_empty() {
        return Err(ComparisonError::EmptyResponse);
    }
    if answer.eq_ignore_ascii_case("yes") {
        Ok(true)
    } else if answer.eq_ignore_ascii_case("no") {
        Ok(false)
    } else {
        Err(ComparisonError::Ambiguous(answer.to_string()))
    }
}
