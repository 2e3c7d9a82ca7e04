//! Sequential recognition workflow.
//!
//! One attempt encodes the probe image, then walks a registry snapshot in
//! insertion order asking the [`Comparator`] about each face. The first
//! positive answer wins; a comparator error aborts the whole attempt.
//! Every state transition is handed to an observer so callers can show
//! progress without polling.

use crate::codec::{self, CodecError};
use crate::comparator::{Comparator, ComparisonError};
use crate::types::FaceRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    #[error("empty registry")]
    EmptyRegistry,
    #[error("invalid image: {0}")]
    InvalidImage(#[from] CodecError),
    #[error("comparison failed: {0}")]
    Comparison(#[from] ComparisonError),
    #[error("cancelled")]
    Cancelled,
}

/// State of a single recognition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    Encoding,
    /// Waiting on the comparator for the face at `index` of the snapshot.
    Comparing {
        index: usize,
        id: String,
        name: String,
    },
    Matched {
        id: String,
        name: String,
    },
    NoMatch,
    Failed(RecognitionError),
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Matched { .. } | Self::NoMatch | Self::Failed(_))
    }

    /// Stable machine-readable tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Encoding => "encoding",
            Self::Comparing { .. } => "comparing",
            Self::Matched { .. } => "matched",
            Self::NoMatch => "no_match",
            Self::Failed(_) => "failed",
        }
    }

    /// Name of the face involved, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Comparing { name, .. } | Self::Matched { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Encoding => write!(f, "Encoding image..."),
            Self::Comparing { name, .. } => write!(f, "Comparing with {name}..."),
            Self::Matched { name, .. } => write!(f, "Match found: {name}"),
            Self::NoMatch => write!(f, "No match found in the registry."),
            Self::Failed(RecognitionError::EmptyRegistry) => {
                write!(f, "No faces registered. Please register a face first.")
            }
            Self::Failed(err) => write!(f, "An error occurred during recognition: {err}"),
        }
    }
}

/// Serializable rendering of an [`AttemptState`] for progress consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub message: String,
    pub terminal: bool,
}

impl From<&AttemptState> for ProgressReport {
    fn from(state: &AttemptState) -> Self {
        Self {
            status: state.kind().to_string(),
            name: state.name().map(str::to_string),
            message: state.to_string(),
            terminal: state.is_terminal(),
        }
    }
}

/// Shared flag that stops an attempt before its next comparator call.
///
/// An in-flight comparison is never interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs recognition attempts against a comparator.
pub struct Recognizer<'a, C> {
    comparator: &'a C,
    cancel: Option<CancelFlag>,
}

impl<'a, C: Comparator> Recognizer<'a, C> {
    pub fn new(comparator: &'a C) -> Self {
        Self {
            comparator,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Run one attempt and return its terminal state.
    ///
    /// `observer` sees every transition after `Idle`, ending with the
    /// returned terminal state. An empty `gallery` fails before the probe is
    /// encoded or the comparator is contacted.
    pub async fn run<F>(
        &self,
        probe: &[u8],
        media_type: &str,
        gallery: &[FaceRecord],
        mut observer: F,
    ) -> AttemptState
    where
        F: FnMut(&AttemptState),
    {
        let outcome = self.drive(probe, media_type, gallery, &mut observer).await;
        match &outcome {
            AttemptState::Failed(err) => tracing::warn!(error = %err, "recognition failed"),
            state => tracing::info!(status = state.kind(), name = ?state.name(), "recognition finished"),
        }
        observer(&outcome);
        outcome
    }

    async fn drive<F>(
        &self,
        probe: &[u8],
        media_type: &str,
        gallery: &[FaceRecord],
        observer: &mut F,
    ) -> AttemptState
    where
        F: FnMut(&AttemptState),
    {
        if gallery.is_empty() {
            return AttemptState::Failed(RecognitionError::EmptyRegistry);
        }

        observer(&AttemptState::Encoding);
        let probe = match codec::encode(probe, media_type) {
            Ok(image) => image,
            Err(err) => return AttemptState::Failed(err.into()),
        };

        for (index, face) in gallery.iter().enumerate() {
            if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
                return AttemptState::Failed(RecognitionError::Cancelled);
            }

            observer(&AttemptState::Comparing {
                index,
                id: face.id.clone(),
                name: face.name.clone(),
            });
            tracing::debug!(index, name = %face.name, "comparing probe");

            match self.comparator.compare(&probe, &face.image).await {
                Ok(true) => {
                    return AttemptState::Matched {
                        id: face.id.clone(),
                        name: face.name.clone(),
                    }
                }
                Ok(false) => {}
                Err(err) => return AttemptState::Failed(err.into()),
            }
        }

        AttemptState::NoMatch
    }
}
