//! facematch-core — Face registry and recognition workflow.
//!
//! Recognition itself is delegated to an external [`Comparator`]; this crate
//! owns the image codec, the ordered registry and the first-match-wins
//! comparison loop that drives the comparator.

pub mod codec;
pub mod comparator;
pub mod recognizer;
pub mod registry;
pub mod types;

pub use codec::CodecError;
pub use comparator::{parse_verdict, Comparator, ComparisonError, COMPARISON_PROMPT};
pub use recognizer::{AttemptState, CancelFlag, ProgressReport, RecognitionError, Recognizer};
pub use registry::{FaceRegistry, ValidationError};
pub use types::{EncodedImage, FaceRecord, FaceSummary};
