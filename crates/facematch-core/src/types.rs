use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Image bytes carried as standard base64 text plus the declared media type.
///
/// Only the [`codec`](crate::codec) constructs these, so `mime_type` always
/// starts with `image/`.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct EncodedImage {
    data: String,
    mime_type: String,
}

impl EncodedImage {
    pub(crate) fn new(data: String, mime_type: String) -> Self {
        Self { data, mime_type }
    }

    /// Base64 payload, ready to embed in a JSON request.
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Size of the decoded image in bytes, computed from the base64 length.
    pub fn byte_len(&self) -> usize {
        let padding = self.data.bytes().rev().take_while(|&b| b == b'=').count();
        (self.data.len() / 4) * 3 - padding.min(2)
    }

    /// Render as a `data:` URL for embedding in HTML.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

// Payloads can be megabytes of base64; keep them out of debug output and logs.
impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime_type", &self.mime_type)
            .field("byte_len", &self.byte_len())
            .finish()
    }
}

/// A registered face. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceRecord {
    pub id: String,
    pub name: String,
    pub image: EncodedImage,
    pub registered_at: DateTime<Utc>,
}

impl FaceRecord {
    pub fn summary(&self) -> FaceSummary {
        FaceSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            mime_type: self.image.mime_type().to_string(),
            byte_len: self.image.byte_len(),
            registered_at: self.registered_at,
        }
    }
}

/// Listing view of a [`FaceRecord`] without the image payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceSummary {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub byte_len: usize,
    pub registered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    #[test]
    fn test_byte_len_matches_input_for_all_padding_lengths() {
        for len in 0..10 {
            let bytes = vec![0xABu8; len];
            let image = codec::encode(&bytes, "image/png").unwrap();
            assert_eq!(image.byte_len(), len, "len {len}");
        }
    }

    #[test]
    fn test_data_url() {
        let image = codec::encode(b"abc", "image/jpeg").unwrap();
        assert_eq!(image.to_data_url(), "data:image/jpeg;base64,YWJj");
    }

    #[test]
    fn test_debug_omits_payload() {
        let image = codec::encode(&[7u8; 300], "image/png").unwrap();
        let debug = format!("{image:?}");
        assert!(debug.contains("image/png"));
        assert!(debug.contains("300"));
        assert!(!debug.contains(image.data()));
    }

    #[test]
    fn test_summary_carries_metadata() {
        let record = FaceRecord {
            id: "1".into(),
            name: "Ada".into(),
            image: codec::encode(&[1, 2, 3, 4], "image/webp").unwrap(),
            registered_at: Utc::now(),
        };
        let summary = record.summary();
        assert_eq!(summary.id, "1");
        assert_eq!(summary.name, "Ada");
        assert_eq!(summary.mime_type, "image/webp");
        assert_eq!(summary.byte_len, 4);

        let json = serde_json::to_string(&summary).unwrap();
        let back: FaceSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, summary);
    }
}
