//! Attachment encoding for rendered rasters.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::EncodeError;

/// Media type of every attachment the pipeline produces.
pub const PNG_MEDIA_TYPE: &str = "image/png";

/// Payload encoding of every attachment the pipeline produces.
pub const BASE64_ENCODING: &str = "base64";

const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// A rendered visualization, ready to hand to the chat client.
///
/// Serializes as `{"mediaType", "encoding", "payload", "name"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub media_type: String,
    pub encoding: String,
    /// Base64 of the PNG bytes.
    pub payload: String,
    /// `visualization_<n>.png`, n counting successful snippets from 1.
    pub name: String,
}

impl Attachment {
    /// `data:image/png;base64,...` URI for inline display.
    pub fn data_uri(&self) -> String {
        format!("data:{};{},{}", self.media_type, self.encoding, self.payload)
    }

    /// Markdown image embedding the attachment, alt text from the name's stem.
    pub fn markdown_image(&self) -> String {
        let stem = self
            .name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.name);
        format!("![{}]({})", stem, self.data_uri())
    }

    /// The raw PNG bytes.
    pub fn decode(&self) -> Result<Vec<u8>, EncodeError> {
        Ok(STANDARD.decode(&self.payload)?)
    }
}

/// Attachment name for the `n`th successful snippet (1-based).
pub fn attachment_name(n: usize) -> String {
    format!("visualization_{}.png", n)
}

/// Wrap PNG bytes as the `n`th attachment of a message.
pub fn encode_attachment(raster: &[u8], n: usize) -> Result<Attachment, EncodeError> {
    if !raster.starts_with(&PNG_SIGNATURE) {
        return Err(EncodeError::NotPng { len: raster.len() });
    }

    Ok(Attachment {
        media_type: PNG_MEDIA_TYPE.to_string(),
        encoding: BASE64_ENCODING.to_string(),
        payload: STANDARD.encode(raster),
        name: attachment_name(n),
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn fake_png() -> Vec<u8> {
        let mut data = PNG_SIGNATURE.to_vec();
        data.extend_from_slice(b"\0\0\0\rIHDR");
        data
    }

    #[test]
    fn test_encode_names_and_fields() {
        let attachment = encode_attachment(&fake_png(), 2).unwrap();
        assert_eq!(attachment.name, "visualization_2.png");
        assert_eq!(attachment.media_type, "image/png");
        assert_eq!(attachment.encoding, "base64");
        assert_eq!(attachment.decode().unwrap(), fake_png());
    }

    #[test]
    fn test_rejects_non_png() {
        let err = encode_attachment(b"GIF89a....", 1).unwrap_err();
        assert!(matches!(err, EncodeError::NotPng { len: 10 }));
        assert!(encode_attachment(&[], 1).is_err());
    }

    #[test]
    fn test_serializes_camel_case() {
        let attachment = encode_attachment(&fake_png(), 1).unwrap();
        let json = serde_json::to_value(&attachment).unwrap();
        assert_eq!(json["mediaType"], "image/png");
        assert_eq!(json["encoding"], "base64");
        assert_eq!(json["name"], "visualization_1.png");
        assert!(json.get("media_type").is_none());
    }

    #[test]
    fn test_markdown_image_uses_stem() {
        let attachment = encode_attachment(&fake_png(), 3).unwrap();
        let markdown = attachment.markdown_image();
        assert!(markdown.starts_with("![visualization_3](data:image/png;base64,iVBORw0KGgo"));
        assert!(markdown.ends_with(')'));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let attachment = Attachment {
            media_type: PNG_MEDIA_TYPE.to_string(),
            encoding: BASE64_ENCODING.to_string(),
            payload: "not base64!!".to_string(),
            name: attachment_name(1),
        };
        assert!(matches!(attachment.decode(), Err(EncodeError::Base64(_))));
    }
}
