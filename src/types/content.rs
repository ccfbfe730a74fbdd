//! Polymorphic content variants (spec.md §3, §9 "Polymorphic content").
//!
//! Discriminated by a `"type"` tag on the wire. An unknown discriminator is
//! a hard deserialization failure — callers must not silently coerce it.

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text {
        text: String,
    },
    Image {
        /// Base64-encoded image bytes.
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: EmbeddedResource,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddedResource {
    Text(super::resources::TextResourceContents),
    Blob(super::resources::BlobResourceContents),
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text { text: text.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_content_round_trips() {
        let c = Content::text("hello");
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v, json!({"type": "text", "text": "hello"}));
        let back: Content = serde_json::from_value(v).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn unknown_discriminator_is_fatal() {
        let v = json!({"type": "video", "url": "https://example.com"});
        let parsed: Result<Content, _> = serde_json::from_value(v);
        assert!(parsed.is_err());
    }

    #[test]
    fn image_content_round_trips() {
        let v = json!({"type": "image", "data": "QUJD", "mimeType": "image/png"});
        let c: Content = serde_json::from_value(v.clone()).unwrap();
        assert!(matches!(c, Content::Image { .. }));
        assert_eq!(serde_json::to_value(&c).unwrap(), v);
    }
}
