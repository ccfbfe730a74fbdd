//! Resource data model (spec.md §3).

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTemplate {
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextResourceContents {
    pub uri: String,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobResourceContents {
    pub uri: String,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Base64-encoded octets.
    pub blob: String,
}

/// Discriminated on deserialization by field presence: `"text"` present →
/// text variant, `"blob"` present → blob variant, neither → fatal parse
/// error (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceContents {
    Text(TextResourceContents),
    Blob(BlobResourceContents),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_contents_discriminated_by_field() {
        let v = json!({"uri": "file:///a.txt", "text": "hi"});
        let rc: ResourceContents = serde_json::from_value(v).unwrap();
        assert!(matches!(rc, ResourceContents::Text(_)));
    }

    #[test]
    fn blob_contents_discriminated_by_field() {
        let v = json!({"uri": "file:///a.bin", "blob": "QUJD"});
        let rc: ResourceContents = serde_json::from_value(v).unwrap();
        assert!(matches!(rc, ResourceContents::Blob(_)));
    }

    #[test]
    fn neither_field_is_a_parse_error() {
        let v = json!({"uri": "file:///a.bin"});
        let rc: Result<ResourceContents, _> = serde_json::from_value(v);
        assert!(rc.is_err());
    }
}
