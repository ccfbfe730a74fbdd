//! Root data model (spec.md §3, §4.5).

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Root {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The literal prefix every root URI must begin with (spec.md §3).
pub const ROOT_URI_PREFIX: &str = "file://";

#[derive(Debug, thiserror::Error)]
#[error("root uri {0:?} does not start with {ROOT_URI_PREFIX:?}")]
pub struct InvalidRootUri(pub String);

impl Root {
    pub fn validate(&self) -> Result<(), InvalidRootUri> {
        if self.uri.starts_with(ROOT_URI_PREFIX) {
            Ok(())
        } else {
            Err(InvalidRootUri(self.uri.clone()))
        }
    }
}

/// Validate a whole batch atomically: either every root is valid, or none
/// of them are accepted (spec.md §4.5 "Roots", P7 in §8).
pub fn validate_roots(roots: &[Root]) -> Result<(), InvalidRootUri> {
    for root in roots {
        root.validate()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_file_uri() {
        let root = Root {
            uri: "file:///a".to_string(),
            name: None,
        };
        assert!(root.validate().is_ok());
    }

    #[test]
    fn rejects_non_file_uri() {
        let root = Root {
            uri: "invalid:///x".to_string(),
            name: None,
        };
        assert!(root.validate().is_err());
    }

    #[test]
    fn batch_validation_fails_if_any_entry_is_invalid() {
        let roots = vec![
            Root {
                uri: "file:///a".to_string(),
                name: None,
            },
            Root {
                uri: "invalid:///x".to_string(),
                name: None,
            },
        ];
        assert!(validate_roots(&roots).is_err());
    }
}
