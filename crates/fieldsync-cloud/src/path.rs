//! Slash-separated document and collection paths.
//!
//! Layout:
//!
//! ```text
//! organizations/{org}                          organization document
//! organizations/{org}/devices/{device}         device record
//! organizations/{org}/devices/{device}/edits   outbound edit documents
//! organizations/{org}/updates                  cloud updates
//! ```

use std::fmt;

use crate::error::{CloudError, Result};

const ORGANIZATIONS: &str = "organizations";
const DEVICES: &str = "devices";
const EDITS: &str = "edits";
const UPDATES: &str = "updates";

/// A path into the cloud store. An even number of segments names a
/// document, an odd number a collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocPath {
    segments: Vec<String>,
}

impl DocPath {
    /// Parse `a/b/c`. Empty segments are rejected.
    pub fn parse(path: &str) -> Result<Self> {
        let segments: Vec<String> = path.split('/').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(CloudError::InvalidPath(path.to_string()));
        }
        Ok(Self { segments })
    }

    fn from_parts(parts: &[&str]) -> Self {
        Self {
            segments: parts.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn organization(org: &str) -> Self {
        Self::from_parts(&[ORGANIZATIONS, org])
    }

    pub fn device(org: &str, device: &str) -> Self {
        Self::from_parts(&[ORGANIZATIONS, org, DEVICES, device])
    }

    pub fn edits_collection(org: &str, device: &str) -> Self {
        Self::from_parts(&[ORGANIZATIONS, org, DEVICES, device, EDITS])
    }

    pub fn edit(org: &str, device: &str, edit_id: &str) -> Self {
        Self::from_parts(&[ORGANIZATIONS, org, DEVICES, device, EDITS, edit_id])
    }

    pub fn updates_collection(org: &str) -> Self {
        Self::from_parts(&[ORGANIZATIONS, org, UPDATES])
    }

    pub fn update(org: &str, doc_id: &str) -> Self {
        Self::from_parts(&[ORGANIZATIONS, org, UPDATES, doc_id])
    }

    /// Append one segment.
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self { segments }
    }

    /// The enclosing collection or document, `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        (self.segments.len() > 1).then(|| Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// The last segment: the document id for a document path.
    pub fn id(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn is_document(&self) -> bool {
        !self.segments.is_empty() && self.segments.len() % 2 == 0
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        assert_eq!(
            DocPath::device("ORG_demo", "DEV_demo").to_string(),
            "organizations/ORG_demo/devices/DEV_demo"
        );
        assert_eq!(
            DocPath::edit("o", "d", "e1").to_string(),
            "organizations/o/devices/d/edits/e1"
        );
        assert_eq!(
            DocPath::update("o", "u1").parent(),
            Some(DocPath::updates_collection("o"))
        );
    }

    #[test]
    fn test_document_vs_collection() {
        assert!(DocPath::organization("o").is_document());
        assert!(!DocPath::updates_collection("o").is_document());
        assert_eq!(DocPath::edits_collection("o", "d").child("x"), DocPath::edit("o", "d", "x"));
        assert_eq!(DocPath::edit("o", "d", "x").id(), "x");
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            DocPath::parse("organizations/o").unwrap(),
            DocPath::organization("o")
        );
        assert!(DocPath::parse("a//b").is_err());
        assert!(DocPath::parse("").is_err());
    }
}
