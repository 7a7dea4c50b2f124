//! Shared helpers for building and reading image archives in tests

#![allow(dead_code)]

#[path = "../../src/image/test_support.rs"]
mod fixture;

pub use fixture::*;

use serde_json::Value;

/// The records of one squashed image: VERSION, metadata and layer body.
pub struct SquashedImage {
    pub version: Vec<u8>,
    pub metadata: Value,
    pub body: Vec<u8>,
    pub files: Vec<(String, Vec<u8>)>,
}

pub fn squashed_image(entries: &[(String, Vec<u8>)], id: &str) -> SquashedImage {
    let find = |name: String| {
        entries
            .iter()
            .find(|(path, _)| *path == name)
            .map(|(_, content)| content.clone())
            .unwrap_or_else(|| panic!("missing record {}", name))
    };
    let body = find(format!("{}/layer.tar", id));
    SquashedImage {
        version: find(format!("{}/VERSION", id)),
        metadata: serde_json::from_slice(&find(format!("{}/json", id))).unwrap(),
        files: read_entries(&body),
        body,
    }
}
