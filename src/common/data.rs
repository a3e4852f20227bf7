use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One or more values recorded for a single header name.
///
/// Corpus files may spell a single-valued header as a plain string; headers
/// that appeared multiple times in the recorded exchange are spelled as a
/// sequence. Value order is preserved as recorded.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum HeaderValues {
    Single(String),
    Multiple(Vec<String>),
}

impl HeaderValues {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        match self {
            HeaderValues::Single(value) => std::slice::from_ref(value).iter(),
            HeaderValues::Multiple(values) => values.iter(),
        }
        .map(|v| v.as_str())
    }
}

/// Headers of a recorded request or response.
///
/// A `BTreeMap` keeps name iteration order deterministic regardless of the
/// order the corpus file listed them in.
pub type HeaderMap = BTreeMap<String, HeaderValues>;

/// Looks up a header by name, ignoring ASCII case, and returns its values
/// joined by newline. Missing headers yield an empty string.
pub fn joined_header_values(headers: &HeaderMap, name: &str) -> String {
    headers
        .iter()
        .find(|(recorded_name, _)| recorded_name.eq_ignore_ascii_case(name))
        .map(|(_, values)| values.iter().collect::<Vec<_>>().join("\n"))
        .unwrap_or_default()
}

/// The request half of a recorded interaction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HeaderMap,
    #[serde(default)]
    pub body: String,
}

/// The response half of a recorded interaction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ResponseRecord {
    pub status: u16,
    #[serde(default)]
    pub headers: HeaderMap,
    #[serde(default)]
    pub body: String,
}

/// An immutable request/response pair loaded from the corpus.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RecordedInteraction {
    pub request: RequestRecord,
    pub response: ResponseRecord,
}
