use std::collections::BTreeMap;
use std::fmt;

use http::{HeaderMap, Method, Uri};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use thiserror::Error;

use crate::common::data::{joined_header_values, RequestRecord};

pub const URL_KEY: &str = "URL";
pub const METHOD_KEY: &str = "Method";
pub const COOKIE_KEY: &str = "Cookie";
pub const CONTENT_TYPE_KEY: &str = "Content-Type";
pub const BODY_KEY: &str = "Body";

/// Separator between the extracted values of a composite identity.
pub const IDENTITY_SEPARATOR: &str = ",";

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("unsupported key: {key}, available: [{}]", .available.join(","))]
    UnknownKey { key: String, available: Vec<String> },
    #[error("key provider {0} does not support this request representation")]
    UnsupportedSource(&'static str),
    #[error("failed to read body of {uri}: {reason}")]
    BodyRead { uri: String, reason: String },
}

/// An inbound request materialized far enough to take part in identity
/// computation: the body has already been collected.
#[derive(Debug)]
pub struct LiveRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: String,
}

impl LiveRequest {
    /// Collects an inbound hyper request into a [`LiveRequest`].
    ///
    /// A request advertising `Content-Length: 0` short-circuits without
    /// touching the body stream. A failed body read degrades only this
    /// request ([`KeyError::BodyRead`]).
    pub async fn materialize(req: http::Request<Incoming>) -> Result<Self, KeyError> {
        let (parts, body) = req.into_parts();

        let declared_empty = parts
            .headers
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            == Some(0);

        let body = if declared_empty {
            String::new()
        } else {
            match body.collect().await {
                Ok(collected) => String::from_utf8_lossy(&collected.to_bytes()).into_owned(),
                Err(e) => {
                    return Err(KeyError::BodyRead {
                        uri: parts.uri.to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        };

        Ok(LiveRequest {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
        })
    }

    fn joined_header_values(&self, name: &str) -> String {
        self.headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The two request representations identity keys can be extracted from.
/// The same configured key list is applied to recorded requests at index
/// time and to live requests at serve time, so both must resolve to the
/// same value for equivalent requests.
pub enum KeySource<'a> {
    Recorded(&'a RequestRecord),
    Live(&'a LiveRequest),
}

impl fmt::Debug for KeySource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Recorded(r) => write!(f, "Recorded({} {})", r.method, r.url),
            KeySource::Live(r) => write!(f, "Live({} {})", r.method, r.uri),
        }
    }
}

/// Extracts one named request attribute as a string.
pub type KeyProvider = Box<dyn Fn(&KeySource) -> Result<String, KeyError> + Send + Sync>;

/// Registry of named key providers plus the composite identity builder.
///
/// The built-in providers (`URL`, `Method`, `Cookie`, `Content-Type`,
/// `Body`) are installed on construction; arbitrary additional providers
/// can be registered without touching identity computation.
pub struct KeyProviderRegistry {
    providers: BTreeMap<String, KeyProvider>,
}

impl KeyProviderRegistry {
    pub fn new() -> Self {
        let mut registry = KeyProviderRegistry {
            providers: BTreeMap::new(),
        };

        registry.register(URL_KEY, |source| {
            Ok(match source {
                KeySource::Recorded(request) => strip_scheme_and_host(&request.url).to_string(),
                KeySource::Live(request) => {
                    strip_scheme_and_host(&request.uri.to_string()).to_string()
                }
            })
        });

        registry.register(METHOD_KEY, |source| {
            Ok(match source {
                KeySource::Recorded(request) => request.method.clone(),
                KeySource::Live(request) => request.method.to_string(),
            })
        });

        registry.register(COOKIE_KEY, header_provider(COOKIE_KEY));
        registry.register(CONTENT_TYPE_KEY, header_provider(CONTENT_TYPE_KEY));

        registry.register(BODY_KEY, |source| {
            Ok(match source {
                KeySource::Recorded(request) => request.body.clone(),
                KeySource::Live(request) => request.body.clone(),
            })
        });

        registry
    }

    /// Installs `provider` under `name`, replacing any previous provider
    /// registered under the same name.
    pub fn register<P>(&mut self, name: &str, provider: P)
    where
        P: Fn(&KeySource) -> Result<String, KeyError> + Send + Sync + 'static,
    {
        self.providers.insert(name.to_string(), Box::new(provider));
    }

    pub fn provider(&self, name: &str) -> Option<&KeyProvider> {
        self.providers.get(name)
    }

    /// Registered key names in sorted order, for diagnostics.
    pub fn key_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Builds the composite identity of `source` by extracting each key in
    /// `index_keys` in order and joining the values with `,`.
    ///
    /// The result is a pure function of the key list and the request's
    /// configured attributes; unrelated headers and their ordering never
    /// influence it.
    pub fn build_identity(
        &self,
        index_keys: &[String],
        source: &KeySource,
    ) -> Result<String, KeyError> {
        let mut values = Vec::with_capacity(index_keys.len());
        for key in index_keys {
            let provider = self.provider(key).ok_or_else(|| KeyError::UnknownKey {
                key: key.clone(),
                available: self.key_names(),
            })?;
            values.push(provider(source)?);
        }
        Ok(values.join(IDENTITY_SEPARATOR))
    }
}

impl Default for KeyProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Provider extracting the values of one header, joined by newline.
fn header_provider(name: &'static str) -> impl Fn(&KeySource) -> Result<String, KeyError> {
    move |source| {
        Ok(match source {
            KeySource::Recorded(request) => joined_header_values(&request.headers, name),
            KeySource::Live(request) => request.joined_header_values(name),
        })
    }
}

/// Strips the scheme and host from a recorded URL, leaving path and query.
///
/// The scheme ends at the first `://`; the host ends at the first `/` after
/// it. A URL that already starts with `/` is returned unchanged.
fn strip_scheme_and_host(url: &str) -> &str {
    let url = match url.find("://") {
        Some(index) => &url[index + 3..],
        None => url,
    };
    match url.find('/') {
        Some(index) if index > 0 => &url[index..],
        _ => url,
    }
}
