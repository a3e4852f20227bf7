use std::path::PathBuf;

use crate::server::keys::{
    KeyError, KeyProviderRegistry, KeySource, METHOD_KEY, URL_KEY,
};
use crate::server::server::{Error, ReplayServer};

/// Builder for [`ReplayServer`].
///
/// ```no_run
/// use httpreplay::server::ReplayServerBuilder;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let server = ReplayServerBuilder::new()
///     .port(5050)
///     .trips_dir("recordings/")
///     .index_keys(["URL", "Method"])
///     .build()?;
/// let handle = server.start().await?;
/// handle.wait().await;
/// # Ok(())
/// # }
/// ```
pub struct ReplayServerBuilder {
    port: u16,
    expose: bool,
    trips_dir: Option<PathBuf>,
    index_keys: Vec<String>,
    print_access_log: bool,
    registry: KeyProviderRegistry,
}

impl ReplayServerBuilder {
    pub fn new() -> Self {
        ReplayServerBuilder {
            port: 0,
            expose: false,
            trips_dir: None,
            index_keys: vec![URL_KEY.to_string(), METHOD_KEY.to_string()],
            print_access_log: true,
            registry: KeyProviderRegistry::new(),
        }
    }

    /// TCP port to listen on; 0 picks an ephemeral port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Bind on all interfaces instead of loopback.
    pub fn expose(mut self, expose: bool) -> Self {
        self.expose = expose;
        self
    }

    /// Directory holding the recorded interaction files.
    pub fn trips_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.trips_dir = Some(dir.into());
        self
    }

    /// Ordered key names the identity of every request is built from.
    /// The same list indexes the corpus and matches live requests.
    pub fn index_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.index_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn print_access_log(mut self, enabled: bool) -> Self {
        self.print_access_log = enabled;
        self
    }

    /// Registers an additional named key provider next to the built-ins.
    pub fn key_provider<P>(mut self, name: &str, provider: P) -> Self
    where
        P: Fn(&KeySource) -> Result<String, KeyError> + Send + Sync + 'static,
    {
        self.registry.register(name, provider);
        self
    }

    pub fn build(self) -> Result<ReplayServer, Error> {
        let trips_dir = self
            .trips_dir
            .ok_or_else(|| Error::Config("no corpus directory configured".to_string()))?;
        if self.index_keys.is_empty() {
            return Err(Error::Config("index key list must not be empty".to_string()));
        }
        // Surface a misspelled key name now rather than on the first request.
        for key in &self.index_keys {
            if self.registry.provider(key).is_none() {
                return Err(Error::Key(KeyError::UnknownKey {
                    key: key.clone(),
                    available: self.registry.key_names(),
                }));
            }
        }

        Ok(ReplayServer {
            port: self.port,
            expose: self.expose,
            trips_dir,
            index_keys: self.index_keys,
            print_access_log: self.print_access_log,
            registry: self.registry,
        })
    }
}

impl Default for ReplayServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_requires_a_corpus_directory() {
        let err = ReplayServerBuilder::new().build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn build_rejects_an_empty_key_list() {
        let err = ReplayServerBuilder::new()
            .trips_dir("recordings/")
            .index_keys(Vec::<String>::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn build_rejects_unknown_index_keys_up_front() {
        let err = ReplayServerBuilder::new()
            .trips_dir("recordings/")
            .index_keys(["URL", "Fingerprint"])
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Key(KeyError::UnknownKey { key, .. }) if key == "Fingerprint"
        ));
    }

    #[test]
    fn custom_key_providers_are_valid_index_keys() {
        let server = ReplayServerBuilder::new()
            .trips_dir("recordings/")
            .key_provider("Fingerprint", |_source: &KeySource| Ok("static".to_string()))
            .index_keys(["Fingerprint"])
            .build()
            .unwrap();
        assert_eq!(server.index_keys, vec!["Fingerprint"]);
    }
}
