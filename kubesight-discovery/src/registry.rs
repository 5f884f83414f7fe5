//! Registry of discovered resources and the providers scraping them.

use std::collections::HashMap;
use std::sync::Arc;

use kubesight_framework::{ProviderFactory, ProviderHandler};
use parking_lot::Mutex;
use url::Url;

use crate::error::{DiscoveryError, Result};

/// One registered resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub url: Url,
    pub provider: String,
}

/// Result of [`Registry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Same URL as before; nothing was built.
    Unchanged,
    /// First registration for this key.
    Added,
    /// The old provider was removed and a new one installed.
    Replaced,
}

/// Maps resource keys to live providers.
///
/// Every mutation runs entirely under one lock, including the factory call
/// and the handler callbacks, so concurrent register/unregister calls for a
/// key never leave two providers behind.
pub struct Registry {
    factory: Arc<dyn ProviderFactory>,
    handler: Arc<dyn ProviderHandler>,
    entries: Mutex<HashMap<String, Registration>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("factory", &self.factory.name())
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

impl Registry {
    pub fn new(factory: Arc<dyn ProviderFactory>, handler: Arc<dyn ProviderHandler>) -> Self {
        Self {
            factory,
            handler,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// URL currently registered for `key`.
    pub fn registered(&self, key: &str) -> Option<Url> {
        self.entries.lock().get(key).map(|r| r.url.clone())
    }

    pub fn get(&self, key: &str) -> Option<Registration> {
        self.entries.lock().get(key).cloned()
    }

    /// Register `url` for `key`.
    ///
    /// An unchanged URL is a no-op. A changed one unregisters the old
    /// provider before the factory builds the new one; if the build fails the
    /// key is left unregistered.
    pub fn register(&self, key: &str, url: Url) -> Result<RegisterOutcome> {
        let mut entries = self.entries.lock();

        if entries.get(key).is_some_and(|r| r.url == url) {
            return Ok(RegisterOutcome::Unchanged);
        }

        let outcome = match entries.remove(key) {
            Some(old) => {
                tracing::info!(resource = %key, old = %old.url, new = %url, "Scrape URL changed");
                self.handler.delete_provider(&old.provider);
                RegisterOutcome::Replaced
            }
            None => RegisterOutcome::Added,
        };

        let provider = self
            .factory
            .build(&url)
            .map_err(|source| DiscoveryError::Provider {
                resource: key.to_string(),
                source,
            })?;

        let name = provider.name().to_string();
        self.handler.add_provider(provider);
        tracing::info!(resource = %key, provider = %name, "Registered provider");

        entries.insert(key.to_string(), Registration { url, provider: name });
        Ok(outcome)
    }

    /// Remove the registration for `key`. Returns false if there was none.
    pub fn unregister(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        match entries.remove(key) {
            Some(old) => {
                self.handler.delete_provider(&old.provider);
                tracing::info!(resource = %key, provider = %old.provider, "Unregistered provider");
                true
            }
            None => false,
        }
    }

    /// All registrations, sorted by key.
    pub fn entries(&self) -> Vec<(String, Registration)> {
        let mut entries: Vec<_> = self
            .entries
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
