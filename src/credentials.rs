//! Discovery of the latest-value provider's access key.

use std::path::Path;
use std::sync::OnceLock;

use tracing::{debug, info};

/// Something that may know the latest-value provider's API key.
pub trait CredentialProvider: Send + Sync {
    fn credential(&self) -> Option<String>;
}

/// A fixed answer.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct StaticCredential(pub Option<String>);

#[cfg(test)]
impl CredentialProvider for StaticCredential {
    fn credential(&self) -> Option<String> {
        self.0.clone().filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Clone)]
struct Layer {
    source: &'static str,
    value: Option<String>,
}

/// Ordered list of places a key may come from. The first non-empty one wins.
///
/// The outcome is logged once, on the first lookup.
#[derive(Debug, Clone, Default)]
pub struct LayeredCredentials {
    layers: Vec<Layer>,
    reported: OnceLock<()>,
}

impl LayeredCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(mut self, source: &'static str, value: Option<String>) -> Self {
        self.layers.push(Layer { source, value });
        self
    }

    /// Add the contents of a key file, if it exists and can be read.
    pub fn file_layer(self, source: &'static str, path: &Path) -> Self {
        let value = match std::fs::read_to_string(path) {
            Ok(contents) => Some(contents),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no key file");
                None
            }
        };
        self.layer(source, value)
    }

    /// The winning key and the name of the source it came from.
    pub fn discover(&self) -> Option<(String, &'static str)> {
        self.layers.iter().find_map(|layer| {
            let key = layer.value.as_deref()?.trim();
            if key.is_empty() {
                None
            } else {
                Some((key.to_string(), layer.source))
            }
        })
    }
}

impl CredentialProvider for LayeredCredentials {
    fn credential(&self) -> Option<String> {
        let found = self.discover();
        self.reported.get_or_init(|| match &found {
            Some((key, source)) => info!(key = %mask(key), source, "using latest NAV credential"),
            None => info!("no latest NAV credential, latest values are skipped"),
        });
        found.map(|(key, _)| key)
    }
}

/// Show only the last four characters of a secret.
pub fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 6 {
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("****{tail}")
    } else {
        "****".to_string()
    }
}
