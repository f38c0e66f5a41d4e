use std::fs;
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LookupError;

pub const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 3_000;

/// Source of published firmware versions for a product line and platform.
pub trait FirmwareLookup: Send + Sync {
    fn available_versions(
        &self,
        product_line: &str,
        platform: &str,
    ) -> Result<Vec<String>, LookupError>;
}

/// Manifest of the form `{"r5000": {"H11": ["H11v1.90.45"]}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct StaticFirmwareCatalog {
    product_lines: IndexMap<String, IndexMap<String, Vec<String>>>,
}

impl StaticFirmwareCatalog {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read firmware catalog {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("failed to parse firmware catalog {}", path.display()))
    }

    pub fn insert(&mut self, product_line: &str, platform: &str, versions: Vec<String>) {
        self.product_lines
            .entry(product_line.to_string())
            .or_default()
            .insert(platform.to_string(), versions);
    }
}

impl FirmwareLookup for StaticFirmwareCatalog {
    fn available_versions(
        &self,
        product_line: &str,
        platform: &str,
    ) -> Result<Vec<String>, LookupError> {
        let not_listed = || LookupError::NotListed {
            product_line: product_line.to_string(),
            platform: platform.to_string(),
        };
        let platforms = self
            .product_lines
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(product_line))
            .map(|(_, platforms)| platforms)
            .ok_or_else(not_listed)?;
        platforms
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(platform))
            .map(|(_, versions)| versions.clone())
            .ok_or_else(not_listed)
    }
}

/// Runs the inner lookup on a helper thread and gives up after `timeout`.
#[derive(Clone)]
pub struct TimedFirmwareLookup {
    inner: Arc<dyn FirmwareLookup>,
    timeout: Duration,
}

impl TimedFirmwareLookup {
    pub fn new(inner: Arc<dyn FirmwareLookup>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl FirmwareLookup for TimedFirmwareLookup {
    fn available_versions(
        &self,
        product_line: &str,
        platform: &str,
    ) -> Result<Vec<String>, LookupError> {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let product_line_owned = product_line.to_string();
        let platform_owned = platform.to_string();
        thread::Builder::new()
            .name("firmware-lookup".to_string())
            .spawn(move || {
                let result = inner.available_versions(&product_line_owned, &platform_owned);
                let _ = tx.send(result);
            })
            .map_err(|err| LookupError::Unavailable(err.to_string()))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => {
                debug!("firmware lookup for {product_line}/{platform} finished");
                result
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    "firmware lookup for {product_line}/{platform} timed out after {} ms",
                    self.timeout.as_millis()
                );
                Err(LookupError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(LookupError::Unavailable(
                "lookup thread exited without a result".to_string(),
            )),
        }
    }
}

static VERSION_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:\.\d+)+").expect("version pattern compiles"));

/// Dotted numeric part of a firmware string as a comparable tuple: `H11v1.90.45` -> `[1, 90, 45]`.
pub fn version_key(version: &str) -> Option<Vec<u64>> {
    let digits = VERSION_DIGITS.find(version)?;
    digits
        .as_str()
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

/// Highest version in `versions` by numeric tuple; unparseable entries are ignored.
pub fn latest_version(versions: &[String]) -> Option<&str> {
    versions
        .iter()
        .filter_map(|version| version_key(version).map(|key| (version, key)))
        .max_by(|left, right| left.1.cmp(&right.1))
        .map(|(version, _)| version.as_str())
}
