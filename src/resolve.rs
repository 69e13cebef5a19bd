// Credential resolution - record metadata merged over caller defaults

use std::fmt;

use zeroize::Zeroizing;

use crate::error::Error;
use crate::store::{SecretRecord, SecretStore};

pub const META_USER: &str = "ro-user";
pub const META_SERVER: &str = "ro-server";
pub const META_CA: &str = "ro-ca";

/// Fallback values used when a record carries no metadata override.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Defaults {
    pub user: String,
    pub server: String,
    pub ca_file: String,
    pub labels_raw: String,
    pub owners_raw: String,
    pub uses: u32,
    pub duration: String,
}

/// Where a resolved field came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    FromMetadata(String),
    FromDefault(String),
    /// Key absent from the record and no fallback supplied.
    Unresolved,
}

impl Resolution {
    /// Collapse to a plain value. `Unresolved` becomes the empty string.
    pub fn into_value(self) -> String {
        match self {
            Resolution::FromMetadata(v) | Resolution::FromDefault(v) => v,
            Resolution::Unresolved => String::new(),
        }
    }

    fn source(&self) -> &'static str {
        match self {
            Resolution::FromMetadata(_) => "metadata",
            Resolution::FromDefault(_) => "default",
            Resolution::Unresolved => "unresolved",
        }
    }
}

/// Everything needed to build one delegation request.
pub struct DelegationParams {
    pub user: String,
    pub password: Zeroizing<Vec<u8>>,
    pub server: String,
    pub ca_file: String,
    pub labels: Vec<String>,
    pub owners: Vec<String>,
    pub uses: u32,
    pub duration: String,
}

impl fmt::Debug for DelegationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegationParams")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("server", &self.server)
            .field("ca_file", &self.ca_file)
            .field("labels", &self.labels)
            .field("owners", &self.owners)
            .field("uses", &self.uses)
            .field("duration", &self.duration)
            .finish()
    }
}

/// Look up `key` in the record metadata, falling back to `fallback`.
///
/// A key that is present wins even when its value is empty.
pub fn resolve_field(record: &SecretRecord, key: &str, fallback: &str) -> Resolution {
    match record.metadata.get(key) {
        Some(value) => Resolution::FromMetadata(value.clone()),
        None if !fallback.is_empty() => Resolution::FromDefault(fallback.to_string()),
        None => Resolution::Unresolved,
    }
}

/// Split a comma-separated list and trim each element.
///
/// An empty input yields a single empty element, not an empty list.
pub fn split(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).collect()
}

fn field(record: &SecretRecord, key: &str, fallback: &str, required: bool) -> String {
    let resolution = resolve_field(record, key, fallback);
    tracing::debug!(label = %record.label, key, source = resolution.source(), "resolved field");
    if required && resolution == Resolution::Unresolved {
        tracing::warn!(label = %record.label, key, "no value in record metadata or defaults; using empty value");
    }
    resolution.into_value()
}

/// Build the delegation parameters for `label`.
///
/// Only a missing label fails. Empty users or servers are passed through
/// for the server to reject.
pub fn resolve(store: &SecretStore, label: &str, defaults: &Defaults) -> Result<DelegationParams, Error> {
    let record = store
        .get(label)
        .ok_or_else(|| Error::RecordNotFound(label.to_string()))?;

    let user = field(record, META_USER, &defaults.user, true);
    let password = Zeroizing::new(record.secret.clone());
    let server = field(record, META_SERVER, &defaults.server, true);
    let ca_file = field(record, META_CA, &defaults.ca_file, false);

    Ok(DelegationParams {
        user,
        password,
        server,
        ca_file,
        labels: split(&defaults.labels_raw),
        owners: split(&defaults.owners_raw),
        uses: defaults.uses,
        duration: defaults.duration.clone(),
    })
}
