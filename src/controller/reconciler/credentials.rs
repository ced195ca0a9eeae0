//! # Credential Resolution
//!
//! Finds the single Secret labelled `user=<objectUser>` in the resource
//! namespace and reads the S3 keys from it. Zero or several matches are
//! errors; one is never picked arbitrarily.

use std::time::Duration;

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tracing::debug;
use zeroize::Zeroizing;

use super::types::{bounded, ReconcilerError};
use crate::constants::CREDENTIAL_USER_LABEL;
use crate::provider::{CredentialRecord, CredentialStore};

/// Secret data keys holding the access key id and secret access key
#[derive(Debug, Clone, Copy)]
pub struct CredentialFields<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
}

/// Resolve the unique credential of `user` in `namespace`
///
/// # Errors
///
/// - `CredentialNotFound` when no Secret carries the label
/// - `AmbiguousCredential` when more than one does
/// - `MalformedCredential` when the only match lacks a key field
/// - `CredentialLookup` when the store fails or times out
pub async fn resolve_credential(
    store: &dyn CredentialStore,
    namespace: &str,
    user: &str,
    fields: CredentialFields<'_>,
    timeout: Duration,
) -> Result<CredentialRecord, ReconcilerError> {
    let secrets = bounded(
        timeout,
        "credential lookup",
        store.list_by_label(namespace, CREDENTIAL_USER_LABEL, user),
    )
    .await
    .map_err(|source| ReconcilerError::CredentialLookup {
        namespace: namespace.to_string(),
        user: user.to_string(),
        source,
    })?;

    let secret = match secrets.as_slice() {
        [] => {
            return Err(ReconcilerError::CredentialNotFound {
                namespace: namespace.to_string(),
                user: user.to_string(),
            })
        }
        [only] => only,
        many => {
            let mut names: Vec<String> = many.iter().map(ResourceExt::name_any).collect();
            names.sort();
            return Err(ReconcilerError::AmbiguousCredential {
                namespace: namespace.to_string(),
                user: user.to_string(),
                secrets: names,
            });
        }
    };

    let record = CredentialRecord {
        namespace: namespace.to_string(),
        name: secret.name_any(),
        user: user.to_string(),
        access_key_id: read_field(secret, namespace, fields.access_key)?.to_string(),
        secret_access_key: read_field(secret, namespace, fields.secret_key)?,
    };
    debug!(
        secret = %record.name,
        user = user,
        "Resolved object user credential"
    );
    Ok(record)
}

fn read_field(
    secret: &Secret,
    namespace: &str,
    field: &str,
) -> Result<Zeroizing<String>, ReconcilerError> {
    let malformed = || ReconcilerError::MalformedCredential {
        namespace: namespace.to_string(),
        secret: secret.name_any(),
        field: field.to_string(),
    };

    let bytes = secret
        .data
        .as_ref()
        .and_then(|data| data.get(field))
        .map(|value| value.0.clone())
        .or_else(|| {
            secret
                .string_data
                .as_ref()
                .and_then(|data| data.get(field))
                .map(|value| value.clone().into_bytes())
        })
        .ok_or_else(malformed)?;

    let value = Zeroizing::new(String::from_utf8(bytes).map_err(|_| malformed())?);
    if value.trim().is_empty() {
        return Err(malformed());
    }
    Ok(value)
}
