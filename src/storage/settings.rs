use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use super::preferences::{remove_preference, upsert_preference};
use super::schema::Database;

const CREDENTIAL_PREFIX: &str = "credential.";
const USE_CUSTOM_KEY: &str = "credential.use_custom";
const API_KEY_KEY: &str = "credential.api_key";
const MIN_REVEALING_LEN: usize = 8;

/// User-supplied upstream credential and whether to use it.
///
/// The key is kept even while `use_custom_credential` is off, so toggling
/// the switch back on does not require re-entering it.
#[derive(Default)]
pub struct CredentialSettings {
    pub use_custom_credential: bool,
    pub credential: Option<SecretString>,
}

impl fmt::Debug for CredentialSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSettings")
            .field("use_custom_credential", &self.use_custom_credential)
            .field(
                "credential",
                &self.credential.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl CredentialSettings {
    /// The credential to send with searches: present only when the switch is
    /// on and a non-blank key is stored.
    pub fn active_credential(&self) -> Option<&SecretString> {
        if !self.use_custom_credential {
            return None;
        }
        self.credential
            .as_ref()
            .filter(|key| !key.expose_secret().trim().is_empty())
    }

    pub fn into_active_credential(self) -> Option<SecretString> {
        if self.active_credential().is_none() {
            return None;
        }
        self.credential
    }

    /// Masked form for display. The last four characters are shown only for
    /// keys long enough that they give little away.
    pub fn masked(&self) -> Option<String> {
        let key = self.credential.as_ref()?.expose_secret();
        if key.chars().count() <= MIN_REVEALING_LEN {
            return Some("****".to_string());
        }
        let tail: String = key
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        Some(format!("****{}", tail))
    }
}

impl Database {
    // ========================================================================
    // Credential Settings
    // ========================================================================

    /// Load the stored credential settings. Missing rows read as defaults.
    pub async fn load_credential_settings(&self) -> Result<CredentialSettings> {
        let mut settings = CredentialSettings::default();
        for (key, value) in self.get_preferences_by_prefix(CREDENTIAL_PREFIX).await? {
            match key.as_str() {
                USE_CUSTOM_KEY => settings.use_custom_credential = value == "true",
                API_KEY_KEY if !value.trim().is_empty() => {
                    settings.credential = Some(SecretString::from(value));
                }
                _ => {}
            }
        }

        Ok(settings)
    }

    /// Persist credential settings in one transaction. A `None` credential
    /// removes the stored key.
    pub async fn save_credential_settings(&self, settings: &CredentialSettings) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        upsert_preference(
            &mut *tx,
            USE_CUSTOM_KEY,
            if settings.use_custom_credential {
                "true"
            } else {
                "false"
            },
        )
        .await?;

        match &settings.credential {
            Some(key) => {
                upsert_preference(&mut *tx, API_KEY_KEY, key.expose_secret().trim()).await?
            }
            None => {
                remove_preference(&mut *tx, API_KEY_KEY).await?;
            }
        }

        tx.commit().await?;

        tracing::debug!(
            use_custom = settings.use_custom_credential,
            has_key = settings.credential.is_some(),
            "Saved credential settings"
        );
        Ok(())
    }
}
