//! Credentials held in memory
//!
//! Connection strings and HTTP passwords are wrapped in `secrecy::Secret`, so
//! they are zeroed on drop and never show up in `Debug` output or logs.
//!
//! ```rust
//! use fhir_inc_sync::config::{SecretString, SecretValue};
//! use secrecy::{ExposeSecret, Secret};
//!
//! let dsn: SecretString = Secret::new(SecretValue::from(
//!     "postgresql://etl:pw@localhost/dwh".to_string(),
//! ));
//! assert!(dsn.expose_secret().starts_with("postgresql://"));
//! assert!(!format!("{dsn:?}").contains("pw"));
//! ```

use secrecy::{CloneableSecret, DebugSecret, Secret, SerializableSecret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

/// String newtype that satisfies the `Secret` trait bounds
#[derive(Clone, Debug, Zeroize)]
#[zeroize(drop)]
pub struct SecretValue(String);

impl CloneableSecret for SecretValue {}
impl DebugSecret for SecretValue {}
impl SerializableSecret for SecretValue {}

impl From<String> for SecretValue {
    fn from(s: String) -> Self {
        SecretValue(s)
    }
}

impl PartialEq<str> for SecretValue {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl AsRef<str> for SecretValue {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl SecretValue {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }

    /// Everything after the last `@`, i.e. the credential-free part of a DSN
    pub fn after_credentials(&self) -> &str {
        self.0.rsplit('@').next().unwrap_or(&self.0)
    }
}

impl Serialize for SecretValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretValue)
    }
}

/// Zeroizing, debug-redacted string
pub type SecretString = Secret<SecretValue>;

/// Wraps a plain string, e.g. one read from an environment override
///
/// ```rust
/// use fhir_inc_sync::config::secret_string;
///
/// let password = secret_string("hapi-password".to_string());
/// ```
#[inline]
pub fn secret_string(value: String) -> SecretString {
    Secret::new(SecretValue::from(value))
}

#[inline]
pub fn secret_string_opt(value: Option<String>) -> Option<SecretString> {
    value.map(secret_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_secret_string_creation() {
        let secret = secret_string("test-password".to_string());
        assert_eq!(secret.expose_secret(), "test-password");
    }

    #[test]
    fn test_secret_string_opt() {
        assert!(secret_string_opt(Some("pw".to_string())).is_some());
        assert!(secret_string_opt(None).is_none());
    }

    #[test]
    fn test_secret_debug_redacted() {
        let secret = secret_string("postgresql://u:sensitive@db/dwh".to_string());
        let debug_output = format!("{secret:?}");
        assert!(!debug_output.contains("sensitive"));
    }

    #[test]
    fn test_after_credentials() {
        let secret = secret_string("postgresql://u:p@w@db:5432/dwh".to_string());
        assert_eq!(secret.expose_secret().after_credentials(), "db:5432/dwh");

        let bare = secret_string("postgresql://db/dwh".to_string());
        assert_eq!(bare.expose_secret().after_credentials(), "postgresql://db/dwh");
    }

    #[test]
    fn test_secret_deserializes_from_toml() {
        #[derive(Deserialize)]
        struct Section {
            password: SecretString,
        }

        let section: Section = toml::from_str("password = \"s3cret\"").unwrap();
        assert_eq!(section.password.expose_secret(), "s3cret");
    }
}
