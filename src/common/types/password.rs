use crate::common::types::value_object::{ValueObject, ValueObjectable};
use serde::{Deserialize, Serialize};
use std::fmt;

const MIN_LEN: usize = 8;
const MAX_LEN: usize = 128;

/// A candidate plaintext password, validated for length at the HTTP
/// boundary before it ever reaches the auth service for hashing.
/// `Display`/`Debug` are both redacted — the plaintext must never end up
/// in a log line.
#[derive(Clone, PartialEq, Serialize)]
pub(crate) struct Password(pub String);

impl ValueObjectable for Password {
    type DataType = String;

    fn validate(&self) -> Result<(), String> {
        let len = self.0.chars().count();
        if len < MIN_LEN {
            Err(format!("password must be at least {MIN_LEN} characters"))
        } else if len > MAX_LEN {
            Err(format!("password must be at most {MAX_LEN} characters"))
        } else {
            Ok(())
        }
    }

    fn get_value(&self) -> &Self::DataType {
        &self.0
    }
}

impl fmt::Display for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[redacted]")
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Password([redacted])")
    }
}

impl<'de> Deserialize<'de> for ValueObject<Password> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ValueObject::new(Password(s)).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_reasonable_password() {
        let vo: Result<ValueObject<Password>, _> =
            serde_json::from_str(r#""correct-horse-battery""#);
        assert!(vo.is_ok());
    }

    #[test]
    fn rejects_too_short() {
        let vo: Result<ValueObject<Password>, _> = serde_json::from_str(r#""short""#);
        assert!(vo.is_err());
    }

    #[test]
    fn never_leaks_plaintext_via_display() {
        let p = Password("correct-horse-battery".to_string());
        assert_eq!(p.to_string(), "[redacted]");
        assert_eq!(format!("{p:?}"), "Password([redacted])");
    }
}
