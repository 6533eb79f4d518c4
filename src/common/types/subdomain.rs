use crate::common::types::value_object::{ValueObject, ValueObjectable};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::LazyLock;

static SUBDOMAIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9](-?[a-z0-9]){0,29}$").expect("static regex"));

/// A DNS-safe, lower-case label used to address an instance as
/// `<subdomain>.<root-domain>`. Reserved once allocated; see the Store's
/// `ReserveInstance`.
#[derive(Debug, PartialEq, Clone, Serialize)]
pub(crate) struct Subdomain(pub String);

impl ValueObjectable for Subdomain {
    type DataType = String;

    fn validate(&self) -> Result<(), String> {
        if SUBDOMAIN_RE.is_match(&self.0) {
            Ok(())
        } else {
            Err(format!(
                "'{}' is not a valid subdomain: expected lower-case letters, digits and single hyphens, 1-30 characters",
                self.0
            ))
        }
    }

    fn get_value(&self) -> &Self::DataType {
        &self.0
    }
}

impl Display for Subdomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for ValueObject<Subdomain> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ValueObject::new(Subdomain(s)).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_label() {
        let vo: Result<ValueObject<Subdomain>, _> =
            serde_json::from_str(r#""acme""#);
        assert!(vo.is_ok());
    }

    #[test]
    fn accepts_internal_hyphens() {
        let vo: Result<ValueObject<Subdomain>, _> =
            serde_json::from_str(r#""acme-corp-2""#);
        assert!(vo.is_ok());
    }

    #[test]
    fn rejects_leading_hyphen() {
        let vo: Result<ValueObject<Subdomain>, _> =
            serde_json::from_str(r#""-acme""#);
        assert!(vo.is_err());
    }

    #[test]
    fn rejects_upper_case() {
        let vo: Result<ValueObject<Subdomain>, _> =
            serde_json::from_str(r#""Acme""#);
        assert!(vo.is_err());
    }

    #[test]
    fn rejects_empty() {
        let vo: Result<ValueObject<Subdomain>, _> = serde_json::from_str(r#""""#);
        assert!(vo.is_err());
    }

    #[test]
    fn rejects_over_length() {
        let too_long = format!("\"{}\"", "a".repeat(40));
        let vo: Result<ValueObject<Subdomain>, _> = serde_json::from_str(&too_long);
        assert!(vo.is_err());
    }
}
