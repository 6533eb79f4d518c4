use serde::Serialize;
use std::fmt::Display;

/// Implemented by the raw, unvalidated payload of a [`ValueObject`]. `validate`
/// is called once, at construction time, so a `ValueObject<T>` in scope
/// means the wrapped value already passed it.
pub(crate) trait ValueObjectable {
    type DataType;

    fn validate(&self) -> Result<(), String>;
    fn get_value(&self) -> &Self::DataType;
}

#[derive(Debug, PartialEq, Clone, Serialize)]
pub(crate) struct ValueObject<T>(T)
where
    T: ValueObjectable;

impl<T> ValueObject<T>
where
    T: ValueObjectable,
{
    pub(crate) fn new(value: T) -> Result<Self, String> {
        value.validate()?;
        Ok(ValueObject(value))
    }

    pub(crate) fn extract(&self) -> &T {
        &self.0
    }
}

impl<T> Display for ValueObject<T>
where
    T: ValueObjectable + Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Clone, Serialize)]
    struct Upper(String);

    impl ValueObjectable for Upper {
        type DataType = String;
        fn validate(&self) -> Result<(), String> {
            if !self.0.is_empty() && self.0.chars().all(|c| c.is_ascii_uppercase()) {
                Ok(())
            } else {
                Err(format!("'{}' is not all uppercase", self.0))
            }
        }
        fn get_value(&self) -> &Self::DataType {
            &self.0
        }
    }

    #[test]
    fn accepts_valid_input() {
        let vo = ValueObject::new(Upper("ABC".to_string())).unwrap();
        assert_eq!(vo.extract().get_value(), "ABC");
    }

    #[test]
    fn rejects_invalid_input() {
        assert!(ValueObject::new(Upper("abc".to_string())).is_err());
    }
}
