use crate::{
    Error,
    error::{StorageError, ValidationError},
};

/// Extension trait mapping (de)serialization failures of stored values
///
/// ```rust
/// use latchkey_core::error::utilities::SerdeResultExt;
///
/// let parsed = serde_json::from_str::<u32>("not json").map_serde_err();
/// assert!(parsed.is_err());
/// ```
pub trait SerdeResultExt<T> {
    /// Convert a (de)serialization error into `StorageError::Serialization`
    fn map_serde_err(self) -> Result<T, Error>;
}

impl<T, E: std::fmt::Display> SerdeResultExt<T> for Result<T, E> {
    fn map_serde_err(self) -> Result<T, Error> {
        self.map_err(|e| Error::Storage(StorageError::Serialization(e.to_string())))
    }
}

/// Extension trait for Option types to simplify required field validation
///
/// # Example
///
/// ```rust
/// use latchkey_core::error::utilities::RequiredFieldExt;
///
/// let email: Option<String> = None;
/// assert!(email.require_field("Email").is_err());
/// ```
pub trait RequiredFieldExt<T> {
    /// Convert None to a ValidationError::MissingField
    fn require_field(self, field_name: &str) -> Result<T, ValidationError>;
}

impl<T> RequiredFieldExt<T> for Option<T> {
    fn require_field(self, field_name: &str) -> Result<T, ValidationError> {
        self.ok_or_else(|| ValidationError::MissingField(format!("{field_name} is required")))
    }
}

/// Macro to convert any error to a storage database error with context
///
/// ```rust,ignore
/// use latchkey_core::map_storage_err_with_context;
///
/// map_storage_err_with_context!(tx.commit().await, "Failed to apply migration")?;
/// ```
#[macro_export]
macro_rules! map_storage_err_with_context {
    ($result:expr, $context:expr) => {
        $result.map_err(|e| {
            $crate::Error::Storage($crate::error::StorageError::Database(format!(
                "{}: {}",
                $context, e
            )))
        })
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_result_ext() {
        let parsed: Result<u32, _> = serde_json::from_str::<u32>("not json");
        match parsed.map_serde_err().unwrap_err() {
            Error::Storage(StorageError::Serialization(_)) => {}
            other => panic!("Expected serialization error, got {other:?}"),
        }
    }

    #[test]
    fn test_required_field_ext() {
        let some_value = Some("a@x.com".to_string());
        assert_eq!(some_value.require_field("Email").unwrap(), "a@x.com");

        let none_value: Option<String> = None;
        match none_value.require_field("Email").unwrap_err() {
            ValidationError::MissingField(msg) => assert_eq!(msg, "Email is required"),
            _ => panic!("Expected missing field validation error"),
        }
    }

    #[test]
    fn test_map_storage_err_with_context_macro() {
        let error_result: Result<i32, &str> = Err("unique constraint");
        let mapped = map_storage_err_with_context!(error_result, "Creating identity");

        match mapped.unwrap_err() {
            Error::Storage(StorageError::Database(msg)) => {
                assert_eq!(msg, "Creating identity: unique constraint");
            }
            _ => panic!("Expected storage database error"),
        }
    }
}
