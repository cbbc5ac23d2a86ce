//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates that a value contains something other than whitespace.
///
/// # Examples
///
/// ```ignore
/// validate_not_blank("Alice") // Ok
/// validate_not_blank("   ")   // Err
/// ```
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("value must not be blank".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_not_blank() {
        assert!(validate_not_blank("Alice").is_ok());
        assert!(validate_not_blank(" Bob ").is_ok());
        assert!(validate_not_blank("").is_err());
        assert!(validate_not_blank(" \t ").is_err());
    }
}
