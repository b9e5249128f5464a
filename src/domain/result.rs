//! Result type alias for cnpj-delta

use super::errors::DeltaError;

/// Result type alias for cnpj-delta operations
///
/// # Examples
///
/// ```
/// use cnpj_delta::domain::result::Result;
/// use cnpj_delta::domain::errors::DeltaError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(DeltaError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, DeltaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_with_question_mark() -> Result<()> {
        fn inner() -> Result<i32> {
            Ok(42)
        }

        let value = inner()?;
        assert_eq!(value, 42);
        Ok(())
    }
}
