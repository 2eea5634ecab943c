use crate::core::domain::error::ValidationError;

/// A free-form VM description of at most 1024 characters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Description(String);

impl Description {
    pub const MAX_LENGTH: usize = 1024;

    /// Creates a new description, validating its length.
    pub fn new(text: impl Into<String>) -> Result<Self, ValidationError> {
        let text = text.into();
        validate_description(&text)?;
        Ok(Self(text))
    }

    /// Returns the description as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Validates a description length, counted in characters.
pub(crate) fn validate_description(text: &str) -> Result<(), ValidationError> {
    let len = text.chars().count();
    if len > Description::MAX_LENGTH {
        return Err(ValidationError::InvalidDescription {
            len,
            max: Description::MAX_LENGTH,
        });
    }
    Ok(())
}
