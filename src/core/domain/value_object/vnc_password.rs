use crate::core::domain::error::ValidationError;
use crate::core::infrastructure::config::VncPasswordPolicy;
use zxcvbn::{Score, zxcvbn};

/// A VNC console password (plaintext, handed to the control plane as-is).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VncPassword(String);

impl VncPassword {
    /// Creates a new password, checking it against the policy.
    pub fn new(
        password: impl Into<String>,
        policy: &VncPasswordPolicy,
    ) -> Result<Self, ValidationError> {
        let password = password.into();
        validate_vnc_password(&password, policy)?;
        Ok(Self(password))
    }

    /// Returns the password as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Validates a non-empty VNC password against the policy.
pub(crate) fn validate_vnc_password(
    password: &str,
    policy: &VncPasswordPolicy,
) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if len < policy.min_length {
        return Err(ValidationError::WeakVncPassword(format!(
            "must be at least {} characters long",
            policy.min_length
        )));
    }
    if len > policy.max_length {
        return Err(ValidationError::WeakVncPassword(format!(
            "cannot exceed {} characters",
            policy.max_length
        )));
    }
    if let Some(min_score) = policy.min_score.and_then(score_from_u8) {
        let entropy = zxcvbn(password, &[]);
        if entropy.score() < min_score {
            return Err(ValidationError::WeakVncPassword(
                "too weak (increase complexity)".to_string(),
            ));
        }
    }
    Ok(())
}

fn score_from_u8(score: u8) -> Option<Score> {
    match score {
        0 => Some(Score::Zero),
        1 => Some(Score::One),
        2 => Some(Score::Two),
        3 => Some(Score::Three),
        4 => Some(Score::Four),
        _ => None,
    }
}
