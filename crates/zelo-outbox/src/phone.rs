//! Destination phone gate.
//!
//! Full phone-number normalization lives with the chat bridge; this module
//! only enforces the contract the outbox needs: the number must be a valid
//! Brazilian mobile in E.164 form, because the chat channel cannot reach
//! landlines. The check sits behind [`PhoneNormalizer`] so deployments with
//! a real normalization service can swap it in.

use std::fmt;

use thiserror::Error;

/// A destination number that passed the mobile-capability gate, in E.164.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Phone(String);

impl Phone {
    /// The normalized E.164 form, e.g. `+5511999998888`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the phone into its string form.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rejections from the phone gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhoneError {
    /// The input does not look like a phone number at all.
    #[error("malformed number: {reason}")]
    Malformed {
        /// Why parsing failed.
        reason: String,
    },

    /// A valid number, but not a mobile one.
    #[error("not a mobile number")]
    NotMobile,
}

/// Validates and normalizes destination numbers.
pub trait PhoneNormalizer: Send + Sync + fmt::Debug {
    /// Normalizes `raw` to E.164, rejecting malformed and non-mobile input.
    fn normalize(&self, raw: &str) -> Result<Phone, PhoneError>;
}

/// Structural normalizer for Brazilian numbers.
///
/// Accepts local (`11999998888`) and international (`+5511999998888`)
/// spellings with common punctuation. A mobile subscriber number has nine
/// digits and starts with 9; eight-digit subscribers are landlines.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrazilPhoneNormalizer;

impl PhoneNormalizer for BrazilPhoneNormalizer {
    fn normalize(&self, raw: &str) -> Result<Phone, PhoneError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PhoneError::Malformed {
                reason: "empty input".to_string(),
            });
        }

        let mut digits = String::with_capacity(trimmed.len());
        for (index, ch) in trimmed.chars().enumerate() {
            match ch {
                '0'..='9' => digits.push(ch),
                '+' if index == 0 => {}
                ' ' | '-' | '.' | '(' | ')' => {}
                other => {
                    return Err(PhoneError::Malformed {
                        reason: format!("unexpected character '{other}'"),
                    });
                }
            }
        }

        // National part: two-digit area code plus the subscriber number.
        let national = match digits.len() {
            12 | 13 if digits.starts_with("55") => digits[2..].to_string(),
            10 | 11 => digits,
            _ => {
                return Err(PhoneError::Malformed {
                    reason: format!("unexpected length {}", digits.len()),
                });
            }
        };

        if national.starts_with('0') {
            return Err(PhoneError::Malformed {
                reason: "area code cannot start with 0".to_string(),
            });
        }

        let subscriber = &national[2..];
        if subscriber.len() != 9 || !subscriber.starts_with('9') {
            return Err(PhoneError::NotMobile);
        }

        Ok(Phone(format!("+55{national}")))
    }
}
