//! Validated user and room names.
//!
//! Both types keep the text exactly as entered; validation only checks that
//! the trimmed text is non-empty and that the character count is in range.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::NameError;

/// Reserved sender name for messages authored by the assistant.
pub const AI_USERNAME: &str = "AI";

/// A chat participant's display name, 2 to 20 characters.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// Minimum number of characters.
    pub const MIN_LEN: usize = 2;
    /// Maximum number of characters.
    pub const MAX_LEN: usize = 20;

    /// Validate and wrap a username.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or its length is out of range.
    pub fn parse(s: &str) -> Result<Self, NameError> {
        check_length(s, Self::MIN_LEN, Self::MAX_LEN)?;
        Ok(Self(s.to_string()))
    }

    /// Return the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the assistant pseudo-user.
    #[must_use]
    pub fn is_ai(&self) -> bool {
        self.0 == AI_USERNAME
    }
}

impl fmt::Debug for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Username({})", self.0)
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Username {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Username {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        check_length(&value, Self::MIN_LEN, Self::MAX_LEN)?;
        Ok(Self(value))
    }
}

impl From<Username> for String {
    fn from(name: Username) -> Self {
        name.0
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A room name, 3 to 30 characters.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomName(String);

impl RoomName {
    /// Minimum number of characters.
    pub const MIN_LEN: usize = 3;
    /// Maximum number of characters.
    pub const MAX_LEN: usize = 30;

    /// Validate and wrap a room name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or its length is out of range.
    pub fn parse(s: &str) -> Result<Self, NameError> {
        check_length(s, Self::MIN_LEN, Self::MAX_LEN)?;
        Ok(Self(s.to_string()))
    }

    /// Return the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoomName({})", self.0)
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        check_length(&value, Self::MIN_LEN, Self::MAX_LEN)?;
        Ok(Self(value))
    }
}

impl From<RoomName> for String {
    fn from(name: RoomName) -> Self {
        name.0
    }
}

impl AsRef<str> for RoomName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn check_length(s: &str, min: usize, max: usize) -> Result<(), NameError> {
    if s.trim().is_empty() {
        return Err(NameError::Empty);
    }
    let len = s.chars().count();
    if len < min {
        return Err(NameError::TooShort { min });
    }
    if len > max {
        return Err(NameError::TooLong { max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_bounds() {
        assert_eq!(Username::parse("a"), Err(NameError::TooShort { min: 2 }));
        assert!(Username::parse("ab").is_ok());
        assert!(Username::parse(&"x".repeat(20)).is_ok());
        assert_eq!(
            Username::parse(&"x".repeat(21)),
            Err(NameError::TooLong { max: 20 })
        );
    }

    #[test]
    fn username_blank_is_empty() {
        assert_eq!(Username::parse(""), Err(NameError::Empty));
        assert_eq!(Username::parse("   "), Err(NameError::Empty));
    }

    #[test]
    fn room_bounds() {
        assert_eq!(RoomName::parse("ab"), Err(NameError::TooShort { min: 3 }));
        assert!(RoomName::parse("abc").is_ok());
        assert!(RoomName::parse(&"r".repeat(30)).is_ok());
        assert_eq!(
            RoomName::parse(&"r".repeat(31)),
            Err(NameError::TooLong { max: 30 })
        );
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        // Two characters, six bytes.
        assert!(Username::parse("日本").is_ok());
        assert!(RoomName::parse("über").is_ok());
    }

    #[test]
    fn names_keep_raw_text() {
        let name = Username::parse(" bob ").unwrap();
        assert_eq!(name.as_str(), " bob ");
    }

    #[test]
    fn ai_pseudo_user() {
        assert!(Username::parse(AI_USERNAME).unwrap().is_ai());
        assert!(!Username::parse("alice").unwrap().is_ai());
    }

    #[test]
    fn serde_rejects_invalid_names() {
        let parsed: Result<RoomName, _> = serde_json::from_str("\"x\"");
        assert!(parsed.is_err());

        let room: RoomName = serde_json::from_str("\"lobby\"").unwrap();
        assert_eq!(serde_json::to_string(&room).unwrap(), "\"lobby\"");
    }
}
