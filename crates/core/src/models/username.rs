//! Username rules for anonymous senders

use rand::Rng;

use crate::error::{Error, Result};

/// Minimum username length, in characters
pub const MIN_USERNAME_LEN: usize = 3;

/// Check a chosen username: at least three characters, no capitals, no whitespace.
pub fn validate_username(name: &str) -> Result<()> {
    if name.chars().count() < MIN_USERNAME_LEN {
        return Err(Error::InvalidUsername(format!(
            "must be at least {} characters",
            MIN_USERNAME_LEN
        )));
    }
    if name.chars().any(char::is_uppercase) {
        return Err(Error::InvalidUsername("must not contain capitals".into()));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(Error::InvalidUsername("must not contain spaces".into()));
    }
    Ok(())
}

/// Random name that always passes [`validate_username`]
pub fn suggest_username() -> String {
    let n: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("anon{:04}", n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_usernames() {
        assert!(validate_username("bob").is_ok());
        assert!(validate_username("neo_1999").is_ok());
    }

    #[test]
    fn test_too_short() {
        assert!(validate_username("").is_err());
        assert!(validate_username("al").is_err());
    }

    #[test]
    fn test_rejects_capitals_and_spaces() {
        assert!(validate_username("Alice").is_err());
        assert!(validate_username("ali ce").is_err());
        assert!(validate_username("alice\t").is_err());
    }

    #[test]
    fn test_suggestions_are_valid() {
        for _ in 0..32 {
            let name = suggest_username();
            assert!(validate_username(&name).is_ok(), "bad suggestion {}", name);
        }
    }
}
