//! Input validation for registration and the password flows.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Usernames: 3-150 chars, alphanumeric plus ._- , starting alphanumeric
    static ref USERNAME_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9][a-zA-Z0-9._-]*$"
    ).unwrap();

    /// Pragmatic email shape check; deliverability is proven by the
    /// verification flow, not the regex
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^@\s]+@[^@\s]+\.[^@\s]+$"
    ).unwrap();
}

pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username is required.".to_string());
    }
    if username.len() < 3 {
        return Err("Username must be at least 3 characters.".to_string());
    }
    if username.len() > 150 {
        return Err("Username must be at most 150 characters.".to_string());
    }
    if !USERNAME_REGEX.is_match(username) {
        return Err(
            "Username may only contain letters, digits, dots, dashes and underscores."
                .to_string(),
        );
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required.".to_string());
    }
    if email.len() > 254 {
        return Err("Email is too long.".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("Enter a valid email address.".to_string());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters.".to_string());
    }
    if password.len() > 128 {
        return Err("Password must be at most 128 characters.".to_string());
    }
    Ok(())
}
