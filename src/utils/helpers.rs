//! Helper functions and utilities
//!
//! This module contains common helper functions used throughout the crate.

use std::sync::OnceLock;

use rand::Rng;
use regex::Regex;

/// Characters secret keys are drawn from
/// `#` and `;` are left out, INI parsers may read them as comments
const SECRET_KEY_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789!@$%^&*(-_=+)";

/// Length of generated secret keys
pub const SECRET_KEY_LENGTH: usize = 50;

/// Generate a random secret key suitable for `global.secret_key`
pub fn generate_secret_key() -> String {
    let mut rng = rand::thread_rng();
    (0..SECRET_KEY_LENGTH)
        .map(|_| SECRET_KEY_CHARS[rng.gen_range(0..SECRET_KEY_CHARS.len())] as char)
        .collect()
}

/// Mask a secret for display; empty secrets stay empty so they remain visible
pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "********".to_string()
    }
}

/// Loose e-mail address check
pub fn is_valid_email(email: &str) -> bool {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    let pattern = EMAIL.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
    });
    pattern.is_match(email.trim())
}
