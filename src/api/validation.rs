//! Input validation for API requests.
//!
//! Validators return `Err(message)` and are combined per request with
//! `ValidationErrorBuilder`, so forms are rejected before any write happens.

use lazy_static::lazy_static;
use regex::Regex;

use crate::db::parse_date;

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
            .expect("valid email regex");

    /// Digits with optional leading +, spaces, dashes, dots and parentheses
    static ref PHONE_REGEX: Regex =
        Regex::new(r"^\+?[0-9 ()\-.]{7,20}$").expect("valid phone regex");

    /// Record identifiers: generated UUIDs or seeded slugs
    static ref ID_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_\-]{1,64}$").expect("valid id regex");

    static ref URL_REGEX: Regex = Regex::new(r"^https?://[^\s]+$").expect("valid url regex");
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.trim().is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }
    if !EMAIL_REGEX.is_match(email.trim()) {
        return Err("Invalid email address".to_string());
    }
    Ok(())
}

pub fn validate_phone(phone: &str) -> Result<(), String> {
    if phone.trim().is_empty() {
        return Err("Phone number is required".to_string());
    }
    if !PHONE_REGEX.is_match(phone.trim()) {
        return Err("Invalid phone number".to_string());
    }
    Ok(())
}

/// Optional phone: absent or blank is fine
pub fn validate_optional_phone(phone: &Option<String>) -> Result<(), String> {
    match phone {
        Some(p) if !p.trim().is_empty() => validate_phone(p),
        _ => Ok(()),
    }
}

/// Required free text between `min` and `max` characters (after trimming)
pub fn validate_text(value: &str, label: &str, min: usize, max: usize) -> Result<(), String> {
    let len = value.trim().chars().count();
    if len == 0 {
        return Err(format!("{} is required", label));
    }
    if len < min {
        return Err(format!("{} is too short (min {} characters)", label, min));
    }
    if len > max {
        return Err(format!("{} is too long (max {} characters)", label, max));
    }
    Ok(())
}

pub fn validate_optional_text(value: &Option<String>, label: &str, max: usize) -> Result<(), String> {
    match value {
        Some(v) if v.chars().count() > max => {
            Err(format!("{} is too long (max {} characters)", label, max))
        }
        _ => Ok(()),
    }
}

pub fn validate_positive_amount(amount: f64, label: &str) -> Result<(), String> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(format!("{} must be greater than zero", label));
    }
    Ok(())
}

pub fn validate_non_negative_amount(amount: f64, label: &str) -> Result<(), String> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(format!("{} cannot be negative", label));
    }
    Ok(())
}

/// Calendar date in `YYYY-MM-DD` form
pub fn validate_date(value: &str, label: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is required", label));
    }
    if parse_date(value).is_none() {
        return Err(format!("{} must be a date in YYYY-MM-DD format", label));
    }
    Ok(())
}

/// End date strictly after start date. Unparseable dates are reported by [`validate_date`].
pub fn validate_date_range(start: &str, end: &str) -> Result<(), String> {
    match (parse_date(start), parse_date(end)) {
        (Some(s), Some(e)) if e <= s => Err("End date must be after start date".to_string()),
        _ => Ok(()),
    }
}

pub fn validate_id(id: &str, label: &str) -> Result<(), String> {
    if !ID_REGEX.is_match(id) {
        return Err(format!("Invalid {}", label));
    }
    Ok(())
}

pub fn validate_media_urls(urls: &[String]) -> Result<(), String> {
    if urls.len() > 50 {
        return Err("Too many media items (max 50)".to_string());
    }
    if let Some(bad) = urls.iter().find(|u| !URL_REGEX.is_match(u)) {
        return Err(format!("Invalid media URL: {}", bad));
    }
    Ok(())
}

pub fn validate_amenities(amenities: &[String]) -> Result<(), String> {
    if amenities.len() > 50 {
        return Err("Too many amenities (max 50)".to_string());
    }
    if amenities.iter().any(|a| a.chars().count() > 100) {
        return Err("Amenity names are limited to 100 characters".to_string());
    }
    Ok(())
}

/// Password policy for portal accounts
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.len() < 10 {
        return Err("Password must be at least 10 characters".to_string());
    }
    if password.len() > 128 {
        return Err("Password is too long (max 128 characters)".to_string());
    }

    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if !(has_upper && has_lower && has_digit) {
        return Err(
            "Password must contain an uppercase letter, a lowercase letter and a digit".to_string(),
        );
    }
    Ok(())
}
