//! Input validation and sanitization for API requests.
//!
//! Validators return `Result<_, String>` so they can be fed into
//! `ValidationErrorBuilder::check` and reported per field.

use lazy_static::lazy_static;
use regex::Regex;
use uuid::Uuid;

use super::error::{ApiError, ValidationErrorBuilder};
use crate::booking::{self, ModuleSelection};
use crate::db::{CreateBookingRequest, NewBooking};

lazy_static! {
    /// Pragmatic email check: one @, no spaces, a dot in the domain
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^\s@]+@[^\s@]+\.[^\s@]+$"
    ).unwrap();

    /// Digits with optional leading +, spaces, dashes, dots and parentheses
    static ref PHONE_REGEX: Regex = Regex::new(
        r"^\+?[0-9 ()\-.]{7,20}$"
    ).unwrap();

    /// Catalog module slugs
    static ref SLUG_REGEX: Regex = Regex::new(
        r"^[a-z0-9]+(_[a-z0-9]+)*$"
    ).unwrap();
}

pub const MAX_TEXT_LENGTH: usize = 200;
pub const MAX_NOTES_LENGTH: usize = 2000;
pub const MAX_TOTAL_PRICE: f64 = 100_000.0;

/// Strip control characters and angle brackets, collapse whitespace runs.
pub fn sanitize_text(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || *c == '\n')
        .filter(|c| *c != '<' && *c != '>')
        .collect::<String>()
        .split(' ')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Sanitize an optional field, mapping blank values to `None`
pub fn sanitize_optional(input: &Option<String>) -> Option<String> {
    input
        .as_deref()
        .map(sanitize_text)
        .filter(|s| !s.is_empty())
}

pub fn validate_required_text(value: &str, label: &str, max: usize) -> Result<String, String> {
    let cleaned = sanitize_text(value);
    if cleaned.is_empty() {
        return Err(format!("{} is required", label));
    }
    if cleaned.chars().count() > max {
        return Err(format!("{} is too long (max {} characters)", label, max));
    }
    Ok(cleaned)
}

pub fn validate_email(email: &str) -> Result<String, String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }
    if !EMAIL_REGEX.is_match(&email) {
        return Err("Invalid email address".to_string());
    }
    Ok(email)
}

pub fn validate_phone(phone: &str) -> Result<String, String> {
    let phone = phone.trim();
    if !PHONE_REGEX.is_match(phone) {
        return Err("Invalid phone number".to_string());
    }
    Ok(phone.to_string())
}

pub fn validate_total_price(price: f64) -> Result<f64, String> {
    if !price.is_finite() {
        return Err("Total price must be a number".to_string());
    }
    // Checked in whole cents, so 0.004 is rejected rather than stored as 0
    let rounded = (price * 100.0).round() / 100.0;
    if rounded <= 0.0 {
        return Err("Total price must be greater than 0".to_string());
    }
    if rounded > MAX_TOTAL_PRICE {
        return Err(format!("Total price cannot exceed {}", MAX_TOTAL_PRICE));
    }
    Ok(rounded)
}

pub fn validate_price(price: f64) -> Result<f64, String> {
    if !price.is_finite() || price < 0.0 {
        return Err("Price must be zero or greater".to_string());
    }
    Ok(price)
}

pub fn validate_slug(slug: &str) -> Result<String, String> {
    let slug = slug.trim();
    if slug.is_empty() || slug.len() > 64 {
        return Err("Slug must be 1-64 characters".to_string());
    }
    if !SLUG_REGEX.is_match(slug) {
        return Err("Slug must be lowercase alphanumeric words joined by underscores".to_string());
    }
    Ok(slug.to_string())
}

pub fn validate_duration_minutes(minutes: i32) -> Result<i32, String> {
    if !(1..=24 * 60).contains(&minutes) {
        return Err("Duration must be between 1 and 1440 minutes".to_string());
    }
    Ok(minutes)
}

pub fn validate_vehicle_year(year: Option<i32>) -> Result<Option<i32>, String> {
    match year {
        Some(y) if !(1900..=2100).contains(&y) => {
            Err("Year must be between 1900 and 2100".to_string())
        }
        other => Ok(other),
    }
}

/// Module slugs must name known calculator modules; duplicates are dropped.
pub fn validate_selected_modules(modules: &[String]) -> Result<Vec<String>, String> {
    let selection = ModuleSelection::from_slugs(modules)?;
    Ok(selection.slugs().into_iter().map(str::to_string).collect())
}

/// Parse a page/status filter value
pub fn validate_status_filter(status: &Option<String>) -> Result<Option<crate::db::BookingStatus>, String> {
    match status.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some),
    }
}

/// Validate and sanitize a booking request.
pub fn validate_booking(
    request: &CreateBookingRequest,
    user_id: Option<Uuid>,
) -> Result<NewBooking, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    let booking_date = errors.check(
        "date",
        booking::parse_booking_date(&request.date).map_err(|e| e.to_string()),
    );
    let time_slot = errors.check(
        "time",
        booking::normalize_time_label(&request.time).map_err(|e| e.to_string()),
    );
    let car_model = errors.check(
        "carModel",
        validate_required_text(&request.car_model, "Car model", MAX_TEXT_LENGTH),
    );
    let package_name = errors.check(
        "packageName",
        validate_required_text(&request.package_name, "Package name", MAX_TEXT_LENGTH),
    );
    let total_price = errors.check("totalPrice", validate_total_price(request.total_price));
    let selected_modules = errors.check(
        "selectedModules",
        validate_selected_modules(&request.selected_modules),
    );

    let customer_email = match sanitize_optional(&request.customer_email) {
        Some(email) => errors.check("customerEmail", validate_email(&email)),
        None => None,
    };
    let customer_phone = match sanitize_optional(&request.customer_phone) {
        Some(phone) => errors.check("customerPhone", validate_phone(&phone)),
        None => None,
    };
    let customer_name = sanitize_optional(&request.customer_name);
    if customer_name
        .as_ref()
        .is_some_and(|n| n.chars().count() > MAX_TEXT_LENGTH)
    {
        errors.add("customerName", "Customer name is too long");
    }
    let notes = sanitize_optional(&request.notes);
    if notes
        .as_ref()
        .is_some_and(|n| n.chars().count() > MAX_NOTES_LENGTH)
    {
        errors.add("notes", format!("Notes are too long (max {} characters)", MAX_NOTES_LENGTH));
    }

    match (
        booking_date,
        time_slot,
        car_model,
        package_name,
        total_price,
        selected_modules,
    ) {
        (
            Some(booking_date),
            Some(time_slot),
            Some(car_model),
            Some(package_name),
            Some(total_price),
            Some(selected_modules),
        ) if errors.is_empty() => Ok(NewBooking {
            user_id,
            vehicle_id: request.vehicle_id,
            booking_date,
            time_slot,
            car_model,
            package_name,
            selected_modules,
            total_price,
            customer_name,
            customer_email,
            customer_phone,
            notes,
        }),
        _ => Err(errors
            .build()
            .unwrap_or_else(|| ApiError::bad_request("Invalid booking"))),
    }
}
