//! ID generation utilities for deskpilot
//!
//! Provides functions for generating journal operation ids and planner
//! correlation ids.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Get current timestamp in whole seconds since Unix epoch
pub fn now_secs() -> u64 {
    now_ms() / 1000
}

/// Generate a journal operation ID
///
/// Format: `{unix_secs}-{8 hex chars}`
/// Example: `1738300800-a1b2c3d4`
pub fn generate_op_id() -> String {
    let random: [u8; 4] = rand::rng().random();
    format!("{}-{}", now_secs(), hex::encode(random))
}

/// Generate a correlation ID used to match a planner call with its result
///
/// Format: `call-{timestamp_ms}-{random_hex}`
pub fn generate_call_id() -> String {
    let random: u16 = rand::rng().random();
    format!("call-{}-{:04x}", now_ms(), random)
}

/// Check that an operation ID is safe to use as a file stem
pub fn is_valid_op_id(op_id: &str) -> bool {
    !op_id.is_empty() && op_id.len() <= 64 && op_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        assert!(ts > 1577836800000); // 2020-01-01
        assert!(ts < 4102444800000); // 2100-01-01
    }

    #[test]
    fn test_generate_op_id_format() {
        let id = generate_op_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_op_id_uniqueness() {
        assert_ne!(generate_op_id(), generate_op_id());
    }

    #[test]
    fn test_generate_call_id_format() {
        let id = generate_call_id();
        assert!(id.starts_with("call-"));
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].len(), 4);
    }

    #[test]
    fn test_is_valid_op_id() {
        assert!(is_valid_op_id(&generate_op_id()));
        assert!(is_valid_op_id("1738300800-a1b2c3d4"));
        assert!(!is_valid_op_id(""));
        assert!(!is_valid_op_id("../etc/passwd"));
        assert!(!is_valid_op_id("abc/def"));
    }
}
