//! Custom assertion helpers for common test patterns.
//!
//! Provides macros and functions for making test assertions more readable
//! and providing better error messages.

use serde_json::Value;

/// Assert that two strings are equal, with a nice diff on failure.
pub fn assert_strings_equal(actual: &str, expected: &str) {
    if actual != expected {
        panic!("Strings are not equal.\nDiff:\n{}", diff(expected, actual));
    }
}

/// Assert that two JSON documents are equal, diffing their pretty forms on
/// failure.
///
/// # Example
///
/// ```rust
/// use agstream_test_utils::assertions::assert_json_eq;
/// use serde_json::json;
///
/// assert_json_eq(&json!({"a": [1, 2]}), &json!({"a": [1, 2]}));
/// ```
pub fn assert_json_eq(actual: &Value, expected: &Value) {
    if actual != expected {
        let actual = serde_json::to_string_pretty(actual).unwrap_or_default();
        let expected = serde_json::to_string_pretty(expected).unwrap_or_default();
        panic!("JSON documents differ.\nDiff:\n{}", diff(&expected, &actual));
    }
}

fn diff(expected: &str, actual: &str) -> String {
    let diff = similar::TextDiff::from_lines(expected, actual);
    let mut output = String::new();

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            similar::ChangeTag::Delete => "-",
            similar::ChangeTag::Insert => "+",
            similar::ChangeTag::Equal => " ",
        };
        output.push_str(&format!("{}{}", sign, change));
    }
    output
}

/// Assert that a result is Ok and extract the value.
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($expr:expr, $msg:literal) => {
        match $expr {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $msg, e),
        }
    };
}

/// Assert that a result is Err and extract the error.
///
/// Does not require the Ok type to implement `Debug`.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(_) => panic!("Expected Err, got Ok"),
            Err(e) => e,
        }
    };
    ($expr:expr, $msg:literal) => {
        match $expr {
            Ok(_) => panic!("{}", $msg),
            Err(e) => e,
        }
    };
}

/// Assert that an option is Some and extract the value.
#[macro_export]
macro_rules! assert_some {
    ($expr:expr) => {
        match $expr {
            Some(value) => value,
            None => panic!("Expected Some, got None"),
        }
    };
    ($expr:expr, $msg:literal) => {
        match $expr {
            Some(value) => value,
            None => panic!("{}", $msg),
        }
    };
}

/// Assert that an option is None.
#[macro_export]
macro_rules! assert_none {
    ($expr:expr) => {
        if let Some(value) = $expr {
            panic!("Expected None, got Some: {:?}", value);
        }
    };
}
