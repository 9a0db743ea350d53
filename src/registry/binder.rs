//! Scalar binding rules
//!
//! The fixed conversions from raw scalar-map values to typed parameters.
//! An absent key always yields the type's zero value without attempting
//! a decode; parse failures on `FromStr` scalars silently fall back to
//! the zero value, while JSON decode failures propagate so they surface
//! as the first outbound error.

use std::str::FromStr;

use serde::de::DeserializeOwned;

use crate::common::Scalars;
use crate::error::{Error, Result};

/// Raw string scalar: the value as-is, the empty string when absent.
pub fn text(scalars: &Scalars, name: &str) -> String {
    scalars.get(name).cloned().unwrap_or_default()
}

/// `FromStr` scalar: parse failures and absence both yield the zero value.
pub fn parsed<T>(scalars: &Scalars, name: &str) -> T
where
    T: FromStr + Default,
{
    scalars
        .get(name)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_default()
}

/// JSON-primitive scalar: the raw value is wrapped in double quotes and
/// decoded, so string-shaped primitives (datetimes, enums by name) can be
/// passed unquoted in a query string.
pub fn quoted<T>(scalars: &Scalars, name: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match scalars.get(name) {
        None => Ok(T::default()),
        Some(raw) => serde_json::from_str(&format!("\"{}\"", raw))
            .map_err(|e| Error::Decode(format!("parameter '{}': {}", name, e))),
    }
}

/// JSON scalar: the raw value is decoded as-is.
pub fn json<T>(scalars: &Scalars, name: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match scalars.get(name) {
        None => Ok(T::default()),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| Error::Decode(format!("parameter '{}': {}", name, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scalars(pairs: &[(&str, &str)]) -> Scalars {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_text_absent_is_empty() {
        let map = scalars(&[("msg", "hello")]);
        assert_eq!(text(&map, "msg"), "hello");
        assert_eq!(text(&map, "other"), "");
    }

    #[test]
    fn test_parsed_numeric() {
        let map = scalars(&[("n", "42"), ("bad", "forty-two")]);
        assert_eq!(parsed::<i64>(&map, "n"), 42);
        assert_eq!(parsed::<i64>(&map, "bad"), 0);
        assert_eq!(parsed::<i64>(&map, "absent"), 0);
    }

    #[test]
    fn test_parsed_bool_and_uuid() {
        let id = "f2b0a6a2-6f6c-4b1e-9d7a-3a8f2a5c9e01";
        let map = scalars(&[("flag", "true"), ("id", id)]);
        assert!(parsed::<bool>(&map, "flag"));
        assert_eq!(parsed::<Uuid>(&map, "id"), id.parse::<Uuid>().unwrap());
        assert_eq!(parsed::<Uuid>(&map, "absent"), Uuid::nil());
    }

    #[test]
    fn test_quoted_decodes_bare_string() {
        let map = scalars(&[("when", "2024-05-01T10:00:00Z")]);
        let value: String = quoted(&map, "when").unwrap();
        assert_eq!(value, "2024-05-01T10:00:00Z");
    }

    #[test]
    fn test_json_decode_and_zero_value() {
        let map = scalars(&[("point", "{\"x\":1,\"y\":2}"), ("broken", "{")]);

        #[derive(serde::Deserialize, Default, PartialEq, Debug)]
        struct Point {
            x: i32,
            y: i32,
        }

        assert_eq!(
            json::<Point>(&map, "point").unwrap(),
            Point { x: 1, y: 2 }
        );
        assert_eq!(json::<Point>(&map, "absent").unwrap(), Point::default());
        assert!(json::<Point>(&map, "broken").is_err());
    }
}
