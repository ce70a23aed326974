//! Serializers for text-representable values

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::DateTime;
use url::Url;
use uuid::Uuid;

use super::TypeSerializer;
use crate::error::{Error, Result};
use crate::node::Node;
use crate::types::DataType;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    String,
    Bool,
    I32,
    I64,
    U32,
    U64,
    F32,
    F64,
    Char,
    DateTime,
    Bytes,
    Uuid,
    Uri,
}

/// Reads and writes a value as the node's text
#[derive(Debug)]
pub(crate) struct TextSerializer {
    kind: Kind,
}

impl TextSerializer {
    /// The built-in serializer for `data_type`, by descriptor name
    pub(crate) fn for_type(data_type: &DataType) -> Option<Self> {
        let kind = match data_type.name() {
            "string" => Kind::String,
            "bool" => Kind::Bool,
            "i32" => Kind::I32,
            "i64" => Kind::I64,
            "u32" => Kind::U32,
            "u64" => Kind::U64,
            "f32" => Kind::F32,
            "f64" => Kind::F64,
            "char" => Kind::Char,
            "datetime" => Kind::DateTime,
            "bytes" => Kind::Bytes,
            "uuid" => Kind::Uuid,
            "uri" => Kind::Uri,
            _ => return None,
        };
        Some(TextSerializer { kind })
    }

    pub(crate) fn parse(&self, text: &str) -> Result<Value> {
        let trimmed = text.trim();
        let value = match self.kind {
            Kind::String => Value::String(text.to_string()),
            Kind::Bool => match trimmed {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => return Err(invalid(trimmed, "bool")),
            },
            Kind::I32 => Value::Int(
                trimmed
                    .parse::<i32>()
                    .map_err(|_| invalid(trimmed, "i32"))?
                    .into(),
            ),
            Kind::I64 => Value::Int(trimmed.parse().map_err(|_| invalid(trimmed, "i64"))?),
            Kind::U32 => Value::UInt(
                trimmed
                    .parse::<u32>()
                    .map_err(|_| invalid(trimmed, "u32"))?
                    .into(),
            ),
            Kind::U64 => Value::UInt(trimmed.parse().map_err(|_| invalid(trimmed, "u64"))?),
            Kind::F32 | Kind::F64 => Value::Float(parse_float(trimmed)?),
            Kind::Char => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Value::Char(c),
                    _ => return Err(invalid(text, "char")),
                }
            }
            Kind::DateTime => Value::DateTime(
                DateTime::parse_from_rfc3339(trimmed).map_err(|_| invalid(trimmed, "datetime"))?,
            ),
            Kind::Bytes => Value::Bytes(STANDARD.decode(trimmed).map_err(|_| invalid(trimmed, "base64"))?),
            Kind::Uuid => Value::Uuid(Uuid::parse_str(trimmed).map_err(|_| invalid(trimmed, "uuid"))?),
            Kind::Uri => Value::Uri(Url::parse(trimmed).map_err(|_| invalid(trimmed, "uri"))?),
        };
        Ok(value)
    }

    pub(crate) fn format(&self, value: &Value) -> Result<String> {
        let text = match (self.kind, value) {
            (Kind::String, Value::String(s)) => s.clone(),
            (Kind::Bool, Value::Bool(b)) => b.to_string(),
            (Kind::I32, Value::Int(n)) => i32::try_from(*n)
                .map_err(|_| Error::serialization(format!("{} does not fit in i32", n)))?
                .to_string(),
            (Kind::I64, Value::Int(n)) => n.to_string(),
            (Kind::U32, Value::UInt(n)) => u32::try_from(*n)
                .map_err(|_| Error::serialization(format!("{} does not fit in u32", n)))?
                .to_string(),
            (Kind::U64, Value::UInt(n)) => n.to_string(),
            (Kind::F32 | Kind::F64, Value::Float(n)) => format_float(*n),
            (Kind::Char, Value::Char(c)) => c.to_string(),
            (Kind::DateTime, Value::DateTime(d)) => d.to_rfc3339(),
            (Kind::Bytes, Value::Bytes(b)) => STANDARD.encode(b),
            (Kind::Uuid, Value::Uuid(u)) => u.hyphenated().to_string(),
            (Kind::Uri, Value::Uri(u)) => u.to_string(),
            (kind, other) => {
                return Err(Error::serialization(format!(
                    "cannot write {:?} as {:?}",
                    other, kind
                )))
            }
        };
        Ok(text)
    }
}

impl TypeSerializer for TextSerializer {
    fn read(&self, node: &Node) -> Result<Value> {
        self.parse(&node.value())
    }

    fn write(&self, node: &Node, value: &Value) -> Result<()> {
        let text = self.format(value)?;
        node.set_value(&text)
    }

    fn check(&self, value: &Value) -> Result<()> {
        self.format(value).map(drop)
    }
}

fn invalid(text: &str, kind: &str) -> Error {
    Error::serialization(format!("`{}` is not a valid {}", text, kind))
}

fn parse_float(text: &str) -> Result<f64> {
    match text {
        "INF" => Ok(f64::INFINITY),
        "-INF" => Ok(f64::NEG_INFINITY),
        "NaN" => Ok(f64::NAN),
        _ => text.parse().map_err(|_| invalid(text, "float")),
    }
}

fn format_float(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "INF" } else { "-INF" };
        text.to_string()
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn text(name: &str) -> TextSerializer {
        TextSerializer::for_type(&DataType::value(name)).unwrap()
    }

    #[rstest]
    #[case("bool", "1", Value::Bool(true))]
    #[case("bool", " false ", Value::Bool(false))]
    #[case("i32", "-42", Value::Int(-42))]
    #[case("u64", "18446744073709551615", Value::UInt(u64::MAX))]
    #[case("f64", "INF", Value::Float(f64::INFINITY))]
    #[case("char", "é", Value::Char('é'))]
    #[case("bytes", "aGk=", Value::Bytes(b"hi".to_vec()))]
    fn test_parse(#[case] name: &str, #[case] input: &str, #[case] expected: Value) {
        assert_eq!(text(name).parse(input).unwrap(), expected);
    }

    #[rstest]
    #[case("bool", "yes")]
    #[case("i32", "2147483648")]
    #[case("u32", "-1")]
    #[case("char", "ab")]
    #[case("datetime", "yesterday")]
    #[case("uuid", "not-a-uuid")]
    #[case("uri", "no scheme")]
    fn test_parse_rejects(#[case] name: &str, #[case] input: &str) {
        assert!(matches!(text(name).parse(input), Err(Error::Serialization(_))));
    }

    #[test]
    fn test_format() {
        assert_eq!(text("bool").format(&Value::Bool(true)).unwrap(), "true");
        assert_eq!(text("f64").format(&Value::Float(1.5)).unwrap(), "1.5");
        assert_eq!(text("f64").format(&Value::Float(f64::NEG_INFINITY)).unwrap(), "-INF");
        assert_eq!(text("bytes").format(&Value::Bytes(b"hi".to_vec())).unwrap(), "aGk=");
        assert!(matches!(
            text("i32").format(&Value::Int(i64::MAX)),
            Err(Error::Serialization(_))
        ));
        assert!(matches!(
            text("string").format(&Value::Int(1)),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_datetime_keeps_offset() {
        let value = text("datetime").parse("2024-03-01T12:30:00+02:00").unwrap();
        assert_eq!(
            text("datetime").format(&value).unwrap(),
            "2024-03-01T12:30:00+02:00"
        );
    }

    #[test]
    fn test_unknown_name() {
        assert!(TextSerializer::for_type(&DataType::reference("Person")).is_none());
    }
}
