//! Loose JSON-shaped values into exact ABI tokens

use crate::abi::{AbiKind, AbiParam};
use ethers::abi::Token;
use ethers::types::{Address, I256, U256};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("cannot convert negative value {value} to uint{bits}")]
    Negative { value: String, bits: usize },

    #[error("value {value} exceeds maximum uint{bits} value")]
    Overflow { value: String, bits: usize },

    #[error("value {value} out of range for int{bits}")]
    OutOfRange { value: String, bits: usize },

    #[error("cannot convert string to integer: {0}")]
    InvalidNumber(String),

    #[error("cannot convert {from} to {to}")]
    Unsupported { from: &'static str, to: &'static str },

    #[error("invalid boolean literal: {0}")]
    InvalidBool(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("expected {expected} bytes, got {actual}")]
    ByteLength { expected: usize, actual: usize },

    #[error("expected {expected} array elements, got {actual}")]
    ArrayLength { expected: usize, actual: usize },

    #[error("failed to parse string as JSON array: {0}")]
    JsonArray(String),

    #[error("failed to parse string as JSON object: {0}")]
    JsonObject(String),

    #[error("error converting array element {index}: {inner}")]
    Element { index: usize, inner: Box<ConversionError> },

    #[error("error converting struct field {name}: {inner}")]
    Field { name: String, inner: Box<ConversionError> },

    #[error("field {0} not found in input data")]
    MissingField(String),

    #[error("error converting argument {name}: {inner}")]
    Argument { name: String, inner: Box<ConversionError> },

    #[error("not enough arguments provided: expected {expected}, got {actual}")]
    NotEnoughArguments { expected: usize, actual: usize },

    #[error("argument {0} not found in input data")]
    MissingArgument(String),

    #[error("cannot use map arguments with unnamed parameters")]
    UnnamedParameters,

    #[error("cannot convert single string to {0} arguments")]
    SingleStringForMany(usize),

    #[error("unsupported argument format: {0}")]
    UnsupportedFormat(&'static str),
}

/// Loosely typed input value
#[derive(Debug, Clone, PartialEq)]
pub enum SourceValue {
    Null,
    Bool(bool),
    Number(f64),
    Integer(I256),
    Text(String),
    Sequence(Vec<SourceValue>),
    Map(BTreeMap<String, SourceValue>),
}

impl From<Value> for SourceValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(I256::from(i))
                } else if let Some(u) = n.as_u64() {
                    Self::Integer(I256::from_raw(U256::from(u)))
                } else {
                    Self::Number(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => Self::Text(s),
            Value::Array(items) => Self::Sequence(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<&str> for SourceValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl SourceValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) | Self::Integer(_) => "number",
            Self::Text(_) => "string",
            Self::Sequence(_) => "sequence",
            Self::Map(_) => "map",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Integer(i) => i
                .to_string()
                .parse::<serde_json::Number>()
                .map(Value::Number)
                .unwrap_or_else(|_| Value::String(i.to_string())),
            Self::Text(s) => Value::String(s.clone()),
            Self::Sequence(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Sign and magnitude of an integer candidate, plus how it was written
struct IntegerParts {
    negative: bool,
    magnitude: U256,
    display: String,
}

impl IntegerParts {
    fn from_float(value: f64, display: String) -> Result<Self, ConversionError> {
        if !value.is_finite() {
            return Err(ConversionError::InvalidNumber(display));
        }
        let truncated = value.trunc().abs();
        let magnitude = if truncated < u64::MAX as f64 {
            U256::from(truncated as u64)
        } else {
            U256::from_dec_str(&format!("{:.0}", truncated))
                .map_err(|_| ConversionError::InvalidNumber(display.clone()))?
        };
        Ok(Self {
            negative: value < 0.0,
            magnitude,
            display,
        })
    }

    fn from_i256(value: I256) -> Self {
        Self {
            negative: value.is_negative(),
            magnitude: value.unsigned_abs(),
            display: value.to_string(),
        }
    }

    /// Exact decimal integer text, if that is what `text` holds
    fn from_exact(text: &str) -> Option<Self> {
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let magnitude = U256::from_dec_str(digits).ok()?;
        Some(Self {
            negative: negative && !magnitude.is_zero(),
            magnitude,
            display: text.to_string(),
        })
    }
}

/// Largest magnitude of a signed type of `bits` width for the given sign
fn signed_limit(bits: usize, negative: bool) -> U256 {
    let half = U256::one() << (bits - 1);
    if negative {
        half
    } else {
        half - 1
    }
}

fn fits_unsigned(magnitude: U256, bits: usize) -> bool {
    magnitude.bits() <= bits
}

/// Converts loosely typed values by ABI type category.
///
/// Missing tuple fields are zero-filled with a warning unless `strict` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArgumentConverter {
    pub strict: bool,
}

impl ArgumentConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        Self { strict: true }
    }

    pub fn convert(&self, value: &SourceValue, kind: &AbiKind) -> Result<Token, ConversionError> {
        match kind {
            AbiKind::Uint(bits) => self.to_integer(value, *bits, false),
            AbiKind::Int(bits) => self.to_integer(value, *bits, true),
            AbiKind::String => self.to_text(value).map(Token::String),
            AbiKind::Bool => self.to_bool(value).map(Token::Bool),
            AbiKind::Address => self.to_address(value).map(Token::Address),
            AbiKind::Bytes => self.to_bytes(value).map(Token::Bytes),
            AbiKind::FixedBytes(size) => {
                let bytes = self.to_bytes(value)?;
                if bytes.len() != *size {
                    return Err(ConversionError::ByteLength {
                        expected: *size,
                        actual: bytes.len(),
                    });
                }
                Ok(Token::FixedBytes(bytes))
            }
            AbiKind::Array(inner) => self.to_sequence(value, inner).map(Token::Array),
            AbiKind::FixedArray(inner, len) => {
                let tokens = self.to_sequence(value, inner)?;
                if tokens.len() != *len {
                    return Err(ConversionError::ArrayLength {
                        expected: *len,
                        actual: tokens.len(),
                    });
                }
                Ok(Token::FixedArray(tokens))
            }
            AbiKind::Tuple(fields) => self.to_tuple(value, fields),
        }
    }

    fn to_integer(&self, value: &SourceValue, bits: usize, signed: bool) -> Result<Token, ConversionError> {
        let fixed_width = matches!(bits, 8 | 16 | 32 | 64);
        let target = if signed { "integer" } else { "unsigned integer" };

        let parts = match value {
            SourceValue::Integer(i) => IntegerParts::from_i256(*i),
            SourceValue::Number(f) => IntegerParts::from_float(*f, f.to_string())?,
            SourceValue::Text(text) => {
                let text = text.trim();
                let exact = if fixed_width {
                    None
                } else {
                    IntegerParts::from_exact(text)
                };
                match exact {
                    Some(parts) => parts,
                    None => {
                        let parsed = text
                            .parse::<f64>()
                            .map_err(|_| ConversionError::InvalidNumber(text.to_string()))?;
                        IntegerParts::from_float(parsed, text.to_string())?
                    }
                }
            }
            SourceValue::Map(_) => {
                return Err(ConversionError::Unsupported { from: "map", to: "integer" })
            }
            other => {
                return Err(ConversionError::Unsupported {
                    from: other.kind_name(),
                    to: target,
                })
            }
        };

        if signed {
            if parts.magnitude > signed_limit(bits, parts.negative) {
                return Err(ConversionError::OutOfRange {
                    value: parts.display,
                    bits,
                });
            }
            let raw = if parts.negative {
                U256::zero().overflowing_sub(parts.magnitude).0
            } else {
                parts.magnitude
            };
            Ok(Token::Int(raw))
        } else {
            if parts.negative {
                return Err(ConversionError::Negative {
                    value: parts.display,
                    bits,
                });
            }
            if !fits_unsigned(parts.magnitude, bits) {
                return Err(ConversionError::Overflow {
                    value: parts.display,
                    bits,
                });
            }
            Ok(Token::Uint(parts.magnitude))
        }
    }

    fn to_text(&self, value: &SourceValue) -> Result<String, ConversionError> {
        match value {
            SourceValue::Text(s) => Ok(s.clone()),
            SourceValue::Number(f) => Ok(f.to_string()),
            SourceValue::Integer(i) => Ok(i.to_string()),
            SourceValue::Map(_) => Ok(value.to_json().to_string()),
            other => Err(ConversionError::Unsupported {
                from: other.kind_name(),
                to: "string",
            }),
        }
    }

    fn to_bool(&self, value: &SourceValue) -> Result<bool, ConversionError> {
        match value {
            SourceValue::Bool(b) => Ok(*b),
            SourceValue::Text(s) => match s.as_str() {
                "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
                "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
                other => Err(ConversionError::InvalidBool(other.to_string())),
            },
            SourceValue::Number(f) => Ok(*f != 0.0),
            SourceValue::Integer(i) => Ok(!i.is_zero()),
            other => Err(ConversionError::Unsupported {
                from: other.kind_name(),
                to: "bool",
            }),
        }
    }

    fn to_address(&self, value: &SourceValue) -> Result<Address, ConversionError> {
        match value {
            SourceValue::Text(s) => parse_address(s),
            SourceValue::Map(map) => match map.get("address") {
                Some(SourceValue::Text(s)) => parse_address(s),
                _ => Err(ConversionError::Unsupported { from: "map", to: "address" }),
            },
            other => Err(ConversionError::Unsupported {
                from: other.kind_name(),
                to: "address",
            }),
        }
    }

    fn to_bytes(&self, value: &SourceValue) -> Result<Vec<u8>, ConversionError> {
        match value {
            SourceValue::Text(s) => match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(digits) => {
                    let padded = if digits.len() % 2 == 1 {
                        format!("0{}", digits)
                    } else {
                        digits.to_string()
                    };
                    hex::decode(padded).map_err(|_| ConversionError::InvalidHex(s.clone()))
                }
                None => Ok(s.as_bytes().to_vec()),
            },
            SourceValue::Map(_) => Ok(value.to_json().to_string().into_bytes()),
            other => Err(ConversionError::Unsupported {
                from: other.kind_name(),
                to: "bytes",
            }),
        }
    }

    fn to_sequence(&self, value: &SourceValue, inner: &AbiKind) -> Result<Vec<Token>, ConversionError> {
        let parsed;
        let items = match value {
            SourceValue::Sequence(items) => items,
            SourceValue::Text(s) => {
                let values: Vec<Value> =
                    serde_json::from_str(s).map_err(|e| ConversionError::JsonArray(e.to_string()))?;
                parsed = values.into_iter().map(SourceValue::from).collect::<Vec<_>>();
                &parsed
            }
            other => {
                return Err(ConversionError::Unsupported {
                    from: other.kind_name(),
                    to: "array",
                })
            }
        };

        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                self.convert(item, inner).map_err(|e| ConversionError::Element {
                    index,
                    inner: Box::new(e),
                })
            })
            .collect()
    }

    fn to_tuple(&self, value: &SourceValue, fields: &[AbiParam]) -> Result<Token, ConversionError> {
        let parsed;
        let map = match value {
            SourceValue::Map(map) => map,
            SourceValue::Text(s) => {
                parsed = parse_object(s)?;
                &parsed
            }
            other => {
                return Err(ConversionError::Unsupported {
                    from: other.kind_name(),
                    to: "struct",
                })
            }
        };

        let mut tokens = Vec::with_capacity(fields.len());
        for field in fields {
            let source = map.get(&field.name).or_else(|| {
                map.iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(&field.name))
                    .map(|(_, v)| v)
            });

            match source {
                Some(source) => {
                    let token = self.convert(source, &field.kind).map_err(|e| ConversionError::Field {
                        name: field.name.clone(),
                        inner: Box::new(e),
                    })?;
                    tokens.push(token);
                }
                None if self.strict => return Err(ConversionError::MissingField(field.name.clone())),
                None => {
                    warn!(field = %field.name, "Field not found in input data, using zero value");
                    tokens.push(zero_token(&field.kind));
                }
            }
        }

        Ok(Token::Tuple(tokens))
    }

    /// Bind a whole argument payload to a method's inputs
    pub fn process_arguments(
        &self,
        args: &SourceValue,
        inputs: &[AbiParam],
    ) -> Result<Vec<Token>, ConversionError> {
        if let [single] = inputs {
            if let AbiKind::Tuple(fields) = &single.kind {
                if let Some(token) = self.single_struct(args, fields)? {
                    return Ok(vec![token]);
                }
            }
        }

        match args {
            SourceValue::Text(text) if inputs.len() == 1 => {
                let text = text.trim_matches('"');
                let token = self
                    .convert(&SourceValue::Text(text.to_string()), &inputs[0].kind)
                    .map_err(|e| argument_error(&inputs[0], 0, e))?;
                Ok(vec![token])
            }
            SourceValue::Text(text) => {
                let values: Vec<Value> = serde_json::from_str(text)
                    .map_err(|_| ConversionError::SingleStringForMany(inputs.len()))?;
                let items: Vec<SourceValue> = values.into_iter().map(SourceValue::from).collect();
                self.positional(&items, inputs)
            }
            SourceValue::Sequence(items) => self.positional(items, inputs),
            SourceValue::Map(map) => inputs
                .iter()
                .enumerate()
                .map(|(index, param)| {
                    if param.name.is_empty() {
                        return Err(ConversionError::UnnamedParameters);
                    }
                    let value = map
                        .get(&param.name)
                        .or_else(|| {
                            map.iter()
                                .find(|(key, _)| key.eq_ignore_ascii_case(&param.name))
                                .map(|(_, v)| v)
                        })
                        .ok_or_else(|| ConversionError::MissingArgument(param.name.clone()))?;
                    self.convert(value, &param.kind)
                        .map_err(|e| argument_error(param, index, e))
                })
                .collect(),
            other => Err(ConversionError::UnsupportedFormat(other.kind_name())),
        }
    }

    /// A lone struct parameter accepts a map, a JSON object string, or a one-element wrapper of either
    fn single_struct(
        &self,
        args: &SourceValue,
        fields: &[AbiParam],
    ) -> Result<Option<Token>, ConversionError> {
        let candidate = match args {
            SourceValue::Sequence(items) if items.len() == 1 => &items[0],
            other => other,
        };

        match candidate {
            SourceValue::Map(_) => self.to_tuple(candidate, fields).map(Some),
            SourceValue::Text(text) => match parse_object(text) {
                Ok(map) => self.to_tuple(&SourceValue::Map(map), fields).map(Some),
                Err(_) => Ok(None),
            },
            _ => Ok(None),
        }
    }

    fn positional(&self, items: &[SourceValue], inputs: &[AbiParam]) -> Result<Vec<Token>, ConversionError> {
        if items.len() < inputs.len() {
            return Err(ConversionError::NotEnoughArguments {
                expected: inputs.len(),
                actual: items.len(),
            });
        }

        inputs
            .iter()
            .zip(items)
            .enumerate()
            .map(|(index, (param, item))| {
                self.convert(item, &param.kind)
                    .map_err(|e| argument_error(param, index, e))
            })
            .collect()
    }
}

fn argument_error(param: &AbiParam, index: usize, inner: ConversionError) -> ConversionError {
    let name = if param.name.is_empty() {
        index.to_string()
    } else {
        param.name.clone()
    };
    ConversionError::Argument {
        name,
        inner: Box::new(inner),
    }
}

fn parse_object(text: &str) -> Result<BTreeMap<String, SourceValue>, ConversionError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map.into_iter().map(|(k, v)| (k, SourceValue::from(v))).collect()),
        Ok(other) => Err(ConversionError::JsonObject(format!("expected object, got {}", other))),
        Err(e) => Err(ConversionError::JsonObject(e.to_string())),
    }
}

fn parse_address(text: &str) -> Result<Address, ConversionError> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if digits.len() != 40 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ConversionError::InvalidAddress(text.to_string()));
    }
    Address::from_str(digits).map_err(|_| ConversionError::InvalidAddress(text.to_string()))
}

/// Default value for a type, used for missing struct fields
pub fn zero_token(kind: &AbiKind) -> Token {
    match kind {
        AbiKind::Uint(_) => Token::Uint(U256::zero()),
        AbiKind::Int(_) => Token::Int(U256::zero()),
        AbiKind::String => Token::String(String::new()),
        AbiKind::Bool => Token::Bool(false),
        AbiKind::Address => Token::Address(Address::zero()),
        AbiKind::Bytes => Token::Bytes(Vec::new()),
        AbiKind::FixedBytes(size) => Token::FixedBytes(vec![0; *size]),
        AbiKind::Array(_) => Token::Array(Vec::new()),
        AbiKind::FixedArray(inner, len) => Token::FixedArray(vec![zero_token(inner); *len]),
        AbiKind::Tuple(fields) => Token::Tuple(fields.iter().map(|f| zero_token(&f.kind)).collect()),
    }
}

/// JSON rendering of a converted argument for the action record
pub fn token_to_json(token: &Token) -> Value {
    match token {
        Token::Address(address) => Value::String(format!("{:?}", address)),
        Token::FixedBytes(bytes) | Token::Bytes(bytes) => {
            Value::String(format!("0x{}", hex::encode(bytes)))
        }
        Token::Int(raw) => Value::String(I256::from_raw(*raw).to_string()),
        Token::Uint(value) => Value::String(value.to_string()),
        Token::Bool(b) => Value::Bool(*b),
        Token::String(s) => Value::String(s.clone()),
        Token::FixedArray(items) | Token::Array(items) | Token::Tuple(items) => {
            Value::Array(items.iter().map(token_to_json).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn convert(value: Value, kind: AbiKind) -> Result<Token, ConversionError> {
        ArgumentConverter::new().convert(&SourceValue::from(value), &kind)
    }

    fn uint(n: u64) -> Token {
        Token::Uint(U256::from(n))
    }

    fn int(n: i64) -> Token {
        Token::Int(I256::from(n).into_raw())
    }

    #[test]
    fn fixed_width_integers() {
        let cases: Vec<(Value, AbiKind, Result<Token, &str>)> = vec![
            (json!("42"), AbiKind::Uint(8), Ok(uint(42))),
            (json!("255"), AbiKind::Uint(8), Ok(uint(255))),
            (json!("256"), AbiKind::Uint(8), Err("value 256 exceeds maximum uint8 value")),
            (json!("-1"), AbiKind::Uint(32), Err("cannot convert negative value -1 to uint32")),
            (json!(-1), AbiKind::Uint(64), Err("cannot convert negative value -1 to uint64")),
            (json!("12.9"), AbiKind::Uint(32), Ok(uint(12))),
            (json!(4294967295u64), AbiKind::Uint(32), Ok(uint(4294967295))),
            (json!(4294967296u64), AbiKind::Uint(32), Err("value 4294967296 exceeds maximum uint32 value")),
            (json!("-128"), AbiKind::Int(8), Ok(int(-128))),
            (json!("127"), AbiKind::Int(8), Ok(int(127))),
            (json!("128"), AbiKind::Int(8), Err("value 128 out of range for int8")),
            (json!(-3.7), AbiKind::Int(16), Ok(int(-3))),
            (json!("abc"), AbiKind::Uint(16), Err("cannot convert string to integer: abc")),
        ];

        for (input, kind, expected) in cases {
            let label = format!("{} as {}", input, kind.canonical());
            match (convert(input, kind), expected) {
                (Ok(token), Ok(want)) => assert_eq!(token, want, "{}", label),
                (Err(err), Err(want)) => assert_eq!(err.to_string(), want, "{}", label),
                (got, want) => panic!("{}: got {:?}, want {:?}", label, got, want),
            }
        }
    }

    #[test]
    fn wide_integers_keep_precision() {
        let big = "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        assert_eq!(convert(json!(big), AbiKind::Uint(256)).unwrap(), Token::Uint(U256::MAX));

        assert_eq!(
            convert(json!("1000000000000000000000"), AbiKind::Uint(256)).unwrap(),
            Token::Uint(U256::exp10(21))
        );
        assert_eq!(convert(json!("7.99"), AbiKind::Uint(256)).unwrap(), uint(7));
        assert_eq!(convert(json!(1e20), AbiKind::Uint(128)).unwrap(), Token::Uint(U256::exp10(20)));
        assert_eq!(convert(json!("-5"), AbiKind::Int(256)).unwrap(), int(-5));

        assert_eq!(
            convert(json!({"v": 1}), AbiKind::Uint(256)).unwrap_err().to_string(),
            "cannot convert map to integer"
        );
        assert!(matches!(
            convert(json!("-1"), AbiKind::Uint(256)),
            Err(ConversionError::Negative { .. })
        ));
        assert!(matches!(
            convert(json!("16777216"), AbiKind::Uint(24)),
            Err(ConversionError::Overflow { .. })
        ));
    }

    #[test]
    fn text_bool_address() {
        assert_eq!(convert(json!("hi"), AbiKind::String).unwrap(), Token::String("hi".into()));
        assert_eq!(convert(json!(1.5), AbiKind::String).unwrap(), Token::String("1.5".into()));
        assert_eq!(convert(json!(3), AbiKind::String).unwrap(), Token::String("3".into()));
        assert_eq!(
            convert(json!({"b": 2, "a": 1}), AbiKind::String).unwrap(),
            Token::String(r#"{"a":1,"b":2}"#.into())
        );

        let bools = [
            (json!(true), true),
            (json!("1"), true),
            (json!("T"), true),
            (json!("False"), false),
            (json!("0"), false),
            (json!(2.5), true),
            (json!(0), false),
        ];
        for (input, want) in bools {
            assert_eq!(convert(input.clone(), AbiKind::Bool).unwrap(), Token::Bool(want), "{}", input);
        }
        assert!(convert(json!("yes"), AbiKind::Bool).is_err());

        let address = "0x00000000000000000000000000000000000000aa";
        let want = Token::Address(Address::from_low_u64_be(0xaa));
        assert_eq!(convert(json!(address), AbiKind::Address).unwrap(), want);
        assert_eq!(convert(json!(&address[2..]), AbiKind::Address).unwrap(), want);
        assert_eq!(convert(json!({"address": address}), AbiKind::Address).unwrap(), want);
        assert!(matches!(
            convert(json!("0x1234"), AbiKind::Address),
            Err(ConversionError::InvalidAddress(_))
        ));
    }

    #[test]
    fn byte_strings() {
        assert_eq!(
            convert(json!("0xdeadbeef"), AbiKind::Bytes).unwrap(),
            Token::Bytes(vec![0xde, 0xad, 0xbe, 0xef])
        );
        assert_eq!(convert(json!("abc"), AbiKind::Bytes).unwrap(), Token::Bytes(b"abc".to_vec()));
        assert_eq!(
            convert(json!({"k": "v"}), AbiKind::Bytes).unwrap(),
            Token::Bytes(br#"{"k":"v"}"#.to_vec())
        );

        let word = format!("0x{}", "11".repeat(32));
        assert_eq!(
            convert(json!(word), AbiKind::FixedBytes(32)).unwrap(),
            Token::FixedBytes(vec![0x11; 32])
        );
        assert_eq!(
            convert(json!("0x1122"), AbiKind::FixedBytes(4)).unwrap_err(),
            ConversionError::ByteLength { expected: 4, actual: 2 }
        );
    }

    #[test]
    fn arrays() {
        let uints = AbiKind::Array(Box::new(AbiKind::Uint(256)));
        assert_eq!(
            convert(json!(["1", 2, "3"]), uints.clone()).unwrap(),
            Token::Array(vec![uint(1), uint(2), uint(3)])
        );
        assert_eq!(convert(json!("[4,5]"), uints.clone()).unwrap(), Token::Array(vec![uint(4), uint(5)]));
        assert_eq!(convert(json!([]), uints.clone()).unwrap(), Token::Array(vec![]));
        assert!(matches!(convert(json!("nope"), uints.clone()), Err(ConversionError::JsonArray(_))));
        assert_eq!(
            convert(json!(["1", "x"]), uints).unwrap_err().to_string(),
            "error converting array element 1: cannot convert string to integer: x"
        );

        let triple = AbiKind::FixedArray(Box::new(AbiKind::Bool), 3);
        assert_eq!(
            convert(json!([true, false, true]), triple.clone()).unwrap(),
            Token::FixedArray(vec![Token::Bool(true), Token::Bool(false), Token::Bool(true)])
        );
        assert_eq!(
            convert(json!([true]), triple).unwrap_err(),
            ConversionError::ArrayLength { expected: 3, actual: 1 }
        );
    }

    fn order_kind() -> AbiKind {
        AbiKind::Tuple(vec![
            AbiParam::new("recipient", AbiKind::Address),
            AbiParam::new("amount", AbiKind::Uint(256)),
            AbiParam::new("memo", AbiKind::String),
        ])
    }

    #[test]
    fn tuples_match_fields_case_insensitively() {
        let recipient = "0x00000000000000000000000000000000000000bb";
        let token = convert(
            json!({"Recipient": recipient, "AMOUNT": "10", "memo": "rent"}),
            order_kind(),
        )
        .unwrap();
        assert_eq!(
            token,
            Token::Tuple(vec![
                Token::Address(Address::from_low_u64_be(0xbb)),
                uint(10),
                Token::String("rent".into()),
            ])
        );

        let from_text = convert(
            json!(format!(r#"{{"recipient":"{}","amount":10,"memo":"rent"}}"#, recipient)),
            order_kind(),
        )
        .unwrap();
        assert_eq!(from_text, token);
    }

    #[test]
    fn missing_tuple_fields() {
        let partial = SourceValue::from(json!({"amount": 3}));

        let token = ArgumentConverter::new().convert(&partial, &order_kind()).unwrap();
        assert_eq!(
            token,
            Token::Tuple(vec![Token::Address(Address::zero()), uint(3), Token::String(String::new())])
        );

        let err = ArgumentConverter::strict().convert(&partial, &order_kind()).unwrap_err();
        assert_eq!(err.to_string(), "field recipient not found in input data");
    }

    #[test]
    fn process_arguments_shapes() {
        let converter = ArgumentConverter::new();
        let transfer = vec![
            AbiParam::new("to", AbiKind::Address),
            AbiParam::new("amount", AbiKind::Uint(256)),
        ];
        let to = "0x00000000000000000000000000000000000000cc";
        let want = vec![Token::Address(Address::from_low_u64_be(0xcc)), uint(9)];

        let positional = SourceValue::from(json!([to, "9"]));
        assert_eq!(converter.process_arguments(&positional, &transfer).unwrap(), want);

        let extra = SourceValue::from(json!([to, "9", "ignored"]));
        assert_eq!(converter.process_arguments(&extra, &transfer).unwrap(), want);

        let named = SourceValue::from(json!({"TO": to, "amount": 9}));
        assert_eq!(converter.process_arguments(&named, &transfer).unwrap(), want);

        let text = SourceValue::from(json!(format!(r#"["{}", 9]"#, to)));
        assert_eq!(converter.process_arguments(&text, &transfer).unwrap(), want);

        let short = SourceValue::from(json!([to]));
        assert_eq!(
            converter.process_arguments(&short, &transfer).unwrap_err().to_string(),
            "not enough arguments provided: expected 2, got 1"
        );

        let unnamed = vec![AbiParam::new("", AbiKind::Uint(8)), AbiParam::new("", AbiKind::Uint(8))];
        assert_eq!(
            converter.process_arguments(&named, &unnamed).unwrap_err(),
            ConversionError::UnnamedParameters
        );

        assert_eq!(
            converter
                .process_arguments(&SourceValue::from("plain"), &transfer)
                .unwrap_err(),
            ConversionError::SingleStringForMany(2)
        );
    }

    #[test]
    fn single_string_strips_quotes() {
        let converter = ArgumentConverter::new();
        let inputs = vec![AbiParam::new("value", AbiKind::Uint(256))];

        let tokens = converter
            .process_arguments(&SourceValue::from("\"77\""), &inputs)
            .unwrap();
        assert_eq!(tokens, vec![uint(77)]);

        let err = converter
            .process_arguments(&SourceValue::from("x"), &inputs)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "error converting argument value: cannot convert string to integer: x"
        );
    }

    #[test]
    fn single_struct_input_shapes() {
        let converter = ArgumentConverter::new();
        let inputs = vec![AbiParam::new("order", order_kind())];
        let object = json!({"recipient": "0x00000000000000000000000000000000000000bb", "amount": 1, "memo": "m"});

        let direct = converter
            .process_arguments(&SourceValue::from(object.clone()), &inputs)
            .unwrap();
        let wrapped = converter
            .process_arguments(&SourceValue::from(json!([object.clone()])), &inputs)
            .unwrap();
        let wrapped_text = converter
            .process_arguments(&SourceValue::from(json!([object.to_string()])), &inputs)
            .unwrap();

        assert_eq!(direct.len(), 1);
        assert_eq!(direct, wrapped);
        assert_eq!(direct, wrapped_text);
    }

    #[test]
    fn converted_tokens_render_as_json() {
        let tokens = [
            int(-4),
            uint(12),
            Token::Address(Address::from_low_u64_be(1)),
            Token::Bytes(vec![0xab]),
            Token::Array(vec![Token::Bool(true)]),
        ];
        let rendered: Vec<Value> = tokens.iter().map(token_to_json).collect();
        assert_eq!(
            rendered,
            vec![
                json!("-4"),
                json!("12"),
                json!("0x0000000000000000000000000000000000000001"),
                json!("0xab"),
                json!([true]),
            ]
        );
    }
}
