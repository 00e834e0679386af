//! Contract method model parsed from ABI JSON

use ethers::abi::{self, Token};
use ethers::utils::id;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AbiError {
    #[error("contract ABI not provided in job data")]
    Missing,

    #[error("error parsing ABI: {0}")]
    Parse(String),

    #[error("method {0} not found in contract ABI")]
    MethodNotFound(String),

    #[error("unsupported ABI type: {0}")]
    UnsupportedType(String),
}

/// Closed set of parameter types the converter targets
#[derive(Debug, Clone, PartialEq)]
pub enum AbiKind {
    Uint(usize),
    Int(usize),
    String,
    Bool,
    Address,
    Bytes,
    FixedBytes(usize),
    Array(Box<AbiKind>),
    FixedArray(Box<AbiKind>, usize),
    Tuple(Vec<AbiParam>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AbiParam {
    pub name: String,
    pub kind: AbiKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodAbi {
    pub name: String,
    pub inputs: Vec<AbiParam>,
}

#[derive(Deserialize)]
struct RawEntry {
    #[serde(rename = "type", default = "default_entry_type")]
    entry_type: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    inputs: Vec<RawParam>,
}

#[derive(Deserialize)]
struct RawParam {
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    param_type: String,
    #[serde(default)]
    components: Vec<RawParam>,
}

fn default_entry_type() -> String {
    "function".to_string()
}

impl AbiKind {
    /// Canonical type string used in method signatures
    pub fn canonical(&self) -> String {
        match self {
            Self::Uint(bits) => format!("uint{}", bits),
            Self::Int(bits) => format!("int{}", bits),
            Self::String => "string".to_string(),
            Self::Bool => "bool".to_string(),
            Self::Address => "address".to_string(),
            Self::Bytes => "bytes".to_string(),
            Self::FixedBytes(size) => format!("bytes{}", size),
            Self::Array(inner) => format!("{}[]", inner.canonical()),
            Self::FixedArray(inner, len) => format!("{}[{}]", inner.canonical(), len),
            Self::Tuple(params) => {
                let inner: Vec<String> = params.iter().map(|p| p.kind.canonical()).collect();
                format!("({})", inner.join(","))
            }
        }
    }

    /// Parse a solidity type string, with tuple components supplied separately
    fn parse(type_name: &str, components: &[RawParam]) -> Result<Self, AbiError> {
        let type_name = type_name.trim();

        if let Some(stripped) = type_name.strip_suffix(']') {
            let open = stripped
                .rfind('[')
                .ok_or_else(|| AbiError::UnsupportedType(type_name.to_string()))?;
            let inner = Self::parse(&stripped[..open], components)?;
            let len = &stripped[open + 1..];
            if len.is_empty() {
                return Ok(Self::Array(Box::new(inner)));
            }
            let len = len
                .parse::<usize>()
                .map_err(|_| AbiError::UnsupportedType(type_name.to_string()))?;
            return Ok(Self::FixedArray(Box::new(inner), len));
        }

        match type_name {
            "address" => return Ok(Self::Address),
            "bool" => return Ok(Self::Bool),
            "string" => return Ok(Self::String),
            "bytes" => return Ok(Self::Bytes),
            "uint" => return Ok(Self::Uint(256)),
            "int" => return Ok(Self::Int(256)),
            "tuple" => {
                let params = components
                    .iter()
                    .map(AbiParam::from_raw)
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(Self::Tuple(params));
            }
            _ => {}
        }

        let unsupported = || AbiError::UnsupportedType(type_name.to_string());

        if let Some(bits) = type_name.strip_prefix("uint") {
            let bits = bits.parse::<usize>().map_err(|_| unsupported())?;
            if bits == 0 || bits > 256 || bits % 8 != 0 {
                return Err(unsupported());
            }
            return Ok(Self::Uint(bits));
        }
        if let Some(bits) = type_name.strip_prefix("int") {
            let bits = bits.parse::<usize>().map_err(|_| unsupported())?;
            if bits == 0 || bits > 256 || bits % 8 != 0 {
                return Err(unsupported());
            }
            return Ok(Self::Int(bits));
        }
        if let Some(size) = type_name.strip_prefix("bytes") {
            let size = size.parse::<usize>().map_err(|_| unsupported())?;
            if size == 0 || size > 32 {
                return Err(unsupported());
            }
            return Ok(Self::FixedBytes(size));
        }

        Err(unsupported())
    }
}

impl AbiParam {
    pub fn new(name: impl Into<String>, kind: AbiKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    fn from_raw(raw: &RawParam) -> Result<Self, AbiError> {
        Ok(Self {
            name: raw.name.clone(),
            kind: AbiKind::parse(&raw.param_type, &raw.components)?,
        })
    }
}

impl MethodAbi {
    pub fn signature(&self) -> String {
        let inputs: Vec<String> = self.inputs.iter().map(|p| p.kind.canonical()).collect();
        format!("{}({})", self.name, inputs.join(","))
    }

    pub fn selector(&self) -> [u8; 4] {
        id(self.signature())
    }

    /// Selector followed by the ABI-encoded arguments
    pub fn encode_call(&self, tokens: &[Token]) -> Vec<u8> {
        let mut data = self.selector().to_vec();
        data.extend(abi::encode(tokens));
        data
    }
}

/// Find a function by name, or by full signature when `name` contains a parameter list
pub fn find_method(abi_json: &str, name: &str) -> Result<MethodAbi, AbiError> {
    if abi_json.trim().is_empty() {
        return Err(AbiError::Missing);
    }

    let entries: Vec<RawEntry> =
        serde_json::from_str(abi_json).map_err(|e| AbiError::Parse(e.to_string()))?;

    for entry in entries.iter().filter(|e| e.entry_type == "function") {
        let by_name = entry.name == name;
        if !by_name && !name.contains('(') {
            continue;
        }

        let inputs = entry
            .inputs
            .iter()
            .map(AbiParam::from_raw)
            .collect::<Result<Vec<_>, _>>()?;
        let method = MethodAbi {
            name: entry.name.clone(),
            inputs,
        };

        if by_name || method.signature() == name {
            return Ok(method);
        }
    }

    Err(AbiError::MethodNotFound(name.to_string()))
}

/// `executeFunction(uint256 jobId, uint256 tgAmount, address target, bytes data)` on the execution contract
pub fn execute_function() -> MethodAbi {
    MethodAbi {
        name: "executeFunction".to_string(),
        inputs: vec![
            AbiParam::new("jobId", AbiKind::Uint(256)),
            AbiParam::new("tgAmount", AbiKind::Uint(256)),
            AbiParam::new("target", AbiKind::Address),
            AbiParam::new("data", AbiKind::Bytes),
        ],
    }
}
