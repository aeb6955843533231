//! Input/output signatures declared by model instances.
//!
//! A signature is immutable once its instance is published. Instances may
//! expose several named signatures; requests that do not name one get
//! [`DEFAULT_SIGNATURE`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tensor::DataType;

/// Signature key used when a request does not name one.
pub const DEFAULT_SIGNATURE: &str = "serving_default";

#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("invalid signature JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("signature map declares no signatures")]
    Empty,

    #[error("signature '{0}' declares no inputs")]
    NoInputs(String),

    #[error("signature '{0}' declares no outputs")]
    NoOutputs(String),
}

/// One dimension of a declared shape.
///
/// Serialized as an integer; `-1` (any negative value) marks a variable dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Dim {
    Fixed(usize),
    Variable,
}

impl Dim {
    pub fn accepts(&self, actual: usize) -> bool {
        match self {
            Self::Fixed(n) => *n == actual,
            Self::Variable => true,
        }
    }
}

impl From<i64> for Dim {
    fn from(raw: i64) -> Self {
        if raw < 0 {
            Self::Variable
        } else {
            Self::Fixed(raw as usize)
        }
    }
}

impl From<Dim> for i64 {
    fn from(dim: Dim) -> Self {
        match dim {
            Dim::Fixed(n) => n as i64,
            Dim::Variable => -1,
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "{n}"),
            Self::Variable => f.write_str("?"),
        }
    }
}

/// Declared element type and shape of one named tensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub dtype: DataType,
    pub shape: Vec<Dim>,
    /// Optional inputs may be omitted by a request. Ignored for outputs.
    #[serde(default)]
    pub optional: bool,
}

impl TensorSpec {
    pub fn new(dtype: DataType, shape: Vec<Dim>) -> Self {
        Self {
            dtype,
            shape,
            optional: false,
        }
    }

    /// Shorthand for a fully fixed shape.
    pub fn fixed(dtype: DataType, shape: &[usize]) -> Self {
        Self::new(dtype, shape.iter().map(|&n| Dim::Fixed(n)).collect())
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Rank must match exactly; each fixed dimension must match.
    pub fn shape_accepts(&self, shape: &[usize]) -> bool {
        self.shape.len() == shape.len()
            && self.shape.iter().zip(shape).all(|(dim, &n)| dim.accepts(n))
    }

    pub fn shape_display(&self) -> String {
        let dims: Vec<String> = self.shape.iter().map(|d| d.to_string()).collect();
        format!("[{}]", dims.join(","))
    }
}

/// Input and output specs for one signature, ordered by tensor name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub inputs: BTreeMap<String, TensorSpec>,
    pub outputs: BTreeMap<String, TensorSpec>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, name: impl Into<String>, spec: TensorSpec) -> Self {
        self.inputs.insert(name.into(), spec);
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, spec: TensorSpec) -> Self {
        self.outputs.insert(name.into(), spec);
        self
    }

    pub fn input(&self, name: &str) -> Option<&TensorSpec> {
        self.inputs.get(name)
    }

    pub fn output(&self, name: &str) -> Option<&TensorSpec> {
        self.outputs.get(name)
    }
}

/// All signatures exposed by one model instance, keyed by signature name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignatureMap {
    signatures: BTreeMap<String, Signature>,
}

impl SignatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A map holding a single signature under [`DEFAULT_SIGNATURE`].
    pub fn single(signature: Signature) -> Self {
        Self::new().with(DEFAULT_SIGNATURE, signature)
    }

    pub fn with(mut self, name: impl Into<String>, signature: Signature) -> Self {
        self.signatures.insert(name.into(), signature);
        self
    }

    /// Parse and check a JSON declaration (`{"serving_default": {"inputs": ..., "outputs": ...}}`).
    pub fn from_json(json: &str) -> Result<Self, SignatureError> {
        let map: Self = serde_json::from_str(json)?;
        map.validate()?;
        Ok(map)
    }

    pub fn validate(&self) -> Result<(), SignatureError> {
        if self.signatures.is_empty() {
            return Err(SignatureError::Empty);
        }
        for (name, sig) in &self.signatures {
            if sig.inputs.is_empty() {
                return Err(SignatureError::NoInputs(name.clone()));
            }
            if sig.outputs.is_empty() {
                return Err(SignatureError::NoOutputs(name.clone()));
            }
        }
        Ok(())
    }

    /// Look up a signature; `None` selects the default one.
    pub fn get(&self, name: Option<&str>) -> Option<&Signature> {
        self.signatures.get(name.unwrap_or(DEFAULT_SIGNATURE))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.signatures.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}
