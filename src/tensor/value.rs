//! Typed tensor values.

use std::collections::HashMap;

use half::f16;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::DataType;

/// Named tensors, as carried by requests, responses and backend calls.
pub type TensorMap = HashMap<String, Tensor>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    #[error("shape {shape:?} holds {expected} elements but {actual} were supplied")]
    ElementCount {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
}

/// Flat, row-major element storage. The variant fixes the element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "values", rename_all = "lowercase")]
pub enum TensorData {
    Float16(Vec<f16>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Int8(Vec<i8>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Uint8(Vec<u8>),
    Bool(Vec<bool>),
    String(Vec<String>),
}

impl TensorData {
    pub fn dtype(&self) -> DataType {
        match self {
            Self::Float16(_) => DataType::Float16,
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
            Self::Int8(_) => DataType::Int8,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Uint8(_) => DataType::Uint8,
            Self::Bool(_) => DataType::Bool,
            Self::String(_) => DataType::String,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Float16(v) => v.len(),
            Self::Float32(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::Int8(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Uint8(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A shaped tensor. An empty shape denotes a scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    shape: Vec<usize>,
    data: TensorData,
}

impl Tensor {
    /// Build a tensor, rejecting data whose length disagrees with the shape.
    pub fn new(shape: Vec<usize>, data: TensorData) -> Result<Self, TensorError> {
        let tensor = Self { shape, data };
        tensor.check_element_count()?;
        Ok(tensor)
    }

    pub fn scalar_f32(value: f32) -> Self {
        Self {
            shape: Vec::new(),
            data: TensorData::Float32(vec![value]),
        }
    }

    /// A tensor of the given shape and type filled with zero-like values.
    pub fn zeros(dtype: DataType, shape: Vec<usize>) -> Self {
        let n = element_count(&shape);
        let data = match dtype {
            DataType::Float16 => TensorData::Float16(vec![f16::ZERO; n]),
            DataType::Float32 => TensorData::Float32(vec![0.0; n]),
            DataType::Float64 => TensorData::Float64(vec![0.0; n]),
            DataType::Int8 => TensorData::Int8(vec![0; n]),
            DataType::Int32 => TensorData::Int32(vec![0; n]),
            DataType::Int64 => TensorData::Int64(vec![0; n]),
            DataType::Uint8 => TensorData::Uint8(vec![0; n]),
            DataType::Bool => TensorData::Bool(vec![false; n]),
            DataType::String => TensorData::String(vec![String::new(); n]),
        };
        Self { shape, data }
    }

    pub fn dtype(&self) -> DataType {
        self.data.dtype()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Number of elements implied by the shape.
    pub fn element_count(&self) -> usize {
        element_count(&self.shape)
    }

    /// Deserialized tensors bypass `new`, so callers re-check before use.
    pub fn check_element_count(&self) -> Result<(), TensorError> {
        let expected = self.element_count();
        let actual = self.data.len();
        if expected != actual {
            return Err(TensorError::ElementCount {
                shape: self.shape.clone(),
                expected,
                actual,
            });
        }
        Ok(())
    }
}

// Saturates so a hostile shape reports a mismatch instead of overflowing.
fn element_count(shape: &[usize]) -> usize {
    shape.iter().fold(1usize, |acc, &d| acc.saturating_mul(d))
}
