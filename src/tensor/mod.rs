//! Tensor values exchanged between callers, the dispatcher and model backends.
//!
//! Tensors arrive already decoded from the wire. The dispatcher never
//! converts between element types: a tensor's `DataType` is fixed by its data.

mod dtype;
mod value;

pub use dtype::DataType;
pub use value::{Tensor, TensorData, TensorError, TensorMap};
