//! Signature checks for request inputs and backend outputs.
//!
//! Inputs are rejected, never coerced: a float tensor supplied where an
//! integer one is declared is a validation failure.

use std::collections::BTreeSet;

use super::error::ValidationError;
use crate::models::{ExecutionError, Signature, TensorSpec};
use crate::tensor::{Tensor, TensorMap};

/// Check request inputs against a signature.
///
/// Declared inputs are checked in name order before extras are reported,
/// so the same request always yields the same error.
pub fn validate_inputs(signature: &Signature, inputs: &TensorMap) -> Result<(), ValidationError> {
    for (name, spec) in &signature.inputs {
        match inputs.get(name) {
            Some(tensor) => check_input(name, spec, tensor)?,
            None if spec.optional => {}
            None => return Err(ValidationError::MissingInput(name.clone())),
        }
    }

    let extra = inputs
        .keys()
        .filter(|name| !signature.inputs.contains_key(*name))
        .min();
    if let Some(name) = extra {
        return Err(ValidationError::UnexpectedInput(name.clone()));
    }
    Ok(())
}

fn check_input(name: &str, spec: &TensorSpec, tensor: &Tensor) -> Result<(), ValidationError> {
    tensor
        .check_element_count()
        .map_err(|source| ValidationError::Malformed {
            name: name.to_string(),
            source,
        })?;

    if tensor.dtype() != spec.dtype {
        return Err(ValidationError::TypeMismatch {
            name: name.to_string(),
            expected: spec.dtype,
            actual: tensor.dtype(),
        });
    }
    if tensor.rank() != spec.rank() {
        return Err(ValidationError::RankMismatch {
            name: name.to_string(),
            expected: spec.rank(),
            actual: tensor.rank(),
        });
    }
    if !spec.shape_accepts(tensor.shape()) {
        return Err(ValidationError::ShapeMismatch {
            name: name.to_string(),
            expected: spec.shape_display(),
            actual: tensor.shape().to_vec(),
        });
    }
    Ok(())
}

/// Resolve an output filter to the output names a caller will receive.
///
/// An empty filter selects every declared output. Duplicates collapse.
pub fn select_outputs(signature: &Signature, filter: &[String]) -> Result<Vec<String>, ValidationError> {
    if filter.is_empty() {
        return Ok(signature.outputs.keys().cloned().collect());
    }

    let mut selected = BTreeSet::new();
    for name in filter {
        if !signature.outputs.contains_key(name) {
            return Err(ValidationError::UnknownOutput(name.clone()));
        }
        selected.insert(name.clone());
    }
    Ok(selected.into_iter().collect())
}

/// Keep the requested outputs and check them against their declared specs.
///
/// A backend that omits or mistypes an output failed on valid input, so this
/// reports an execution error rather than a validation error.
pub(crate) fn check_outputs(
    signature: &Signature,
    requested: &[String],
    mut produced: TensorMap,
) -> Result<TensorMap, ExecutionError> {
    let mut outputs = TensorMap::with_capacity(requested.len());
    for name in requested {
        let tensor = produced
            .remove(name)
            .ok_or_else(|| ExecutionError::Backend(format!("output '{name}' was not produced")))?;

        if let Some(spec) = signature.output(name) {
            if tensor.check_element_count().is_err()
                || tensor.dtype() != spec.dtype
                || !spec.shape_accepts(tensor.shape())
            {
                return Err(ExecutionError::Backend(format!(
                    "output '{name}' is {}{:?}, declared {}{}",
                    tensor.dtype(),
                    tensor.shape(),
                    spec.dtype,
                    spec.shape_display()
                )));
            }
        }
        outputs.insert(name.clone(), tensor);
    }
    Ok(outputs)
}
