//! Fuzz target for predict request decoding and signature validation.
//!
//! Arbitrary bytes parsed as a JSON request must never panic, whether
//! decoding fails, validation rejects the tensors, or both succeed.

#![no_main]

use libfuzzer_sys::fuzz_target;
use predict_core::dispatch::{select_outputs, validate_inputs, PredictRequest};
use predict_core::models::{Dim, Signature, TensorSpec};
use predict_core::tensor::DataType;

fuzz_target!(|data: &[u8]| {
    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(request) = PredictRequest::from_json(json) else {
        return;
    };

    let signature = Signature::new()
        .with_input("image", TensorSpec::new(DataType::Float32, vec![Dim::Variable, Dim::Fixed(28), Dim::Fixed(28)]))
        .with_input("mask", TensorSpec::fixed(DataType::Bool, &[28]).optional())
        .with_output("output", TensorSpec::fixed(DataType::Float32, &[1, 10]));

    let _ = validate_inputs(&signature, &request.inputs);
    let _ = select_outputs(&signature, &request.output_filter);
});
