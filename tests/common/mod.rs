//! Fake backends and fixtures shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use predict_core::models::{
    Dim, ExecutionError, ExecutionRequest, ModelBackend, ModelInstance, Signature, SignatureMap,
    TensorSpec,
};
use predict_core::tensor::{DataType, Tensor, TensorData, TensorMap};

/// Counters a test keeps after handing the backend to the registry.
#[derive(Debug, Default)]
pub struct Probe {
    pub executions: AtomicUsize,
    pub releases: AtomicUsize,
    pub saw_cancel: AtomicBool,
}

impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn saw_cancel(&self) -> bool {
        self.saw_cancel.load(Ordering::SeqCst)
    }
}

pub enum Behavior {
    /// Ten-class scores for a digits image.
    Digits,
    Fail(ExecutionError),
    Panic,
    /// Returns no tensors at all.
    NoOutputs,
    /// Returns an int tensor where float32 is declared.
    WrongOutputType,
    /// Waits for a permit before answering.
    Gate(Arc<Semaphore>),
    /// Sleeps, bailing out early if the request is cancelled.
    Slow(Duration),
}

pub struct FakeBackend {
    behavior: Behavior,
    probe: Arc<Probe>,
}

impl FakeBackend {
    pub fn new(behavior: Behavior, probe: Arc<Probe>) -> Box<Self> {
        Box::new(Self { behavior, probe })
    }
}

#[async_trait]
impl ModelBackend for FakeBackend {
    async fn execute(&self, request: ExecutionRequest) -> Result<TensorMap, ExecutionError> {
        self.probe.executions.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Digits => Ok(digits_output()),
            Behavior::Fail(err) => Err(err.clone()),
            Behavior::Panic => panic!("backend exploded"),
            Behavior::NoOutputs => Ok(TensorMap::new()),
            Behavior::WrongOutputType => {
                let mut out = TensorMap::new();
                out.insert(
                    "output".to_string(),
                    Tensor::new(vec![1, 1], TensorData::Int64(vec![7])).unwrap(),
                );
                Ok(out)
            }
            Behavior::Gate(gate) => {
                let _permit = gate
                    .acquire()
                    .await
                    .map_err(|_| ExecutionError::Backend("gate closed".into()))?;
                Ok(digits_output())
            }
            Behavior::Slow(delay) => {
                tokio::select! {
                    _ = request.cancel.cancelled() => {
                        self.probe.saw_cancel.store(true, Ordering::SeqCst);
                        Err(ExecutionError::Cancelled)
                    }
                    _ = tokio::time::sleep(*delay) => Ok(digits_output()),
                }
            }
        }
    }

    fn release(&self) {
        self.probe.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// `serving_default`: image float32[1,28,28] → output float32[?,10].
pub fn digits_signatures() -> SignatureMap {
    SignatureMap::single(
        Signature::new()
            .with_input("image", TensorSpec::fixed(DataType::Float32, &[1, 28, 28]))
            .with_output(
                "output",
                TensorSpec::new(DataType::Float32, vec![Dim::Variable, Dim::Fixed(10)]),
            ),
    )
}

pub fn digits_image() -> Tensor {
    Tensor::zeros(DataType::Float32, vec![1, 28, 28])
}

pub fn digits_output() -> TensorMap {
    let mut scores = vec![0.0f32; 10];
    scores[7] = 1.0;
    let mut out = TensorMap::new();
    out.insert(
        "output".to_string(),
        Tensor::new(vec![1, 10], TensorData::Float32(scores)).unwrap(),
    );
    out
}

pub fn instance(name: &str, version: u64, behavior: Behavior, probe: &Arc<Probe>) -> ModelInstance {
    ModelInstance::new(
        name,
        version,
        digits_signatures(),
        FakeBackend::new(behavior, probe.clone()),
    )
}

pub fn digits(version: u64, probe: &Arc<Probe>) -> ModelInstance {
    instance("digits", version, Behavior::Digits, probe)
}
