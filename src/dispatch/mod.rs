//! Request dispatch: the per-call path from a decoded predict request to a
//! response or a classified error.

mod dispatcher;
mod error;
mod request;
mod validate;

pub use dispatcher::{DispatcherConfig, RequestDispatcher, RequestPhase};
pub use error::{DispatchError, ErrorKind, StatusCode, ValidationError};
pub use request::{ModelSpec, PredictRequest, PredictResponse, RequestContext, ResolvedModelSpec};
pub use validate::{select_outputs, validate_inputs};
