//! Fault isolation around stage functions.
//!
//! Design principles:
//! - A record that already carries an error is forwarded with provenance and
//!   the stage body is never invoked for it
//! - A stage body that returns an error or panics yields an error record for
//!   its own key; the surrounding job keeps running
//! - Key fields are read through [`GuardedInput`], never by position

use landchange_engine::panic_message;
use landchange_protocol::{AlgorithmTag, PixelCoordinate, RecordKey, StageError, StageRecord};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

/// Name and version of a stage; together they form the output [`AlgorithmTag`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Stage {
    pub name: String,
    pub version: String,
}

impl Stage {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn tag(&self) -> AlgorithmTag {
        AlgorithmTag::new(&self.name, &self.version)
    }
}

/// Named access to the fields a guard needs from a stage's input.
pub trait GuardedInput {
    /// Pixel the output record belongs to.
    fn coordinate(&self) -> PixelCoordinate;

    /// Date written into the output key.
    fn output_date(&self) -> String;

    /// Error recorded by an earlier stage, if any.
    fn prior_error(&self) -> Option<&StageError>;
}

impl<T> GuardedInput for StageRecord<T> {
    fn coordinate(&self) -> PixelCoordinate {
        self.key().coordinate()
    }

    fn output_date(&self) -> String {
        self.key().date.clone()
    }

    fn prior_error(&self) -> Option<&StageError> {
        self.error()
    }
}

/// Forward upstream errors without invoking `inner`.
///
/// `origin` names the collection the input came from and appears in the
/// forwarded error as `previous-error[<origin>]:<cause>`.
pub fn short_circuit_on_upstream_error<I, O, F>(
    stage: Stage,
    origin: impl Into<String>,
    inner: F,
) -> impl Fn(I) -> StageRecord<O> + Send + Sync + 'static
where
    I: GuardedInput + 'static,
    O: 'static,
    F: Fn(I) -> StageRecord<O> + Send + Sync + 'static,
{
    let tag = stage.tag();
    let origin = origin.into();
    move |input: I| {
        if let Some(prior) = input.prior_error() {
            let key = RecordKey::new(input.coordinate(), tag.clone(), input.output_date());
            debug!(
                x = key.x,
                y = key.y,
                stage = %tag,
                "Skipping stage after error in {}",
                origin
            );
            return StageRecord::failed(key, StageError::upstream(origin.as_str(), prior));
        }
        inner(input)
    }
}

/// Run `inner` and turn any error or panic into an error record.
///
/// The output key is built from the input before `inner` consumes it.
pub fn capture_fault<I, O, F>(
    stage: Stage,
    inner: F,
) -> impl Fn(I) -> StageRecord<O> + Send + Sync + 'static
where
    I: GuardedInput + 'static,
    O: 'static,
    F: Fn(I) -> anyhow::Result<O> + Send + Sync + 'static,
{
    let tag = stage.tag();
    move |input: I| {
        let key = RecordKey::new(input.coordinate(), tag.clone(), input.output_date());
        let message = match catch_unwind(AssertUnwindSafe(|| inner(input))) {
            Ok(Ok(result)) => return StageRecord::ok(key, result),
            Ok(Err(err)) => format!("{:#}", err),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };
        warn!(x = key.x, y = key.y, stage = %tag, "Stage failed: {}", message);
        StageRecord::failed(key, StageError::execution(&tag, message))
    }
}

/// Upstream short-circuit outside, fault capture inside.
pub fn guarded<I, O, F>(
    stage: Stage,
    origin: impl Into<String>,
    inner: F,
) -> impl Fn(I) -> StageRecord<O> + Send + Sync + 'static
where
    I: GuardedInput + 'static,
    O: 'static,
    F: Fn(I) -> anyhow::Result<O> + Send + Sync + 'static,
{
    short_circuit_on_upstream_error(stage.clone(), origin, capture_fault(stage, inner))
}
