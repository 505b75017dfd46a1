//! `filter_ingest` module surface exposed to the foreign filter runtime
//!
//! One method, `filter_ingest_callback(callback, context, readings)`. The
//! only failure that crosses back to the foreign caller is a malformed
//! argument tuple, raised under the `ingest.error` category.

use std::fmt;

use once_cell::sync::Lazy;
use thiserror::Error;
use tracing::{debug, error};

use crate::bridge::IngestBridge;
use crate::error::IngestError;
use crate::foreign::ForeignObject;

/// Error category registered with the foreign runtime
#[derive(Debug, PartialEq, Eq)]
pub struct ErrorCategory {
    name: &'static str,
}

impl ErrorCategory {
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// `ingest.error`, registered on first use
static INGEST_ERROR: Lazy<ErrorCategory> = Lazy::new(|| {
    debug!("registering ingest.error category");
    ErrorCategory {
        name: "ingest.error",
    }
});

/// Error raised to the foreign caller
#[derive(Debug, Error)]
#[error("{category}: {source}")]
pub struct ForeignError {
    pub category: &'static ErrorCategory,
    #[source]
    pub source: IngestError,
}

/// The `filter_ingest` module
#[derive(Debug, Clone)]
pub struct FilterIngestModule {
    bridge: IngestBridge,
}

impl FilterIngestModule {
    pub const NAME: &'static str = "filter_ingest";
    pub const METHOD: &'static str = "filter_ingest_callback";
    const ARITY: usize = 3;

    pub fn new(bridge: IngestBridge) -> Self {
        Self { bridge }
    }

    /// Category under which argument errors are raised
    pub fn error_category() -> &'static ErrorCategory {
        &INGEST_ERROR
    }

    /// Methods exported by the module
    pub fn methods() -> &'static [&'static str] {
        &[Self::METHOD]
    }

    pub fn bridge(&self) -> &IngestBridge {
        &self.bridge
    }

    /// `filter_ingest_callback(callback, context, readings)`
    ///
    /// Always returns the foreign "nothing" value once the arguments parse;
    /// contract violations are logged by the bridge, not raised.
    ///
    /// # Errors
    /// [`IngestError::Arity`] under `ingest.error` unless exactly three
    /// arguments are given.
    pub fn filter_ingest_callback(
        &self,
        args: &[ForeignObject],
    ) -> Result<ForeignObject, ForeignError> {
        let [callback, context, readings] = args else {
            error!(
                method = Self::METHOD,
                given = args.len(),
                "cannot parse input arguments"
            );
            return Err(ForeignError {
                category: Self::error_category(),
                source: IngestError::Arity {
                    method: Self::METHOD,
                    expected: Self::ARITY,
                    found: args.len(),
                },
            });
        };

        self.bridge
            .ingest(Some(callback), Some(context), Some(readings));
        Ok(ForeignObject::None)
    }
}
