//! Result framing used by the inference worker.
//!
//! The worker may print arbitrary progress text; the machine-readable result
//! is the JSON between the first begin marker and the following end marker.

use crate::error::{AppError, Result};
use serde_json::Value;

pub const BEGIN_RESULT: &str = "===BEGIN_RESULT===";
pub const END_RESULT: &str = "===END_RESULT===";

/// Text between the markers, trimmed, or `None` if the pair is absent
pub fn result_block(output: &str) -> Option<&str> {
    let start = output.find(BEGIN_RESULT)? + BEGIN_RESULT.len();
    let length = output[start..].find(END_RESULT)?;
    Some(output[start..start + length].trim())
}

/// Parse the framed result out of a worker's stdout.
///
/// Both failure variants carry the complete output for diagnosis.
pub fn extract_result(output: &str) -> Result<Value> {
    let block = result_block(output).ok_or_else(|| AppError::MissingResultMarker {
        raw_output: output.to_string(),
    })?;

    serde_json::from_str(block).map_err(|source| AppError::ResultParse {
        source,
        raw_output: output.to_string(),
    })
}
