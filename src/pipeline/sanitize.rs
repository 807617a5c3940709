//! Recover a JSON object from a model's free-form answer.
//!
//! Even with "output ONLY the JSON object" in the prompt, models wrap the
//! answer in ```` ```json ```` fences, prepend "Here is the data:", or trail
//! an explanation. This stage strips the fences, slices from the first `{`
//! to the last `}`, and parses what is between.
//!
//! It is purely structural. Whether `valor_pagar` is actually a number is
//! [`super::normalize`]'s concern; here the only question is "is there an
//! object in this text?". Every failure collapses to `None`.

use serde_json::{Map, Value};

/// A JSON object recovered from model output, keys untouched.
pub type RawRecord = Map<String, Value>;

const FENCE_MARKERS: [&str; 2] = ["```json", "```"];

/// Recover the outermost JSON object from `raw`, or `None`.
pub fn sanitize(raw: &str) -> Option<RawRecord> {
    let mut text = raw.to_string();
    for marker in FENCE_MARKERS {
        text = text.replace(marker, "");
    }
    let text = text.trim();

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }

    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}
