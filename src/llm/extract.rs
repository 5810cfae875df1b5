//! JSON recovery from LLM chat replies.
//!
//! Real models interleave prose with the JSON they were asked for, and
//! sometimes drop the code fence entirely. Recovery tries three shapes in
//! a fixed order and the first successful parse wins:
//!
//! 1. the contents of a fenced ```json block;
//! 2. the widest balanced `{…}` or `[…]` span, picking whichever opener
//!    appears first;
//! 3. the whole body.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)```").expect("fenced-json regex"));

/// Extract the first parseable JSON value from a chat reply, or `None`
/// when all three attempts fail.
pub fn extract_json(body: &str) -> Option<Value> {
    fenced(body)
        .or_else(|| bracket_span(body))
        .or_else(|| serde_json::from_str(body.trim()).ok())
}

fn fenced(body: &str) -> Option<Value> {
    let captured = FENCED_JSON.captures(body)?;
    serde_json::from_str(captured.get(1)?.as_str().trim()).ok()
}

fn bracket_span(body: &str) -> Option<Value> {
    let first_obj = body.find('{');
    let first_arr = body.find('[');
    let (open, close) = match (first_obj, first_arr) {
        (Some(o), Some(a)) if o < a => (o, body.rfind('}')?),
        (Some(o), None) => (o, body.rfind('}')?),
        (_, Some(a)) => (a, body.rfind(']')?),
        (None, None) => return None,
    };
    if close <= open {
        return None;
    }
    serde_json::from_str(&body[open..=close]).ok()
}
