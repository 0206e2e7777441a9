use serde_json::Value;

use super::TranslationError;

/// Extract the translated strings from a model reply.
///
/// Accepts `{"data": [...]}` or a bare array, optionally wrapped in a fenced
/// code block or surrounded by prose.
pub fn parse_translations(reply: &str) -> Result<Vec<String>, TranslationError> {
    let body = strip_code_fence(reply.trim());

    let value = match serde_json::from_str::<Value>(body) {
        Ok(value) => value,
        Err(err) => {
            let embedded = embedded_json(body).ok_or_else(|| TranslationError::malformed(&err))?;
            serde_json::from_str::<Value>(embedded).map_err(TranslationError::malformed)?
        }
    };

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("data") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(TranslationError::malformed(
                    "expected a `data` array in the reply object",
                ));
            }
        },
        other => {
            return Err(TranslationError::malformed(format!(
                "expected an array or object, got `{other}`"
            )));
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::String(text) => Ok(text),
            other => Err(TranslationError::malformed(format!(
                "entry {index} is not a string: `{other}`"
            ))),
        })
        .collect()
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening line.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

fn embedded_json(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let closer = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(closer)?;
    (end > start).then(|| &text[start..=end])
}
