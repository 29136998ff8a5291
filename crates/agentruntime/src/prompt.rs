//! Prompt assembly and response parsing for tasks without a handler

use agentcore::Payload;
use serde_json::Value;

/// Turn `listingAddress` or `seller_name` into `Listing Address` / `Seller Name`
pub fn humanize_label(key: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for ch in key.chars() {
        if ch == '_' || ch == '-' || ch == ' ' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        current.push(ch);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Flatten an input payload into labelled lines; nulls are skipped and
/// structured values become labelled JSON blocks
pub fn render_input(input: &Payload) -> String {
    let mut sections = Vec::new();
    for (key, value) in input {
        let label = humanize_label(key);
        match value {
            Value::Null => continue,
            Value::Object(_) | Value::Array(_) => {
                let json = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
                sections.push(format!("{label}:\n```json\n{json}\n```"));
            }
            Value::String(s) => sections.push(format!("{label}: {s}")),
            other => sections.push(format!("{label}: {other}")),
        }
    }
    sections.join("\n")
}

pub fn build_prompt(instruction: &str, input: &Payload) -> String {
    let rendered = render_input(input);
    if rendered.is_empty() {
        instruction.to_string()
    } else {
        format!("{instruction}\n\n{rendered}")
    }
}

/// Parse a generated response as JSON, tolerating a fenced code block;
/// anything else becomes `{ "text": <raw> }`
pub fn parse_response(content: &str) -> Value {
    let trimmed = content.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return value;
    }
    if let Some(inner) = strip_fence(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(inner) {
            return value;
        }
    }
    serde_json::json!({ "text": content })
}

fn strip_fence(text: &str) -> Option<&str> {
    let body = text.strip_prefix("```")?.strip_suffix("```")?;
    let body = body.strip_prefix("json").unwrap_or(body);
    Some(body.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn labels_split_camel_and_snake_case() {
        assert_eq!(humanize_label("listingAddress"), "Listing Address");
        assert_eq!(humanize_label("seller_first_name"), "Seller First Name");
        assert_eq!(humanize_label("price"), "Price");
        assert_eq!(humanize_label("sqftTotal2"), "Sqft Total2");
    }

    #[test]
    fn render_skips_nulls_and_blocks_objects() {
        let input = json!({
            "sellerName": "Dana",
            "bedrooms": 3,
            "notes": null,
            "address": {"street": "1 Main St"}
        });
        let rendered = render_input(input.as_object().unwrap());

        assert!(rendered.starts_with("Seller Name: Dana\nBedrooms: 3\nAddress:\n```json"));
        assert!(rendered.contains("\"street\": \"1 Main St\""));
        assert!(!rendered.contains("Notes"));
    }

    #[test]
    fn prompt_is_instruction_then_input() {
        let input = json!({"city": "Austin"});
        assert_eq!(
            build_prompt("Describe the home.", input.as_object().unwrap()),
            "Describe the home.\n\nCity: Austin"
        );
        assert_eq!(build_prompt("Describe.", &Payload::new()), "Describe.");
    }

    #[test]
    fn parse_falls_back_to_text() {
        assert_eq!(parse_response("{\"a\": 1}"), json!({"a": 1}));
        assert_eq!(parse_response("```json\n{\"a\": 2}\n```"), json!({"a": 2}));
        assert_eq!(parse_response("Just words."), json!({"text": "Just words."}));
    }
}
