use gatekeeper_models::opinion::OpinionReply;

use crate::error::OpinionError;

/// Pull the first JSON object out of free-form model output.
///
/// Accepts bare JSON, fenced blocks (```json ... ``` or ``` ... ```), and
/// JSON preceded or followed by prose.
pub fn extract_json(text: &str) -> Result<String, OpinionError> {
    let trimmed = text.trim();

    let candidates = [
        Some(trimmed.to_string()).filter(|t| t.starts_with('{')),
        fenced_block(trimmed),
        first_balanced_object(trimmed),
    ];
    for candidate in candidates.into_iter().flatten() {
        if serde_json::from_str::<serde_json::Value>(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    Err(OpinionError::Parse(format!(
        "no JSON object in validator output (length={})",
        text.len()
    )))
}

fn fenced_block(text: &str) -> Option<String> {
    let openers = ["```json\n", "```json\r\n", "```\n", "```\r\n"];
    openers.iter().find_map(|opener| {
        let start = text.find(opener)? + opener.len();
        let end = text[start..].find("```")?;
        Some(text[start..start + end].trim().to_string())
    })
}

fn first_balanced_object(text: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| text[s..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse and range-check an opinion from raw validator output.
pub fn parse_opinion_reply(raw: &str) -> Result<OpinionReply, OpinionError> {
    let json = extract_json(raw)?;
    let reply: OpinionReply = serde_json::from_str(&json)
        .map_err(|e| OpinionError::Parse(format!("not an opinion: {e}; json: {json}")))?;
    validate_reply(&reply)?;
    Ok(reply)
}

/// Reject replies outside confidence 0-100 / risk 0-10 instead of guessing.
pub fn validate_reply(reply: &OpinionReply) -> Result<(), OpinionError> {
    if !(0.0..=100.0).contains(&reply.confidence) {
        return Err(OpinionError::Parse(format!(
            "confidence {} outside 0-100",
            reply.confidence
        )));
    }
    if !(0.0..=10.0).contains(&reply.risk_score) {
        return Err(OpinionError::Parse(format!(
            "risk_score {} outside 0-10",
            reply.risk_score
        )));
    }
    Ok(())
}
