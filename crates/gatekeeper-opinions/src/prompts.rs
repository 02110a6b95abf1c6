use gatekeeper_models::opinion::TradeContext;

/// Reply format every validator prompt asks for.
fn response_schema() -> String {
    let example = serde_json::json!({
        "approve": true,
        "confidence": 72,
        "risk_score": 3.5,
        "reasoning": "<one or two sentences>"
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

fn common_rules() -> String {
    format!(
        "## OUTPUT\n\n\
         Respond with a single JSON object and nothing else:\n\n{}\n\n\
         - `approve`: whether this trade should be taken from your point of view.\n\
         - `confidence`: 0 to 100, how sure you are of that verdict.\n\
         - `risk_score`: 0 (negligible) to 10 (unacceptable).\n\
         - `reasoning`: short justification.\n\n\
         Values outside those ranges are discarded. If the input is insufficient, reply \
         with approve=false and a low confidence rather than guessing.",
        response_schema()
    )
}

pub fn technical_system_prompt() -> String {
    format!(
        "You are the technical validator of an automated trade gate. You receive a model \
         prediction for one instrument and decide whether it is technically sound to act on.\n\n\
         ## INPUT\n\n\
         - `side`: buy for a positive predicted value, sell for a negative one.\n\
         - `prediction_value`: signed predicted move; larger magnitude means a stronger signal.\n\
         - `volatility`: recent realized volatility as a fraction (0.02 = 2%).\n\
         - `regime`: trending, sideways, high_volatility or normal.\n\n\
         ## RULES\n\n\
         - Trending regime with a prediction aligned to the trend supports approval.\n\
         - Sideways regime: small predicted moves are noise. Lower confidence.\n\
         - A predicted move smaller than the volatility is not distinguishable from noise.\n\
         - Prefer rejection when direction and regime conflict.\n\n{}",
        common_rules()
    )
}

pub fn risk_system_prompt() -> String {
    format!(
        "You are the risk validator of an automated trade gate. You judge whether the \
         downside of acting on a prediction is acceptable.\n\n\
         ## RULES\n\n\
         - volatility above 0.05 is high: raise risk_score to at least 6.\n\
         - high_volatility regime: raise risk_score by 2.\n\
         - volatility below 0.01 is calm: risk_score of 3 or less unless the predicted \
         move is extreme.\n\
         - Reject when risk_score would be 8 or more.\n\n{}",
        common_rules()
    )
}

pub fn sentiment_system_prompt() -> String {
    format!(
        "You are the sentiment validator of an automated trade gate. You judge whether \
         market sentiment for the instrument is consistent with the predicted direction.\n\n\
         ## RULES\n\n\
         - With no information beyond the input, stay near confidence 50 and approve only \
         when the regime supports the side.\n\
         - Contrarian trades against a strong trend deserve low confidence.\n\n{}",
        common_rules()
    )
}

/// System prompt for a validator focus, or `None` if unknown.
pub fn validator_prompt(focus: &str) -> Option<String> {
    match focus {
        "technical" => Some(technical_system_prompt()),
        "risk" => Some(risk_system_prompt()),
        "sentiment" => Some(sentiment_system_prompt()),
        _ => None,
    }
}

/// User prompt carrying the trade under review.
pub fn review_request(ctx: &TradeContext) -> Result<String, serde_json::Error> {
    let body = serde_json::to_string_pretty(ctx)?;
    Ok(format!("Review this trade:\n\n{body}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gatekeeper_models::prediction::TradeSide;
    use gatekeeper_models::threshold::Regime;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn known_focuses_have_prompts() {
        for focus in ["technical", "risk", "sentiment"] {
            let prompt = validator_prompt(focus).unwrap();
            assert!(prompt.contains("risk_score"), "{focus} prompt lacks schema");
        }
        assert!(validator_prompt("astrology").is_none());
    }

    #[test]
    fn review_request_embeds_context() {
        let ctx = TradeContext {
            request_id: Uuid::nil(),
            instrument: "BTC-USD".to_string(),
            side: TradeSide::Sell,
            prediction_value: dec!(-0.031),
            volatility: 0.02,
            regime: Regime::Trending,
            requested_at: Utc::now(),
        };
        let prompt = review_request(&ctx).unwrap();
        assert!(prompt.contains("BTC-USD"));
        assert!(prompt.contains("-0.031"));
    }
}
