use super::completion::CompletionService;
use super::prompts::build_drink_traits_prompt;
use crate::domain::drink::DrinkTraits;
use crate::domain::error::{AppError, Result};
use crate::infrastructure::response::strip_code_fence;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Pulls structured drink traits out of a free-text drink description.
pub struct DrinkTraitExtractor {
    completion: Arc<CompletionService>,
}

impl DrinkTraitExtractor {
    pub fn new(completion: Arc<CompletionService>) -> Self {
        Self { completion }
    }

    pub async fn extract(&self, description: &str) -> Result<DrinkTraits> {
        let reply = self
            .completion
            .complete(&build_drink_traits_prompt(description))
            .await?;
        let traits = parse_traits(&strip_code_fence(&reply))?;
        debug!(?traits, "Extracted drink traits");
        Ok(traits)
    }
}

fn parse_traits(text: &str) -> Result<DrinkTraits> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(map) = value else {
        return Err(AppError::ParseError(
            "Drink traits must be a JSON object".to_string(),
        ));
    };

    let field = |key: &str| -> Option<String> {
        match map.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Array(items) => {
                let parts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
                (!parts.is_empty()).then(|| parts.join(", "))
            }
            _ => None,
        }
    };

    Ok(DrinkTraits {
        drink_type: field("drink_type"),
        drink_color: field("drink_color"),
        container_type: field("container_type"),
        ingredients: field("ingredients"),
        topping: field("topping"),
        suitable_for: field("suitable_for"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::completion::test_support::scripted;

    #[tokio::test]
    async fn test_extracts_fenced_json() {
        let (_, completion) = scripted(vec![Ok(
            "```json\n{\"drink_type\": \"Trà trái cây\", \"drink_color\": \"cam\", \"container_type\": \"ly nhựa\", \"ingredients\": [\"trà\", \"đào\", \"sả\"], \"topping\": null, \"suitable_for\": \"ngày nóng\"}\n```",
        )]);
        let extractor = DrinkTraitExtractor::new(completion);

        let traits = extractor.extract("ly trà màu cam có miếng đào").await.unwrap();
        assert_eq!(traits.drink_color.as_deref(), Some("cam"));
        assert_eq!(traits.ingredients.as_deref(), Some("trà, đào, sả"));
        assert_eq!(traits.topping, None);
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(matches!(
            parse_traits("[\"cam\"]"),
            Err(AppError::ParseError(_))
        ));
        assert!(parse_traits("not json").is_err());
    }
}
