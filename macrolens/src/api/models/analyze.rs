use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;

/// Structured nutrition estimate for a single photographed dish.
///
/// Constructed fresh per request from the inference service's response and
/// returned to the caller verbatim; there is no persistence or identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NutritionEstimate {
    /// Human-readable name of the recognized food
    pub name: String,
    /// Estimated energy in kcal
    pub calories: f64,
    /// Estimated protein in grams
    pub protein: f64,
    /// Estimated carbohydrates in grams
    pub carbs: f64,
    /// Estimated fat in grams
    pub fat: f64,
    /// Estimated fiber in grams
    pub fiber: f64,
    /// Estimated sodium in milligrams
    pub sodium: f64,
}

impl NutritionEstimate {
    /// The declared response schema, in the inference API's schema dialect.
    ///
    /// This is the single source of truth for the expected shape: it is sent as
    /// the outbound `responseSchema` constraint, and the same shape is enforced
    /// on the way back by deserializing into [`NutritionEstimate`].
    pub fn response_schema() -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "name": { "type": "STRING" },
                "calories": { "type": "NUMBER" },
                "protein": { "type": "NUMBER" },
                "carbs": { "type": "NUMBER" },
                "fat": { "type": "NUMBER" },
                "fiber": { "type": "NUMBER" },
                "sodium": { "type": "NUMBER" }
            },
            "required": ["name", "calories", "protein", "carbs", "fat", "fiber", "sodium"]
        })
    }
}

/// Uniform JSON error envelope returned for every failure.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Short error message
    pub error: String,
    /// Diagnostic detail from the underlying failure, when available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
