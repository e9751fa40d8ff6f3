use serde::{Deserialize, Serialize};

/// A text prompt and its blend weight in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedPrompt {
    pub text: String,
    pub weight: f32,
}

impl WeightedPrompt {
    pub fn new(text: impl Into<String>, weight: f32) -> Self {
        Self {
            text: text.into(),
            weight,
        }
    }
}
