use serde::{Deserialize, Serialize};

use crate::Vec3;

/// Stable identifier of an anchor, as configured by the host.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorId(String);

impl AnchorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AnchorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AnchorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A point of interest carrying a generative-music prompt.
///
/// Anchors are created when configuration loads. The only runtime mutation
/// is a position refresh for anchors attached to moving scene objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub id: AnchorId,
    pub name: String,
    pub position: Vec3,
    pub prompt: String,
    /// Overrides the engine-wide proximity radius for this anchor.
    #[serde(default)]
    pub radius: Option<f32>,
}

impl Anchor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        position: Vec3,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: AnchorId::new(id),
            name: name.into(),
            position,
            prompt: prompt.into(),
            radius: None,
        }
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = Some(radius);
        self
    }
}
