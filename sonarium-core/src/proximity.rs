//! Distance-to-weight conversion for the prompt blend.
//!
//! Raw weights come from a falloff curve over the distance to each anchor.
//! For a continuously streaming session the raw weights are smoothed per
//! anchor on every tick, and a network push is only warranted once the
//! smoothed vector has drifted far enough from what was last sent.

use std::collections::{HashMap, HashSet};

use sonarium_types::{Anchor, AnchorId, Vec3, WeightedPrompt};

/// Distance falloff curve. `R` is the proximity radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Falloff {
    /// `max(0, 1 - d/R)`
    Linear,
    /// `e^(-d/(R/3))`
    #[default]
    Exponential,
    /// `1 / (1 + (d/(R/10))^2)`
    InverseSquare,
}

impl Falloff {
    pub fn weight(self, distance: f32, radius: f32) -> f32 {
        if radius <= 0.0 || !distance.is_finite() {
            return 0.0;
        }
        let d = distance.max(0.0);
        let w = match self {
            Falloff::Linear => 1.0 - d / radius,
            Falloff::Exponential => (-d / (radius / 3.0)).exp(),
            Falloff::InverseSquare => {
                let x = d / (radius / 10.0);
                1.0 / (1.0 + x * x)
            }
        };
        w.clamp(0.0, 1.0)
    }

    pub fn name(self) -> &'static str {
        match self {
            Falloff::Linear => "linear",
            Falloff::Exponential => "exponential",
            Falloff::InverseSquare => "inverse_square",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "linear" => Some(Falloff::Linear),
            "exponential" | "exp" => Some(Falloff::Exponential),
            "inverse_square" | "inverse-square" | "inversesquare" => Some(Falloff::InverseSquare),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityConfig {
    pub falloff: Falloff,
    pub radius: f32,
    pub min_weight: f32,
    pub max_prompts: usize,
    pub smoothing_factor: f32,
    pub change_threshold: f32,
    /// Weight each fallback anchor gets when nothing is in range.
    pub fallback_weight: f32,
    /// How many anchors (in configuration order) make up the fallback blend.
    pub fallback_count: usize,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            falloff: Falloff::Exponential,
            radius: 50.0,
            min_weight: 0.1,
            max_prompts: 10,
            smoothing_factor: 0.3,
            change_threshold: 0.04,
            fallback_weight: 0.25,
            fallback_count: 4,
        }
    }
}

/// One row of the diagnostic overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugEntry {
    pub id: AnchorId,
    pub weight: f32,
    pub distance: f32,
}

#[derive(Debug, Clone, Default)]
pub struct ProximityResult {
    pub weighted_prompts: Vec<WeightedPrompt>,
    pub nearest_anchor: Option<AnchorId>,
    /// Infinite when there are no anchors.
    pub distance_to_nearest: f32,
    /// Anchors contributing by proximity. Empty when the fallback blend is used.
    pub active_anchor_ids: HashSet<AnchorId>,
    /// Every anchor with its (smoothed, when applicable) weight and distance.
    pub debug: Vec<DebugEntry>,
}

impl ProximityResult {
    pub fn is_fallback(&self) -> bool {
        self.active_anchor_ids.is_empty() && !self.weighted_prompts.is_empty()
    }
}

#[derive(Debug)]
pub struct ProximityWeightEngine {
    config: ProximityConfig,
    smoothed: HashMap<AnchorId, f32>,
    last_sent: HashMap<AnchorId, f32>,
    has_sent: bool,
}

impl ProximityWeightEngine {
    pub fn new(config: ProximityConfig) -> Self {
        Self {
            config,
            smoothed: HashMap::new(),
            last_sent: HashMap::new(),
            has_sent: false,
        }
    }

    pub fn config(&self) -> &ProximityConfig {
        &self.config
    }

    /// Raw weight of one anchor seen from `position`.
    pub fn raw_weight(&self, position: Vec3, anchor: &Anchor) -> f32 {
        let radius = anchor.radius.unwrap_or(self.config.radius);
        self.config.falloff.weight(position.distance(anchor.position), radius)
    }

    /// One-shot evaluation from raw weights. Leaves smoothing state alone.
    pub fn calculate(&self, position: Vec3, anchors: &[Anchor]) -> ProximityResult {
        let weights: Vec<f32> = anchors.iter().map(|a| self.raw_weight(position, a)).collect();
        self.build_result(position, anchors, &weights)
    }

    /// Advance smoothing one tick toward the raw weights at `position` and
    /// evaluate from the smoothed values.
    pub fn update(&mut self, position: Vec3, anchors: &[Anchor]) -> ProximityResult {
        let factor = self.config.smoothing_factor.clamp(0.0, 1.0);
        let mut weights = Vec::with_capacity(anchors.len());
        for anchor in anchors {
            let target = self.raw_weight(position, anchor);
            let current = self.smoothed.entry(anchor.id.clone()).or_insert(0.0);
            *current += (target - *current) * factor;
            weights.push(*current);
        }
        self.build_result(position, anchors, &weights)
    }

    pub fn smoothed_weight(&self, id: &AnchorId) -> f32 {
        self.smoothed.get(id).copied().unwrap_or(0.0)
    }

    /// Whether the smoothed vector has moved enough since the last push.
    pub fn should_push(&self) -> bool {
        if !self.has_sent {
            return true;
        }
        self.max_drift() > self.config.change_threshold
    }

    /// Largest per-anchor difference between smoothed and last-sent weights.
    pub fn max_drift(&self) -> f32 {
        let ids = self.smoothed.keys().chain(self.last_sent.keys());
        ids.map(|id| {
            let now = self.smoothed.get(id).copied().unwrap_or(0.0);
            let sent = self.last_sent.get(id).copied().unwrap_or(0.0);
            (now - sent).abs()
        })
        .fold(0.0, f32::max)
    }

    /// Record the current smoothed vector as transmitted.
    pub fn mark_sent(&mut self) {
        self.last_sent = self.smoothed.clone();
        self.has_sent = true;
    }

    /// Forget that anything was sent; the next check pushes unconditionally.
    pub fn mark_unsent(&mut self) {
        self.has_sent = false;
    }

    /// Drop smoothing state for anchors that no longer exist.
    pub fn retain_anchors(&mut self, anchors: &[Anchor]) {
        let live: HashSet<&AnchorId> = anchors.iter().map(|a| &a.id).collect();
        self.smoothed.retain(|id, _| live.contains(id));
        self.last_sent.retain(|id, _| live.contains(id));
    }

    fn build_result(&self, position: Vec3, anchors: &[Anchor], weights: &[f32]) -> ProximityResult {
        let mut result = ProximityResult {
            distance_to_nearest: f32::INFINITY,
            ..Default::default()
        };

        let mut candidates: Vec<(usize, f32)> = Vec::new();
        for (i, (anchor, &weight)) in anchors.iter().zip(weights).enumerate() {
            let distance = position.distance(anchor.position);
            if distance < result.distance_to_nearest {
                result.distance_to_nearest = distance;
                result.nearest_anchor = Some(anchor.id.clone());
            }
            result.debug.push(DebugEntry {
                id: anchor.id.clone(),
                weight,
                distance,
            });
            if weight >= self.config.min_weight {
                candidates.push((i, weight));
            }
        }

        // Stable sort keeps configuration order among equal weights.
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        candidates.truncate(self.config.max_prompts);

        if candidates.is_empty() {
            result.weighted_prompts = anchors
                .iter()
                .take(self.config.fallback_count)
                .map(|a| WeightedPrompt::new(a.prompt.clone(), self.config.fallback_weight))
                .collect();
            return result;
        }

        for (i, weight) in candidates {
            let anchor = &anchors[i];
            result.active_anchor_ids.insert(anchor.id.clone());
            result
                .weighted_prompts
                .push(WeightedPrompt::new(anchor.prompt.clone(), weight.clamp(0.0, 1.0)));
        }
        result
    }
}
