//! Scripted listener path: a closed loop through every anchor.

use sonarium_types::{Anchor, Vec3};

/// Walking pace in world units per second.
const SPEED: f32 = 4.0;

pub struct AnchorTour {
    waypoints: Vec<Vec3>,
    /// Cumulative distance at the start of each leg.
    offsets: Vec<f32>,
    length: f32,
}

impl AnchorTour {
    pub fn around(anchors: &[Anchor]) -> Self {
        let waypoints: Vec<Vec3> = anchors.iter().map(|a| a.position).collect();
        let mut offsets = Vec::with_capacity(waypoints.len());
        let mut length = 0.0;
        for (i, from) in waypoints.iter().enumerate() {
            offsets.push(length);
            let to = waypoints[(i + 1) % waypoints.len()];
            length += from.distance(to);
        }
        Self {
            waypoints,
            offsets,
            length,
        }
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    /// Listener position after walking for `secs`.
    pub fn position_at(&self, secs: f32) -> Vec3 {
        match self.waypoints.len() {
            0 => return Vec3::ZERO,
            1 => return self.waypoints[0],
            _ => {}
        }
        if self.length <= f32::EPSILON {
            return self.waypoints[0];
        }

        let travelled = (secs.max(0.0) * SPEED) % self.length;
        let leg = self
            .offsets
            .iter()
            .rposition(|&start| start <= travelled)
            .unwrap_or(0);
        let from = self.waypoints[leg];
        let to = self.waypoints[(leg + 1) % self.waypoints.len()];
        let span = from.distance(to);
        if span <= f32::EPSILON {
            return from;
        }
        let t = (travelled - self.offsets[leg]) / span;
        Vec3::new(
            from.x + (to.x - from.x) * t,
            from.y + (to.y - from.y) * t,
            from.z + (to.z - from.z) * t,
        )
    }
}
