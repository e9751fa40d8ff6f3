//! Movement gating for the tracked listener.
//!
//! A position only counts as "changed" once enough time has passed since
//! the last accepted update *and* the listener has moved far enough from
//! where it was then. Everything in between is render-frame noise.

use std::time::Duration;

use sonarium_types::Vec3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerConfig {
    pub update_interval: Duration,
    pub min_distance: f32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_millis(10_000),
            min_distance: 5.0,
        }
    }
}

/// Called with `(new, old)` whenever an update is accepted.
pub type PositionCallback = Box<dyn FnMut(Vec3, Vec3)>;

pub struct PositionSampler {
    config: SamplerConfig,
    last_accepted: Vec3,
    last_update: Duration,
    on_change: Option<PositionCallback>,
}

impl PositionSampler {
    /// Baseline is `initial` at host time `now`.
    pub fn new(config: SamplerConfig, initial: Vec3, now: Duration) -> Self {
        Self {
            config,
            last_accepted: initial,
            last_update: now,
            on_change: None,
        }
    }

    pub fn set_callback(&mut self, callback: PositionCallback) {
        self.on_change = Some(callback);
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn last_accepted(&self) -> Vec3 {
        self.last_accepted
    }

    pub fn last_update(&self) -> Duration {
        self.last_update
    }

    /// Accept `current` if both the time and distance gates pass.
    pub fn check_position(&mut self, current: Vec3, now: Duration) -> bool {
        if !current.is_finite() {
            return false;
        }
        if now.saturating_sub(self.last_update) < self.config.update_interval {
            return false;
        }
        if current.distance(self.last_accepted) < self.config.min_distance {
            return false;
        }
        self.accept(current, now);
        true
    }

    /// Accept `current` unconditionally.
    pub fn force_update(&mut self, current: Vec3, now: Duration) {
        self.accept(current, now);
    }

    /// Move the baseline without notifying anyone.
    pub fn reset(&mut self, position: Vec3, now: Duration) {
        self.last_accepted = position;
        self.last_update = now;
    }

    fn accept(&mut self, current: Vec3, now: Duration) {
        let old = self.last_accepted;
        self.last_accepted = current;
        self.last_update = now;
        if let Some(cb) = self.on_change.as_mut() {
            cb(current, old);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn time_gate_holds_until_interval_elapses() {
        let mut s = PositionSampler::new(SamplerConfig::default(), Vec3::ZERO, ms(0));
        let far = Vec3::new(10.0, 0.0, 0.0);
        assert!(!s.check_position(far, ms(3_000)));
        assert!(!s.check_position(far, ms(6_000)));
        assert!(s.check_position(far, ms(11_000)));
        assert_eq!(s.last_accepted(), far);
        assert_eq!(s.last_update(), ms(11_000));
    }

    #[test]
    fn distance_gate_rejects_small_moves() {
        let mut s = PositionSampler::new(SamplerConfig::default(), Vec3::ZERO, ms(0));
        assert!(!s.check_position(Vec3::new(4.9, 0.0, 0.0), ms(20_000)));
        assert!(s.check_position(Vec3::new(0.0, 5.0, 0.0), ms(20_000)));
    }

    #[test]
    fn callback_sees_new_and_old() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut s = PositionSampler::new(SamplerConfig::default(), Vec3::ZERO, ms(0));
        s.set_callback(Box::new(move |new, old| sink.borrow_mut().push((new, old))));

        let p = Vec3::new(0.0, 0.0, 8.0);
        s.check_position(p, ms(12_000));
        assert_eq!(seen.borrow().as_slice(), &[(p, Vec3::ZERO)]);
    }

    #[test]
    fn force_bypasses_gates_and_reset_is_silent() {
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        let mut s = PositionSampler::new(SamplerConfig::default(), Vec3::ZERO, ms(0));
        s.set_callback(Box::new(move |_, _| *counter.borrow_mut() += 1));

        s.force_update(Vec3::new(1.0, 0.0, 0.0), ms(1));
        assert_eq!(*calls.borrow(), 1);

        s.reset(Vec3::new(100.0, 0.0, 0.0), ms(2));
        assert_eq!(*calls.borrow(), 1);
        assert_eq!(s.last_accepted(), Vec3::new(100.0, 0.0, 0.0));
        // Time gate restarts from the reset.
        assert!(!s.check_position(Vec3::ZERO, ms(5_000)));
    }

    #[test]
    fn non_finite_positions_are_ignored() {
        let mut s = PositionSampler::new(SamplerConfig::default(), Vec3::ZERO, ms(0));
        assert!(!s.check_position(Vec3::new(f32::NAN, 0.0, 0.0), ms(60_000)));
    }
}
