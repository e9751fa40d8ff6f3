//! Sample-accurate gain automation.
//!
//! A `GainParam` holds a time-ordered list of automation events on the
//! output clock. A `Set` event jumps to a value; a `Ramp` event moves
//! linearly from the previous event's value to its own, arriving at its
//! time.

#[derive(Debug, Clone, Copy, PartialEq)]
enum GainEvent {
    Set { time: f64, value: f32 },
    Ramp { time: f64, value: f32 },
}

impl GainEvent {
    fn time(&self) -> f64 {
        match *self {
            GainEvent::Set { time, .. } | GainEvent::Ramp { time, .. } => time,
        }
    }

    fn value(&self) -> f32 {
        match *self {
            GainEvent::Set { value, .. } | GainEvent::Ramp { value, .. } => value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GainParam {
    initial: f32,
    events: Vec<GainEvent>,
}

impl GainParam {
    pub fn new(initial: f32) -> Self {
        Self {
            initial,
            events: Vec::new(),
        }
    }

    fn insert(&mut self, event: GainEvent) {
        let idx = self.events.partition_point(|e| e.time() <= event.time());
        self.events.insert(idx, event);
    }

    /// Jump to `value` at `time`.
    pub fn set_value_at(&mut self, value: f32, time: f64) {
        self.insert(GainEvent::Set { time, value });
    }

    /// Ramp linearly from the preceding event's value, arriving at `value` at `end_time`.
    pub fn linear_ramp_to(&mut self, value: f32, end_time: f64) {
        self.insert(GainEvent::Ramp {
            time: end_time,
            value,
        });
    }

    /// Drop all automation at or after `time` and hold the value it had then.
    pub fn cancel_and_hold(&mut self, time: f64) {
        let held = self.value_at(time);
        self.events.retain(|e| e.time() < time);
        self.events.push(GainEvent::Set { time, value: held });
    }

    /// Gain at output time `t`.
    pub fn value_at(&self, t: f64) -> f32 {
        let next_idx = self.events.partition_point(|e| e.time() <= t);
        let (prev_time, prev_value) = match next_idx.checked_sub(1) {
            Some(i) => (self.events[i].time(), self.events[i].value()),
            None => (f64::NEG_INFINITY, self.initial),
        };

        match self.events.get(next_idx) {
            Some(&GainEvent::Ramp { time, value }) if prev_time.is_finite() && time > prev_time => {
                let frac = ((t - prev_time) / (time - prev_time)) as f32;
                prev_value + (value - prev_value) * frac
            }
            // A ramp with no predecessor starts from the initial value at t = 0.
            Some(&GainEvent::Ramp { time, value }) if !prev_time.is_finite() && time > 0.0 => {
                let frac = (t.max(0.0) / time) as f32;
                prev_value + (value - prev_value) * frac
            }
            _ => prev_value,
        }
    }

    /// Forget events that can no longer influence values at or after `now`.
    pub fn prune(&mut self, now: f64) {
        let next_idx = self.events.partition_point(|e| e.time() <= now);
        if next_idx > 1 {
            let last_past = self.events[next_idx - 1];
            self.events.drain(..next_idx - 1);
            self.initial = last_past.value();
        }
    }
}
