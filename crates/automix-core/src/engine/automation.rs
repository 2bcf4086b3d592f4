//! Time-stamped parameter automation
//!
//! An [`AudioParam`] is a value over the mixer timeline described by a list of
//! events, with the usual set/linear-ramp/exponential-ramp semantics: a ramp
//! event describes the segment that *ends* at its time, starting from the
//! previous event's value.

/// Ramps shorter than this are treated as steps
const MIN_RAMP_SECS: f64 = 1e-9;

/// Simpson subintervals per automation segment when integrating
const INTEGRATION_STEPS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamEvent {
    SetValue { time: f64, value: f64 },
    LinearRamp { time: f64, value: f64 },
    ExponentialRamp { time: f64, value: f64 },
}

impl ParamEvent {
    #[inline]
    pub fn time(&self) -> f64 {
        match *self {
            ParamEvent::SetValue { time, .. }
            | ParamEvent::LinearRamp { time, .. }
            | ParamEvent::ExponentialRamp { time, .. } => time,
        }
    }

    #[inline]
    pub fn value(&self) -> f64 {
        match *self {
            ParamEvent::SetValue { value, .. }
            | ParamEvent::LinearRamp { value, .. }
            | ParamEvent::ExponentialRamp { value, .. } => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioParam {
    default_value: f64,
    /// Sorted by time; equal times keep insertion order
    events: Vec<ParamEvent>,
}

impl AudioParam {
    pub fn new(default_value: f64) -> Self {
        Self {
            default_value,
            events: Vec::new(),
        }
    }

    pub fn default_value(&self) -> f64 {
        self.default_value
    }

    pub fn events(&self) -> &[ParamEvent] {
        &self.events
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    fn insert(&mut self, event: ParamEvent) {
        let time = event.time();
        let index = self.events.partition_point(|e| e.time() <= time);
        self.events.insert(index, event);
    }

    pub fn set_value_at_time(&mut self, value: f64, time: f64) {
        self.insert(ParamEvent::SetValue { time, value });
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f64, time: f64) {
        self.insert(ParamEvent::LinearRamp { time, value });
    }

    /// Exponential ramp; degrades to a linear ramp when either endpoint is
    /// zero or the endpoints differ in sign
    pub fn exponential_ramp_to_value_at_time(&mut self, value: f64, time: f64) {
        self.insert(ParamEvent::ExponentialRamp { time, value });
    }

    /// Drop every event at or after `time`
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        self.events.retain(|e| e.time() < time);
    }

    /// Freeze the curve at its value at `time` and drop everything after
    ///
    /// A ramp in progress at `time` is cut short there, so the curve up to
    /// `time` is unchanged.
    pub fn cancel_and_hold(&mut self, time: f64) {
        let held = self.value_at(time);
        let next = self.events.partition_point(|e| e.time() <= time);
        let at_time = next > 0 && self.events[next - 1].time() == time;
        let in_progress = if at_time { None } else { self.events.get(next).copied() };

        self.cancel_scheduled_values(time);
        match in_progress {
            Some(ParamEvent::LinearRamp { .. }) => self.linear_ramp_to_value_at_time(held, time),
            Some(ParamEvent::ExponentialRamp { .. }) => {
                self.exponential_ramp_to_value_at_time(held, time)
            }
            _ => self.set_value_at_time(held, time),
        }
    }

    /// Forget all automation and rest at `value`
    pub fn reset(&mut self, value: f64) {
        self.events.clear();
        self.default_value = value;
    }

    /// Curve value at `time`
    pub fn value_at(&self, time: f64) -> f64 {
        let next = self.events.partition_point(|e| e.time() <= time);
        let (prev_time, prev_value) = match next.checked_sub(1).map(|i| self.events[i]) {
            Some(event) => (event.time(), event.value()),
            None => (f64::NEG_INFINITY, self.default_value),
        };

        match self.events.get(next) {
            Some(&ParamEvent::LinearRamp { time: end, value }) => {
                interpolate_linear(prev_time, prev_value, end, value, time)
            }
            Some(&ParamEvent::ExponentialRamp { time: end, value }) => {
                interpolate_exponential(prev_time, prev_value, end, value, time)
            }
            _ => prev_value,
        }
    }

    /// Integral of the curve over `[from, to]`
    ///
    /// With the playback rate as the curve this is the track time that passes
    /// between two timeline instants.
    pub fn integrate(&self, from: f64, to: f64) -> f64 {
        if to <= from {
            return 0.0;
        }
        let mut area = 0.0;
        let mut a = from;
        for event_time in self.events.iter().map(|e| e.time()) {
            if event_time <= a {
                continue;
            }
            if event_time >= to {
                break;
            }
            area += self.integrate_segment(a, event_time);
            a = event_time;
        }
        area + self.integrate_segment(a, to)
    }

    /// Simpson's rule within one automation segment (exact for steps and
    /// linear ramps)
    fn integrate_segment(&self, a: f64, b: f64) -> f64 {
        let width = b - a;
        if width <= 0.0 {
            return 0.0;
        }
        let h = width / INTEGRATION_STEPS as f64;
        // Sample just inside the segment so a step at `a` is seen on the
        // right side
        let at = |i: usize| {
            let t = a + h * i as f64;
            let t = if i == 0 { a + width * 1e-12 } else if i == INTEGRATION_STEPS { b - width * 1e-12 } else { t };
            self.value_at(t)
        };
        let mut sum = at(0) + at(INTEGRATION_STEPS);
        for i in 1..INTEGRATION_STEPS {
            sum += at(i) * if i % 2 == 1 { 4.0 } else { 2.0 };
        }
        sum * h / 3.0
    }

    /// Earliest time `t >= from` with `integrate(from, t) == area`
    ///
    /// Assumes the curve is positive after `from`. Returns infinity if the
    /// curve settles at a non-positive value before the area is reached.
    pub fn time_for_integral(&self, from: f64, area: f64) -> f64 {
        if area <= 0.0 {
            return from;
        }
        let mut remaining = area;
        let mut a = from;
        let boundaries = self.events.iter().map(|e| e.time()).filter(|&t| t > from);
        for b in boundaries {
            let segment = self.integrate_segment(a, b);
            if segment >= remaining {
                return self.bisect_segment(a, b, remaining);
            }
            remaining -= segment;
            a = b;
        }

        let tail = self.value_at(a + MIN_RAMP_SECS);
        if tail <= 0.0 {
            return f64::INFINITY;
        }
        a + remaining / tail
    }

    fn bisect_segment(&self, a: f64, b: f64, area: f64) -> f64 {
        let (mut lo, mut hi) = (a, b);
        for _ in 0..60 {
            let mid = 0.5 * (lo + hi);
            if self.integrate_segment(a, mid) < area {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        0.5 * (lo + hi)
    }
}

fn interpolate_linear(t0: f64, v0: f64, t1: f64, v1: f64, t: f64) -> f64 {
    if !t0.is_finite() || t1 - t0 < MIN_RAMP_SECS {
        return if t >= t1 { v1 } else { v0 };
    }
    let progress = ((t - t0) / (t1 - t0)).clamp(0.0, 1.0);
    v0 + (v1 - v0) * progress
}

fn interpolate_exponential(t0: f64, v0: f64, t1: f64, v1: f64, t: f64) -> f64 {
    if v0 == 0.0 || v1 == 0.0 || (v0 > 0.0) != (v1 > 0.0) {
        return interpolate_linear(t0, v0, t1, v1, t);
    }
    if !t0.is_finite() || t1 - t0 < MIN_RAMP_SECS {
        return if t >= t1 { v1 } else { v0 };
    }
    let progress = ((t - t0) / (t1 - t0)).clamp(0.0, 1.0);
    v0 * (v1 / v0).powf(progress)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_without_events() {
        let param = AudioParam::new(0.5);
        assert_eq!(param.value_at(-3.0), 0.5);
        assert_eq!(param.value_at(100.0), 0.5);
    }

    #[test]
    fn test_set_then_linear_ramp() {
        let mut param = AudioParam::new(1.0);
        param.set_value_at_time(0.0001, 10.0);
        param.linear_ramp_to_value_at_time(1.0, 20.0);

        assert_eq!(param.value_at(5.0), 1.0);
        assert_eq!(param.value_at(10.0), 0.0001);
        assert!((param.value_at(15.0) - 0.50005).abs() < 1e-9);
        assert_eq!(param.value_at(25.0), 1.0);
    }

    #[test]
    fn test_exponential_ramp_and_sign_fallback() {
        let mut param = AudioParam::new(1.0);
        param.set_value_at_time(100.0, 0.0);
        param.exponential_ramp_to_value_at_time(1.0, 2.0);
        assert!((param.value_at(1.0) - 10.0).abs() < 1e-9);

        let mut flipped = AudioParam::new(0.0);
        flipped.set_value_at_time(-1.0, 0.0);
        flipped.exponential_ramp_to_value_at_time(1.0, 2.0);
        assert!(flipped.value_at(1.0).abs() < 1e-12);
    }

    #[test]
    fn test_equal_times_keep_insertion_order() {
        let mut param = AudioParam::new(0.0);
        param.set_value_at_time(0.25, 1.0);
        param.set_value_at_time(0.75, 1.0);
        assert_eq!(param.value_at(1.0), 0.75);
    }

    #[test]
    fn test_cancel_and_hold_freezes_ramp() {
        let mut param = AudioParam::new(0.0);
        param.set_value_at_time(0.0, 0.0);
        param.linear_ramp_to_value_at_time(1.0, 10.0);
        param.cancel_and_hold(4.0);

        assert!((param.value_at(4.0) - 0.4).abs() < 1e-12);
        assert!((param.value_at(50.0) - 0.4).abs() < 1e-12);
        // The ramp up to the hold point is kept
        assert!((param.value_at(2.0) - 0.2).abs() < 1e-12);
        assert_eq!(param.events().len(), 2);
    }

    #[test]
    fn test_cancel_and_hold_between_steps() {
        let mut param = AudioParam::new(0.0);
        param.set_value_at_time(0.3, 1.0);
        param.set_value_at_time(0.9, 5.0);
        param.cancel_and_hold(3.0);
        assert_eq!(param.value_at(2.0), 0.3);
        assert_eq!(param.value_at(9.0), 0.3);
    }

    #[test]
    fn test_integral_of_ramp_and_its_inverse() {
        let mut rate = AudioParam::new(1.0);
        rate.set_value_at_time(0.5, 0.0);
        rate.set_value_at_time(0.5, 10.0);
        rate.linear_ramp_to_value_at_time(1.0, 20.0);

        // 10s at 0.5, then a ramp averaging 0.75 for 10s, then unity
        assert!((rate.integrate(0.0, 10.0) - 5.0).abs() < 1e-9);
        assert!((rate.integrate(0.0, 20.0) - 12.5).abs() < 1e-9);
        assert!((rate.integrate(0.0, 30.0) - 22.5).abs() < 1e-9);

        assert!((rate.time_for_integral(0.0, 5.0) - 10.0).abs() < 1e-6);
        assert!((rate.time_for_integral(0.0, 22.5) - 30.0).abs() < 1e-6);
        let t = rate.time_for_integral(0.0, 8.0);
        assert!((rate.integrate(0.0, t) - 8.0).abs() < 1e-6);
    }

    #[test]
    fn test_flat_curve_inverse_is_linear() {
        let rate = AudioParam::new(1.0);
        assert!((rate.time_for_integral(3.0, 7.5) - 10.5).abs() < 1e-12);
        assert_eq!(rate.time_for_integral(3.0, 0.0), 3.0);
    }
}
