//! Simulated-time and time-step bookkeeping for the incremental loop.

/// Tracks current simulated time and the adaptive time-step size.
///
/// Only the time-step controller mutates this object: it advances time with
/// [`TimeControl::proceed`], rolls back a rejected step with
/// [`TimeControl::restore_previous_time`] and rescales the step with
/// [`TimeControl::scale_timestep`].
#[derive(Debug, Clone, PartialEq)]
pub struct TimeControl {
    current_time: f64,
    previous_time: f64,
    timestep: f64,
    min_timestep: f64,
    max_timestep: f64,
}

impl TimeControl {
    /// Start at time zero with the given step size and no step bounds.
    pub fn new(timestep: f64) -> Self {
        Self {
            current_time: 0.0,
            previous_time: 0.0,
            timestep,
            min_timestep: 0.0,
            max_timestep: f64::MAX,
        }
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn timestep(&self) -> f64 {
        self.timestep
    }

    pub fn min_timestep(&self) -> f64 {
        self.min_timestep
    }

    pub fn max_timestep(&self) -> f64 {
        self.max_timestep
    }

    pub fn set_timestep(&mut self, timestep: f64) {
        self.timestep = timestep;
    }

    pub fn set_min_timestep(&mut self, min: f64) {
        self.min_timestep = min;
    }

    pub fn set_max_timestep(&mut self, max: f64) {
        self.max_timestep = max;
    }

    /// Advance to the next time, remembering the previous one.
    pub fn proceed(&mut self) {
        self.previous_time = self.current_time;
        self.current_time += self.timestep;
    }

    /// Roll back to the time before the last [`Self::proceed`].
    pub fn restore_previous_time(&mut self) {
        self.current_time = self.previous_time;
    }

    /// Scale the time step, clamped to the configured maximum.
    pub fn scale_timestep(&mut self, factor: f64) {
        self.timestep = (self.timestep * factor).min(self.max_timestep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proceed_and_restore() {
        let mut time = TimeControl::new(0.5);
        time.proceed();
        assert_eq!(time.current_time(), 0.5);
        time.proceed();
        assert_eq!(time.current_time(), 1.0);
        time.restore_previous_time();
        assert_eq!(time.current_time(), 0.5);
    }

    #[test]
    fn scaling_is_clamped_at_maximum() {
        let mut time = TimeControl::new(1.0);
        time.set_max_timestep(1.2);
        time.scale_timestep(1.5);
        assert_eq!(time.timestep(), 1.2);
        time.scale_timestep(0.5);
        assert_eq!(time.timestep(), 0.6);
    }
}
