//! Servo sweep geometry: angle stepping and angle-to-pulse mapping.

use crate::config::ActuatorCfg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// 0 degrees up to the maximum angle.
    Raise,
    /// Maximum angle back down to 0 degrees.
    Lower,
}

/// Linear map from servo angle to pulse width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseMap {
    pub min_pulse_us: u32,
    pub max_pulse_us: u32,
    pub max_angle_deg: u16,
}

impl PulseMap {
    pub fn from_cfg(cfg: &ActuatorCfg) -> Self {
        Self {
            min_pulse_us: cfg.min_pulse_us,
            max_pulse_us: cfg.max_pulse_us,
            max_angle_deg: cfg.max_angle_deg.max(1),
        }
    }

    /// Integer interpolation; angles past the maximum clamp to `max_pulse_us`.
    #[inline]
    pub fn angle_to_pulse_us(&self, angle_deg: u16) -> u32 {
        let angle = u32::from(angle_deg.min(self.max_angle_deg));
        let span = self.max_pulse_us.saturating_sub(self.min_pulse_us);
        angle * span / u32::from(self.max_angle_deg) + self.min_pulse_us
    }

    /// Angles visited by a sweep, endpoints included, in 1 degree steps.
    pub fn sweep(&self, direction: Direction) -> impl Iterator<Item = u16> {
        let max = self.max_angle_deg;
        (0..=max).map(move |step| match direction {
            Direction::Raise => step,
            Direction::Lower => max - step,
        })
    }
}

impl Default for PulseMap {
    fn default() -> Self {
        Self::from_cfg(&ActuatorCfg::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_and_midpoint() {
        let m = PulseMap::default();
        assert_eq!(m.angle_to_pulse_us(0), 500);
        assert_eq!(m.angle_to_pulse_us(90), 1500);
        assert_eq!(m.angle_to_pulse_us(180), 2500);
        assert_eq!(m.angle_to_pulse_us(250), 2500);
    }

    #[test]
    fn sweeps_are_inclusive_and_ordered() {
        let m = PulseMap::default();
        let up: Vec<u16> = m.sweep(Direction::Raise).collect();
        let down: Vec<u16> = m.sweep(Direction::Lower).collect();
        assert_eq!(up.len(), 181);
        assert_eq!((up[0], up[180]), (0, 180));
        assert_eq!((down[0], down[180]), (180, 0));
    }
}
