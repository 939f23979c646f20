//! Hit points. A character is alive while its health is above zero.

use serde::{Deserialize, Serialize};

/// Current and maximum hit points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Health {
    current: f32,
    max: f32,
}

impl Default for Health {
    fn default() -> Self {
        Self::new(100.0)
    }
}

impl Health {
    /// Full health with `max` hit points, at least one.
    pub fn new(max: f32) -> Self {
        let max = if max.is_finite() { max.max(1.0) } else { 1.0 };
        Self { current: max, max }
    }

    /// Hit points left.
    pub fn current(&self) -> f32 {
        self.current
    }

    /// Maximum hit points.
    pub fn max(&self) -> f32 {
        self.max
    }

    /// Remaining fraction in `[0, 1]`.
    pub fn fraction(&self) -> f32 {
        (self.current / self.max).clamp(0.0, 1.0)
    }

    /// True while above zero.
    pub fn is_alive(&self) -> bool {
        self.current > 0.0
    }

    /// Take damage and return true if this hit killed.
    ///
    /// Dead characters and non-positive amounts are ignored.
    pub fn damage(&mut self, amount: f32) -> bool {
        if !self.is_alive() || amount.is_nan() || amount <= 0.0 {
            return false;
        }
        self.current = (self.current - amount).max(0.0);
        !self.is_alive()
    }

    /// Bring back to `fraction` of max health, never below one point.
    pub fn revive(&mut self, fraction: f32) {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        self.current = (self.max * fraction).max(1.0).min(self.max);
    }

    /// Finite values with `0 <= current <= max`.
    pub fn is_well_formed(&self) -> bool {
        self.current.is_finite()
            && self.max.is_finite()
            && self.max > 0.0
            && (0.0..=self.max).contains(&self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn damage_reports_the_killing_hit_once() {
        let mut health = Health::new(50.0);
        assert!(!health.damage(20.0));
        assert_eq!(health.current(), 30.0);
        assert!(health.damage(45.0));
        assert_eq!(health.current(), 0.0);
        assert!(!health.is_alive());
        assert!(!health.damage(10.0));
    }

    #[test]
    fn non_positive_damage_is_ignored() {
        let mut health = Health::new(50.0);
        assert!(!health.damage(-5.0));
        assert!(!health.damage(f32::NAN));
        assert_eq!(health.current(), 50.0);
    }

    #[test]
    fn revive_keeps_at_least_one_point() {
        let mut health = Health::new(100.0);
        health.damage(100.0);
        health.revive(0.0);
        assert_eq!(health.current(), 1.0);
        health.revive(0.5);
        assert_eq!(health.current(), 50.0);
        health.revive(4.0);
        assert_eq!(health.current(), 100.0);
        assert!(health.is_well_formed());
    }
}
