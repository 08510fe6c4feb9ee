/// Velocity-limited move towards a target position.
///
/// Shared by devices that travel between positions over several ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct Motion {
    position: f64,
    target: f64,
    /// Units per simulated second
    velocity: f64,
}

impl Motion {
    /// A motion at rest at `position`
    pub fn new(position: f64, velocity: f64) -> Self {
        Self {
            position,
            target: position,
            velocity,
        }
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    pub fn is_moving(&self) -> bool {
        self.position != self.target
    }

    /// Travel for `dt` seconds, stopping exactly on the target
    pub fn advance(&mut self, dt: f64) -> f64 {
        let step = self.velocity * dt;
        let remaining = self.target - self.position;
        if remaining.abs() <= step {
            self.position = self.target;
        } else {
            self.position += step.copysign(remaining);
        }
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_is_velocity_limited() {
        let mut motion = Motion::new(0.0, 2.0);
        motion.set_target(5.0);

        assert_eq!(motion.advance(1.0), 2.0);
        assert!(motion.is_moving());
        assert_eq!(motion.advance(1.0), 4.0);
        assert_eq!(motion.advance(1.0), 5.0);
        assert!(!motion.is_moving());
    }

    #[test]
    fn test_advance_backwards() {
        let mut motion = Motion::new(1.0, 0.5);
        motion.set_target(0.0);
        assert_eq!(motion.advance(1.0), 0.5);
        assert_eq!(motion.advance(1.0), 0.0);
    }

    #[test]
    fn test_zero_velocity_never_arrives() {
        let mut motion = Motion::new(0.0, 0.0);
        motion.set_target(1.0);
        assert_eq!(motion.advance(10.0), 0.0);
        assert!(motion.is_moving());
    }
}
