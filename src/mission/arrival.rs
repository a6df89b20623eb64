//! Arrival detection

use fleetnav_shared::{Position, Waypoint};

/// Per-axis tolerance in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrivalThreshold {
    pub lat: f64,
    pub lon: f64,
}

impl ArrivalThreshold {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True when both axes are within tolerance of the goal
    ///
    /// The unknown-position placeholder never counts as arrived.
    pub fn is_arrived(&self, goal: &Waypoint, current: &Position) -> bool {
        current.is_known()
            && (goal.latitude - current.latitude).abs() <= self.lat
            && (goal.longitude - current.longitude).abs() <= self.lon
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn goal(lat: f64, lon: f64) -> Waypoint {
        Waypoint {
            latitude: lat,
            longitude: lon,
            height: 30.0,
        }
    }

    #[test]
    fn test_within_and_outside_threshold() {
        let threshold = ArrivalThreshold::new(0.001, 0.001);
        let target = goal(18.5674, 73.7716);

        assert!(threshold.is_arrived(&target, &Position::new(18.5679, 73.7711)));
        assert!(!threshold.is_arrived(&target, &Position::new(18.5690, 73.7716)));
        // One axis is not enough
        assert!(!threshold.is_arrived(&target, &Position::new(18.5674, 73.7736)));
    }

    #[test]
    fn test_unknown_position_never_arrives() {
        let threshold = ArrivalThreshold::new(10.0, 10.0);
        assert!(!threshold.is_arrived(&goal(-1.0, -1.0), &Position::UNKNOWN));
    }

    proptest! {
        #[test]
        fn arrival_is_monotonic_in_threshold(
            lat in -80.0f64..80.0,
            lon in -170.0f64..170.0,
            d_lat in -0.01f64..0.01,
            d_lon in -0.01f64..0.01,
            small in 0.0001f64..0.005,
            extra in 0.0f64..0.005,
        ) {
            let target = goal(lat, lon);
            let current = Position::new(lat + d_lat, lon + d_lon);
            let tight = ArrivalThreshold::new(small, small);
            let loose = ArrivalThreshold::new(small + extra, small + extra);

            if tight.is_arrived(&target, &current) {
                prop_assert!(loose.is_arrived(&target, &current));
            }
        }
    }
}
