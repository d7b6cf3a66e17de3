use crate::DistanceReading;

/// Whether the warning LED should be lit. Invalid readings never raise an
/// alert, and the threshold itself is not "too close".
pub fn decide(reading: DistanceReading, threshold_cm: f64) -> bool {
    match reading {
        DistanceReading::Valid { distance_cm } => distance_cm < threshold_cm,
        DistanceReading::Invalid(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RangeFault;

    fn valid(distance_cm: f64) -> DistanceReading {
        DistanceReading::Valid { distance_cm }
    }

    #[test]
    fn closer_than_threshold_alerts() {
        assert!(decide(valid(30.0), 40.0));
    }

    #[test]
    fn farther_than_threshold_is_quiet() {
        assert!(!decide(valid(50.0), 40.0));
    }

    #[test]
    fn threshold_boundary_is_quiet() {
        assert!(!decide(valid(40.0), 40.0));
    }

    #[test]
    fn invalid_reading_never_alerts() {
        let faults = [
            RangeFault::EchoStartTimeout,
            RangeFault::EchoEndTimeout,
            RangeFault::OutOfRange { distance_cm: 999.0 },
        ];
        for fault in faults {
            for threshold in [0.0, 40.0, 1_000.0, f64::MAX] {
                assert!(!decide(DistanceReading::Invalid(fault), threshold));
            }
        }
    }
}
