use crate::HopMeasurement;
use std::time::Duration;

/// Arithmetic mean of the samples, `None` if there are none
pub fn mean(samples: &[Duration]) -> Option<Duration> {
    if samples.is_empty() {
        return None;
    }
    let total: u128 = samples.iter().map(Duration::as_nanos).sum();
    let nanos = total / samples.len() as u128;
    Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
}

/// Population standard deviation of the samples (squared deviations divided by the sample
/// count), `None` if there are none
pub fn std_dev(samples: &[Duration]) -> Option<Duration> {
    if samples.is_empty() {
        return None;
    }
    let count = samples.len() as f64;
    let mean = samples.iter().map(|rtt| rtt.as_nanos() as f64).sum::<f64>() / count;
    let sum_squares: f64 = samples
        .iter()
        .map(|rtt| {
            let diff = rtt.as_nanos() as f64 - mean;
            diff * diff
        })
        .sum();
    let variance = sum_squares / count;
    Some(Duration::from_secs_f64(variance.sqrt() / 1e9))
}

/// Summary of one hop measurement
#[derive(Debug, Clone, PartialEq)]
pub struct HopStatistics {
    pub mean: Option<Duration>,
    pub std_dev: Option<Duration>,
    pub min: Option<Duration>,
    pub max: Option<Duration>,
    pub packet_loss: f64,
}

impl From<&HopMeasurement> for HopStatistics {
    fn from(measurement: &HopMeasurement) -> Self {
        let latencies = &measurement.latencies;
        HopStatistics {
            mean: mean(latencies),
            std_dev: std_dev(latencies),
            min: latencies.iter().min().copied(),
            max: latencies.iter().max().copied(),
            packet_loss: measurement.packet_loss,
        }
    }
}
