use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct DeviceLossState {
    last_f_cnt: u64,
    total_loss: u64,
    packet_count: u64,
    window_start: Instant,
}

impl DeviceLossState {
    fn new() -> Self {
        Self {
            last_f_cnt: 0,
            total_loss: 0,
            packet_count: 0,
            window_start: Instant::now(),
        }
    }
}

/// Per-device packet-loss accounting from LoRaWAN frame counters.
///
/// Loss for one uplink is the gap the frame counter jumped over; a
/// counter at or below the previous one (device reset, replay) counts
/// as zero loss. The loss rate is emitted once per reporting window and
/// the window counters start over.
pub struct PacketLossEstimator {
    window: Duration,
    devices: Mutex<HashMap<String, DeviceLossState>>,
}

impl PacketLossEstimator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            devices: Mutex::new(HashMap::new()),
        }
    }

    /// Record one uplink for a device.
    ///
    /// Returns the packets lost immediately before this uplink and,
    /// when the reporting window has elapsed, the loss rate for the
    /// window as a percentage rounded to two decimals.
    pub fn process(&self, dev_eui: &str, f_cnt: Option<u64>) -> (u64, Option<f64>) {
        let mut devices = match self.devices.lock() {
            Ok(devices) => devices,
            Err(poisoned) => poisoned.into_inner(),
        };
        let state = devices
            .entry(dev_eui.to_string())
            .or_insert_with(DeviceLossState::new);

        let mut lost = 0;
        if let Some(f_cnt) = f_cnt {
            // First counter seen for this device seeds the baseline
            if state.last_f_cnt == 0 {
                state.last_f_cnt = f_cnt;
            }
            if f_cnt > state.last_f_cnt {
                lost = f_cnt - state.last_f_cnt - 1;
                state.total_loss += lost;
            }
            state.last_f_cnt = f_cnt;
        }
        state.packet_count += 1;

        if state.window_start.elapsed() < self.window {
            return (lost, None);
        }

        let observed = state.packet_count + state.total_loss;
        let rate = if observed > 0 {
            state.total_loss as f64 / observed as f64 * 100.0
        } else {
            0.0
        };
        let rate = (rate * 100.0).round() / 100.0;

        state.total_loss = 0;
        state.packet_count = 0;
        state.window_start = Instant::now();

        (lost, Some(rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hourly() -> PacketLossEstimator {
        PacketLossEstimator::new(Duration::from_secs(3600))
    }

    #[test]
    fn test_first_uplink_reports_no_loss() {
        let estimator = hourly();

        let (lost, rate) = estimator.process("AA11", Some(5));

        assert_eq!(lost, 0);
        assert_eq!(rate, None);
    }

    #[test]
    fn test_counter_gap_counts_skipped_frames() {
        let estimator = hourly();

        estimator.process("AA11", Some(5));
        let (lost, _) = estimator.process("AA11", Some(8));

        assert_eq!(lost, 2);
    }

    #[test]
    fn test_consecutive_counters_report_no_loss() {
        let estimator = hourly();

        estimator.process("AA11", Some(5));
        let (lost, _) = estimator.process("AA11", Some(6));

        assert_eq!(lost, 0);
    }

    #[test]
    fn test_counter_regression_reports_no_loss() {
        let estimator = hourly();

        estimator.process("AA11", Some(10));
        let (lost, _) = estimator.process("AA11", Some(3));

        assert_eq!(lost, 0);

        // Baseline follows the regressed counter
        let (lost, _) = estimator.process("AA11", Some(4));
        assert_eq!(lost, 0);
    }

    #[test]
    fn test_missing_counter_reports_no_loss() {
        let estimator = hourly();

        estimator.process("AA11", Some(5));
        let (lost, rate) = estimator.process("AA11", None);

        assert_eq!(lost, 0);
        assert_eq!(rate, None);
    }

    #[test]
    fn test_devices_are_tracked_independently() {
        let estimator = hourly();

        estimator.process("AA11", Some(5));
        estimator.process("BB22", Some(100));
        let (lost_a, _) = estimator.process("AA11", Some(7));
        let (lost_b, _) = estimator.process("BB22", Some(101));

        assert_eq!(lost_a, 1);
        assert_eq!(lost_b, 0);
    }

    #[test]
    fn test_elapsed_window_emits_rounded_rate_and_resets() {
        // Zero window: every uplink closes a reporting window
        let estimator = PacketLossEstimator::new(Duration::ZERO);

        let (_, rate) = estimator.process("AA11", Some(5));
        assert_eq!(rate, Some(0.0));

        // 2 lost of 3 observed in this window
        let (lost, rate) = estimator.process("AA11", Some(8));
        assert_eq!(lost, 2);
        assert_eq!(rate, Some(66.67));

        // Counters were reset by the previous window close
        let (_, rate) = estimator.process("AA11", Some(9));
        assert_eq!(rate, Some(0.0));
    }
}
