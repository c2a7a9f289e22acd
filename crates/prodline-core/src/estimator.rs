//! Sensor-edge conveyor level estimator.
//!
//! A controller in the field cannot read bin contents directly; it only sees
//! the proximity sensors. This estimator mimics what such a controller could
//! reconstruct: a predict step integrating the net machine flow, and an
//! update step that snaps the estimate to the known product count at a tap
//! position whenever that tap's boolean reading flips between ticks.
//!
//! Read-only: estimates never feed back into the physical state.

use crate::config::LineConfig;
use crate::conveyor::Conveyor;
use crate::fixed::{Fixed64, SimTime};

/// Per-conveyor level estimates driven by sensor transitions.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LevelEstimator {
    estimates: Vec<Fixed64>,
    infeed_offset_primary: usize,
    infeed_offset_secondary: usize,
    discharge_index_primary: usize,
    discharge_index_secondary: usize,
    infeed_threshold_primary: Fixed64,
    infeed_threshold_secondary: Fixed64,
    discharge_threshold_primary: Fixed64,
    discharge_threshold_secondary: Fixed64,
    /// Known total product on the belt when each tap sits exactly at its
    /// threshold; the snap values of the update step.
    products_at_infeed_primary: Fixed64,
    products_at_infeed_secondary: Fixed64,
    products_at_discharge_primary: Fixed64,
    products_at_discharge_secondary: Fixed64,
}

impl LevelEstimator {
    pub fn new(config: &LineConfig, conveyor_count: usize) -> Self {
        let cap = config.bin_capacity;
        let bins = config.bin_count;
        // An infeed tap at offset k from the draw end reads its threshold
        // when the k-1 draw-end bins below it are full; a discharge tap at
        // index j from the receiving end reads its threshold when the
        // bins - j - 1 bins beyond it are full.
        let products_at_infeed_primary = Fixed64::from_num((config.infeed_offset_primary - 1) as i64)
            * cap
            + config.infeed_threshold_primary;
        let products_at_infeed_secondary =
            Fixed64::from_num((config.infeed_offset_secondary - 1) as i64) * cap
                + config.infeed_threshold_secondary;
        let products_at_discharge_primary =
            Fixed64::from_num((bins - config.discharge_index_primary - 1) as i64) * cap
                + config.discharge_threshold_primary;
        let products_at_discharge_secondary =
            Fixed64::from_num((bins - config.discharge_index_secondary - 1) as i64) * cap
                + config.discharge_threshold_secondary;

        Self {
            estimates: vec![
                config.initial_bin_level * Fixed64::from_num(bins as i64);
                conveyor_count
            ],
            infeed_offset_primary: config.infeed_offset_primary,
            infeed_offset_secondary: config.infeed_offset_secondary,
            discharge_index_primary: config.discharge_index_primary,
            discharge_index_secondary: config.discharge_index_secondary,
            infeed_threshold_primary: config.infeed_threshold_primary,
            infeed_threshold_secondary: config.infeed_threshold_secondary,
            discharge_threshold_primary: config.discharge_threshold_primary,
            discharge_threshold_secondary: config.discharge_threshold_secondary,
            products_at_infeed_primary,
            products_at_infeed_secondary,
            products_at_discharge_primary,
            products_at_discharge_secondary,
        }
    }

    pub fn estimates(&self) -> &[Fixed64] {
        &self.estimates
    }

    /// Advance one conveyor's estimate by one tick. `feeder_speed` and
    /// `drainer_speed` are the actual speeds of the machines at its ends.
    pub fn refresh(
        &mut self,
        index: usize,
        conveyor: &Conveyor,
        feeder_speed: Fixed64,
        drainer_speed: Fixed64,
        dt: SimTime,
    ) {
        // Predict: integrate the net flow.
        let mut estimate = self.estimates[index] + (feeder_speed - drainer_speed) * dt;

        // Update: a tap whose reading flipped since the previous tick pins
        // the belt total at that tap's known product count. Primary infeed
        // wins over secondary, infeed over discharge.
        if conveyor.infeed_empty(self.infeed_offset_primary, self.infeed_threshold_primary)
            != conveyor
                .previous_infeed_empty(self.infeed_offset_primary, self.infeed_threshold_primary)
        {
            estimate = self.products_at_infeed_primary;
        } else if conveyor.infeed_empty(self.infeed_offset_secondary, self.infeed_threshold_secondary)
            != conveyor
                .previous_infeed_empty(self.infeed_offset_secondary, self.infeed_threshold_secondary)
        {
            estimate = self.products_at_infeed_secondary;
        } else if conveyor
            .discharge_full(self.discharge_index_primary, self.discharge_threshold_primary)
            != conveyor.previous_discharge_full(
                self.discharge_index_primary,
                self.discharge_threshold_primary,
            )
        {
            estimate = self.products_at_discharge_primary;
        } else if conveyor
            .discharge_full(self.discharge_index_secondary, self.discharge_threshold_secondary)
            != conveyor.previous_discharge_full(
                self.discharge_index_secondary,
                self.discharge_threshold_secondary,
            )
        {
            estimate = self.products_at_discharge_secondary;
        }

        self.estimates[index] = estimate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LineConfig;

    fn fx(v: i64) -> Fixed64 {
        Fixed64::from_num(v)
    }

    #[test]
    fn snap_constants_from_default_config() {
        let estimator = LevelEstimator::new(&LineConfig::default(), 5);
        assert_eq!(estimator.products_at_infeed_primary, fx(50));
        assert_eq!(estimator.products_at_infeed_secondary, fx(350));
        assert_eq!(estimator.products_at_discharge_primary, fx(950));
        assert_eq!(estimator.products_at_discharge_secondary, fx(650));
    }

    #[test]
    fn predict_integrates_net_flow() {
        let config = LineConfig::default();
        let mut estimator = LevelEstimator::new(&config, 1);
        let mut conveyor = Conveyor::new(&config);
        // No sensor flip: current equals previous.
        conveyor.snapshot_previous();

        estimator.refresh(0, &conveyor, fx(110), fx(50), SimTime::from_num(1));
        assert_eq!(estimator.estimates()[0], fx(660));
    }

    #[test]
    fn sensor_flip_snaps_estimate() {
        let config = LineConfig::default();
        let mut estimator = LevelEstimator::new(&config, 1);
        let mut conveyor = Conveyor::new(&config);
        conveyor.snapshot_previous();
        // Drain the belt below the primary infeed threshold: tap flips from
        // "not empty" to "empty".
        conveyor.pack(fx(40));

        estimator.refresh(0, &conveyor, fx(0), fx(0), SimTime::from_num(1));
        assert_eq!(estimator.estimates()[0], fx(50));
    }
}
