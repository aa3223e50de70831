use serde::{Deserialize, Serialize};

use crate::telemetry::TelemetryRecord;

/// Mission milestones in flight order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MissionStage {
    Launched = 0,
    TargetAltitudeReached = 1,
    ParachuteReleased = 2,
    InstrumentReleased = 3,
}

impl MissionStage {
    /// All stages in ascending rank.
    pub const ALL: [MissionStage; 4] = [
        MissionStage::Launched,
        MissionStage::TargetAltitudeReached,
        MissionStage::ParachuteReleased,
        MissionStage::InstrumentReleased,
    ];

    pub fn rank(self) -> usize {
        self as usize
    }

    /// Reads the flag for this stage from a record.
    pub fn is_flagged(self, record: &TelemetryRecord) -> bool {
        match self {
            MissionStage::Launched => record.launched,
            MissionStage::TargetAltitudeReached => record.target_altitude_reached,
            MissionStage::ParachuteReleased => record.parachute_released,
            MissionStage::InstrumentReleased => record.instrument_released,
        }
    }
}

/// Tracks which mission stages have been seen during a session.
///
/// Every stage is an independent latch: it activates the first time a record carries its
/// flag and stays active for the life of the tracker. Re-delivering a record never
/// activates a stage twice. Later stages do not imply earlier ones.
#[derive(Debug, Default, Clone)]
pub struct MissionStageTracker {
    activated: [bool; 4],
}

impl MissionStageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latches every stage flagged in `record`.
    ///
    /// # Returns
    ///
    /// - `Vec<MissionStage>` - Stages that became active with this record, in rank order.
    pub fn update(&mut self, record: &TelemetryRecord) -> Vec<MissionStage> {
        let mut newly_active = Vec::new();
        for stage in MissionStage::ALL {
            let latched = &mut self.activated[stage.rank()];
            if stage.is_flagged(record) && !*latched {
                *latched = true;
                newly_active.push(stage);
            }
        }
        newly_active
    }

    pub fn is_active(&self, stage: MissionStage) -> bool {
        self.activated[stage.rank()]
    }

    /// Stages active so far, in rank order.
    pub fn active_stages(&self) -> Vec<MissionStage> {
        MissionStage::ALL
            .into_iter()
            .filter(|&stage| self.is_active(stage))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::decode_positional;

    fn record(flags: [u8; 4]) -> TelemetryRecord {
        decode_positional(&format!(
            "S0,0,10,1013,0,0,0,20,{},{},{},{}",
            flags[0], flags[1], flags[2], flags[3]
        ))
        .unwrap()
    }

    #[test]
    fn test_stage_fires_once() {
        let mut tracker = MissionStageTracker::new();
        let launched = record([1, 0, 0, 0]);

        assert_eq!(tracker.update(&launched), vec![MissionStage::Launched]);
        assert!(tracker.update(&launched).is_empty());
        assert!(tracker.is_active(MissionStage::Launched));
    }

    #[test]
    fn test_stages_progress_in_flight_order() {
        let mut tracker = MissionStageTracker::new();
        assert!(tracker.update(&record([0, 0, 0, 0])).is_empty());
        assert_eq!(tracker.update(&record([1, 0, 0, 0])), vec![MissionStage::Launched]);
        assert_eq!(
            tracker.update(&record([1, 1, 0, 0])),
            vec![MissionStage::TargetAltitudeReached]
        );
        assert_eq!(
            tracker.update(&record([1, 1, 1, 1])),
            vec![
                MissionStage::ParachuteReleased,
                MissionStage::InstrumentReleased
            ]
        );
        assert_eq!(tracker.active_stages(), MissionStage::ALL.to_vec());
    }

    #[test]
    fn test_later_stage_does_not_imply_earlier() {
        let mut tracker = MissionStageTracker::new();
        assert_eq!(
            tracker.update(&record([0, 0, 1, 0])),
            vec![MissionStage::ParachuteReleased]
        );
        assert!(!tracker.is_active(MissionStage::Launched));
        assert_eq!(tracker.active_stages(), vec![MissionStage::ParachuteReleased]);
    }

    #[test]
    fn test_cleared_flag_does_not_reset_stage() {
        let mut tracker = MissionStageTracker::new();
        tracker.update(&record([1, 0, 0, 0]));
        assert!(tracker.update(&record([0, 0, 0, 0])).is_empty());
        assert!(tracker.is_active(MissionStage::Launched));
        assert!(tracker.update(&record([1, 0, 0, 0])).is_empty());
    }

    #[test]
    fn test_rank_order() {
        assert!(MissionStage::Launched < MissionStage::InstrumentReleased);
        assert_eq!(MissionStage::ParachuteReleased.rank(), 2);
    }
}
