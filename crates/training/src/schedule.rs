//! Two-phase encoder schedule for road-map training.

use models::EncoderStage;

/// Starts with the encoder frozen and unfreezes it once, at the first epoch
/// `>= unfreeze_epoch`. The transition never reverses.
#[derive(Debug, Clone)]
pub struct FreezeSchedule {
    stage: EncoderStage,
    unfreeze_epoch: usize,
    transitioned_at: Option<usize>,
}

impl FreezeSchedule {
    pub fn new(unfreeze_epoch: usize) -> Self {
        Self {
            stage: EncoderStage::Frozen,
            unfreeze_epoch,
            transitioned_at: None,
        }
    }

    pub fn stage(&self) -> EncoderStage {
        self.stage
    }

    pub fn unfreeze_epoch(&self) -> usize {
        self.unfreeze_epoch
    }

    /// Epoch at which the encoder was unfrozen, if it has been.
    pub fn transitioned_at(&self) -> Option<usize> {
        self.transitioned_at
    }

    /// Call at the start of every epoch. Returns the new stage when a transition happens.
    pub fn on_epoch_start(&mut self, epoch: usize) -> Option<EncoderStage> {
        if self.stage == EncoderStage::Frozen && epoch >= self.unfreeze_epoch {
            self.stage = EncoderStage::Unfrozen;
            self.transitioned_at = Some(epoch);
            return Some(self.stage);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfreezes_exactly_once() {
        let mut schedule = FreezeSchedule::new(3);
        let transitions: Vec<_> = (0..6)
            .filter_map(|epoch| schedule.on_epoch_start(epoch).map(|s| (epoch, s)))
            .collect();
        assert_eq!(transitions, vec![(3, EncoderStage::Unfrozen)]);
        assert_eq!(schedule.stage(), EncoderStage::Unfrozen);
        assert_eq!(schedule.transitioned_at(), Some(3));
    }

    #[test]
    fn resuming_past_threshold_unfreezes_immediately() {
        let mut schedule = FreezeSchedule::new(30);
        assert_eq!(schedule.on_epoch_start(42), Some(EncoderStage::Unfrozen));
        assert_eq!(schedule.on_epoch_start(43), None);
        assert_eq!(schedule.transitioned_at(), Some(42));
    }

    #[test]
    fn stays_frozen_before_threshold() {
        let mut schedule = FreezeSchedule::new(30);
        for epoch in 0..30 {
            assert_eq!(schedule.on_epoch_start(epoch), None);
        }
        assert_eq!(schedule.stage(), EncoderStage::Frozen);
        assert_eq!(schedule.transitioned_at(), None);
    }

    #[test]
    fn zero_threshold_trains_encoder_from_the_start() {
        let mut schedule = FreezeSchedule::new(0);
        assert_eq!(schedule.on_epoch_start(0), Some(EncoderStage::Unfrozen));
    }
}
