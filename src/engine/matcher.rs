//! Binds a tick's observations to slots by track id.

use std::collections::HashSet;

use super::slot::SlotPool;
use crate::error::CaptureError;
use crate::target::Observation;

/// One observation bound to one slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Binding {
    pub slot: usize,
    /// Index into the tick's observation list.
    pub observation: usize,
    /// The slot was claimed for this track during this tick.
    pub allocated: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resolution {
    pub bindings: Vec<Binding>,
    /// One `PoolExhausted` per track that found no alive slot and no idle
    /// one to claim.
    pub dropped: Vec<CaptureError>,
}

impl Resolution {
    /// Per-slot flag: was the slot bound this tick?
    pub fn matched(&self, pool_len: usize) -> Vec<bool> {
        let mut matched = vec![false; pool_len];
        for binding in &self.bindings {
            if let Some(flag) = matched.get_mut(binding.slot) {
                *flag = true;
            }
        }
        matched
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MatchResolver;

impl MatchResolver {
    /// Walk `observations` in order. Observations without a quality are
    /// treated as absent. A track id seen twice in one tick keeps only its
    /// first observation.
    pub fn resolve<M>(
        &self,
        pool: &mut SlotPool<M>,
        observations: &[Observation<M>],
        now: u64,
    ) -> Resolution {
        let mut resolution = Resolution::default();
        let mut bound = HashSet::new();

        for (observation, obs) in observations.iter().enumerate() {
            if obs.quality.is_none() {
                continue;
            }
            if let Some(slot) = pool.find(obs.track_id) {
                if !bound.insert(slot) {
                    log::debug!(
                        "track {} observed more than once in tick {}, keeping the first",
                        obs.track_id,
                        now
                    );
                    continue;
                }
                resolution.bindings.push(Binding {
                    slot,
                    observation,
                    allocated: false,
                });
                continue;
            }
            match pool.allocate(obs.track_id, now) {
                Some(slot) => {
                    bound.insert(slot);
                    resolution.bindings.push(Binding {
                        slot,
                        observation,
                        allocated: true,
                    });
                }
                None => {
                    let err = CaptureError::PoolExhausted {
                        track_id: obs.track_id,
                    };
                    log::warn!("{} (pool size {})", err, pool.len());
                    resolution.dropped.push(err);
                }
            }
        }
        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::BBox;

    fn obs(track_id: u64, quality: Option<f32>) -> Observation<()> {
        Observation::new(track_id, BBox::new(0.0, 0.0, 4.0, 4.0), quality, ())
    }

    #[test]
    fn new_tracks_claim_slots_and_known_tracks_rebind() {
        let mut pool: SlotPool<()> = SlotPool::new(3, 1024);
        let first = MatchResolver.resolve(&mut pool, &[obs(7, Some(0.5)), obs(8, Some(0.5))], 0);
        assert_eq!(first.bindings.len(), 2);
        assert!(first.bindings.iter().all(|b| b.allocated));

        let second = MatchResolver.resolve(&mut pool, &[obs(8, Some(0.5))], 1);
        assert_eq!(
            second.bindings,
            vec![Binding {
                slot: 1,
                observation: 0,
                allocated: false
            }]
        );
        assert_eq!(second.matched(3), vec![false, true, false]);
    }

    #[test]
    fn unscored_observations_are_absent() {
        let mut pool: SlotPool<()> = SlotPool::new(1, 1024);
        let resolution = MatchResolver.resolve(&mut pool, &[obs(1, None)], 0);
        assert!(resolution.bindings.is_empty());
        assert_eq!(pool.find(1), None);
    }

    #[test]
    fn duplicate_track_binds_once() {
        let mut pool: SlotPool<()> = SlotPool::new(2, 1024);
        let resolution =
            MatchResolver.resolve(&mut pool, &[obs(5, Some(0.4)), obs(5, Some(0.9))], 0);
        assert_eq!(resolution.bindings.len(), 1);
        assert_eq!(resolution.bindings[0].observation, 0);
        assert_eq!(pool.iter().filter(|s| s.track_id() == 5).count(), 1);
    }

    #[test]
    fn exhausted_pool_drops_new_tracks() {
        let mut pool: SlotPool<()> = SlotPool::new(1, 1024);
        let resolution =
            MatchResolver.resolve(&mut pool, &[obs(1, Some(0.4)), obs(2, Some(0.9))], 0);
        assert_eq!(resolution.bindings.len(), 1);
        assert_eq!(
            resolution.dropped,
            vec![CaptureError::PoolExhausted { track_id: 2 }]
        );
        assert_eq!(resolution.dropped[0].code(), "CAPTURE_POOL_EXHAUSTED");
    }

    #[test]
    fn known_track_still_rebinds_when_pool_is_full() {
        let mut pool: SlotPool<()> = SlotPool::new(1, 1024);
        MatchResolver.resolve(&mut pool, &[obs(1, Some(0.4))], 0);
        let resolution =
            MatchResolver.resolve(&mut pool, &[obs(2, Some(0.9)), obs(1, Some(0.5))], 1);
        assert_eq!(resolution.bindings.len(), 1);
        assert_eq!(resolution.bindings[0].observation, 1);
        assert!(resolution.dropped.iter().all(CaptureError::is_recoverable));
    }
}
