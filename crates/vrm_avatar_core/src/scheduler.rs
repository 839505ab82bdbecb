use std::time::Duration;

use bevy::{
    platform::collections::HashMap,
    time::{Timer, TimerMode},
};

use crate::id::InstanceId;

/// Named timer slots of an avatar. Scheduling into a slot replaces what was there.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerSlot {
    /// Next idle scheduler tick
    Idle,
    /// End of the idle gesture currently playing
    IdleComplete,
    /// Next step of the running sequence
    Sequence,
    /// Fade out of the running sequence step
    SequenceFadeOut,
    /// Return to the default motion after a one-shot motion
    MotionFallback,
}

#[derive(Clone, Debug)]
struct Pending<E> {
    timer: Timer,
    owner: InstanceId,
    event: E,
}

/// A timer that went off, tagged with the avatar instance that scheduled it
#[derive(Clone, Debug, PartialEq)]
pub struct Fired<E> {
    pub slot: TimerSlot,
    pub owner: InstanceId,
    pub event: E,
}

/// One-shot timers of one avatar, driven by frame time.
#[derive(Clone, Debug)]
pub struct Scheduler<E> {
    owner: InstanceId,
    slots: HashMap<TimerSlot, Pending<E>>,
    now: f32,
}

impl<E> Scheduler<E> {
    pub fn new(owner: InstanceId) -> Self {
        Self {
            owner,
            slots: HashMap::new(),
            now: 0.,
        }
    }

    pub fn owner(&self) -> InstanceId {
        self.owner
    }

    /// Seconds since the scheduler was created
    pub fn now(&self) -> f32 {
        self.now
    }

    pub fn schedule(&mut self, slot: TimerSlot, secs: f32, event: E) {
        self.slots.insert(
            slot,
            Pending {
                timer: Timer::from_seconds(secs.max(0.), TimerMode::Once),
                owner: self.owner,
                event,
            },
        );
    }

    pub fn cancel(&mut self, slot: TimerSlot) -> Option<E> {
        self.slots.remove(&slot).map(|pending| pending.event)
    }

    pub fn cancel_all(&mut self) {
        self.slots.clear();
    }

    pub fn is_pending(&self, slot: TimerSlot) -> bool {
        self.slots.contains_key(&slot)
    }

    pub fn remaining(&self, slot: TimerSlot) -> Option<f32> {
        self.slots
            .get(&slot)
            .map(|pending| pending.timer.remaining_secs())
    }

    pub fn event(&self, slot: TimerSlot) -> Option<&E> {
        self.slots.get(&slot).map(|pending| &pending.event)
    }

    /// Ticks every timer and removes the ones that finished, returned in slot order
    pub fn advance(&mut self, delta: f32) -> Vec<Fired<E>> {
        self.now += delta;
        let delta = Duration::from_secs_f32(delta.max(0.));

        let mut finished: Vec<TimerSlot> = self
            .slots
            .iter_mut()
            .filter_map(|(slot, pending)| pending.timer.tick(delta).is_finished().then_some(*slot))
            .collect();
        finished.sort();

        finished
            .into_iter()
            .filter_map(|slot| {
                self.slots.remove(&slot).map(|pending| Fired {
                    slot,
                    owner: pending.owner,
                    event: pending.event,
                })
            })
            .collect()
    }
}
