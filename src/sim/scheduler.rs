//! Timed tasks
//!
//! "Wait N seconds, then do X" as data: the round state machine schedules a
//! `TimedAction`, the scheduler hands it back once game time passes its due
//! time. A task may hold presentation handles; they are released by `retire`
//! whether the task completes or is cancelled.

use super::bonkable::EntityHandle;
use super::services::{Presentation, PresentationHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

/// Deferred round step
#[derive(Debug, Clone, PartialEq)]
pub enum TimedAction {
    /// Spawn the entry at `index` of the Populate plan
    SpawnEntity { index: usize },
    /// Populate is done, move on to Aiming
    FinishPopulate,
    PopEntity { entity: EntityHandle },
    AwardPayout,
    CompleteRound,
}

#[derive(Debug, Clone)]
struct ScheduledTask {
    id: TaskId,
    due: f32,
    action: TimedAction,
    held: Vec<PresentationHandle>,
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    now: f32,
    tasks: Vec<ScheduledTask>,
    next_id: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Game time accumulated by `advance`
    pub fn now(&self) -> f32 {
        self.now
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn schedule(&mut self, delay: f32, action: TimedAction) -> TaskId {
        self.schedule_holding(delay, action, Vec::new())
    }

    /// Schedule a task that keeps `held` alive until it retires
    pub fn schedule_holding(
        &mut self,
        delay: f32,
        action: TimedAction,
        held: Vec<PresentationHandle>,
    ) -> TaskId {
        self.next_id += 1;
        let id = TaskId(self.next_id);
        self.tasks.push(ScheduledTask {
            id,
            due: self.now + delay.max(0.0),
            action,
            held,
        });
        id
    }

    /// Advance game time; returns due actions ordered by due time, then by
    /// scheduling order.
    pub fn advance(&mut self, dt: f32, presentation: &mut dyn Presentation) -> Vec<TimedAction> {
        self.now += dt.max(0.0);
        let now = self.now;

        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.tasks.drain(..).partition(|task| task.due <= now);
        self.tasks = pending;

        due.sort_by(|a, b| a.due.total_cmp(&b.due).then(a.id.cmp(&b.id)));
        due.into_iter()
            .map(|task| Self::retire(task, presentation))
            .collect()
    }

    /// Cancel one task, releasing whatever it held
    pub fn cancel(&mut self, id: TaskId, presentation: &mut dyn Presentation) -> bool {
        let Some(index) = self.tasks.iter().position(|task| task.id == id) else {
            return false;
        };
        let task = self.tasks.remove(index);
        let action = Self::retire(task, presentation);
        log::debug!("Cancelled {:?}", action);
        true
    }

    pub fn cancel_all(&mut self, presentation: &mut dyn Presentation) {
        for task in std::mem::take(&mut self.tasks) {
            Self::retire(task, presentation);
        }
    }

    /// Single cleanup path for completion and cancellation
    fn retire(task: ScheduledTask, presentation: &mut dyn Presentation) -> TimedAction {
        for handle in task.held {
            presentation.release(handle);
        }
        task.action
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::services::{Headless, SoundCue};

    #[test]
    fn test_actions_fire_in_due_order() {
        let mut headless = Headless::new();
        let mut scheduler = Scheduler::new();
        scheduler.schedule(0.2, TimedAction::AwardPayout);
        scheduler.schedule(0.1, TimedAction::FinishPopulate);
        scheduler.schedule(0.1, TimedAction::CompleteRound);

        assert!(scheduler.advance(0.05, &mut headless).is_empty());
        assert_eq!(
            scheduler.advance(0.05, &mut headless),
            vec![TimedAction::FinishPopulate, TimedAction::CompleteRound]
        );
        assert_eq!(scheduler.advance(0.5, &mut headless), vec![TimedAction::AwardPayout]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_zero_delay_fires_next_advance() {
        let mut headless = Headless::new();
        let mut scheduler = Scheduler::new();
        scheduler.schedule(0.0, TimedAction::SpawnEntity { index: 0 });
        assert_eq!(
            scheduler.advance(0.0, &mut headless),
            vec![TimedAction::SpawnEntity { index: 0 }]
        );
    }

    #[test]
    fn test_completion_and_cancel_release_held_handles() {
        let mut headless = Headless::new();
        headless.hold_sounds = true;
        let mut scheduler = Scheduler::new();

        let a = headless.play_sound(SoundCue::Pop, None, None).unwrap();
        let b = headless.play_sound(SoundCue::RoundComplete, None, None).unwrap();
        scheduler.schedule_holding(1.0, TimedAction::AwardPayout, vec![a]);
        let cancelled = scheduler.schedule_holding(1.0, TimedAction::CompleteRound, vec![b]);
        assert_eq!(headless.held.len(), 2);

        assert!(scheduler.cancel(cancelled, &mut headless));
        assert!(!headless.held.contains(&b));
        assert!(!scheduler.cancel(cancelled, &mut headless));

        scheduler.advance(1.0, &mut headless);
        assert!(headless.held.is_empty());
    }

    #[test]
    fn test_cancel_all() {
        let mut headless = Headless::new();
        headless.hold_sounds = true;
        let mut scheduler = Scheduler::new();
        let held = headless.play_sound(SoundCue::Payout, None, None).unwrap();
        scheduler.schedule_holding(5.0, TimedAction::AwardPayout, vec![held]);
        scheduler.schedule(6.0, TimedAction::CompleteRound);

        scheduler.cancel_all(&mut headless);
        assert!(scheduler.is_empty());
        assert!(headless.held.is_empty());
    }
}
