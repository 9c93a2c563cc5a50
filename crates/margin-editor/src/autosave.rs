//! Autosave coordinator.
//!
//! Pure state machine driving one editor session's saves:
//!
//! ```text
//! Idle ──edit──▶ Dirty ──deadline──▶ Saving ──done──▶ Idle
//!                 │ ▲                  │  ▲
//!                 └─┘ edit (reset)     │  └── done with `again`: save latest
//!                                      └── edit: set `again`
//! ```
//!
//! The coordinator never touches the network or the clock. Callers feed it
//! instants and serialisations and carry out the returned [`Action`].

use std::time::Duration;

use tokio::time::Instant;

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    /// Waiting for the debounce window that ends at `deadline`.
    Dirty { deadline: Instant },
    /// A save is in flight. `again` requests a follow-up save on completion.
    Saving { again: bool },
}

/// What the caller must do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    /// Arm (or re-arm) the debounce timer.
    Schedule(Instant),
    /// Start saving this serialisation.
    Save(String),
}

/// Summary of the save state exposed to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    /// Everything acknowledged.
    Saved,
    /// Edits waiting for the debounce window.
    Pending,
    Saving,
    /// The last save failed; local edits are not persisted yet.
    Unsaved,
}

#[derive(Debug)]
pub struct AutosaveCoordinator {
    state: SaveState,
    debounce: Duration,
    last_persisted: String,
    in_flight: Option<String>,
    last_failed: bool,
}

impl AutosaveCoordinator {
    /// `persisted` is the serialisation the store currently holds.
    pub fn new(debounce: Duration, persisted: impl Into<String>) -> Self {
        Self {
            state: SaveState::Idle,
            debounce,
            last_persisted: persisted.into(),
            in_flight: None,
            last_failed: false,
        }
    }

    pub fn state(&self) -> SaveState {
        self.state
    }

    pub fn last_persisted(&self) -> &str {
        &self.last_persisted
    }

    pub fn status(&self) -> SaveStatus {
        match self.state {
            SaveState::Dirty { .. } => SaveStatus::Pending,
            SaveState::Saving { .. } => SaveStatus::Saving,
            SaveState::Idle if self.last_failed => SaveStatus::Unsaved,
            SaveState::Idle => SaveStatus::Saved,
        }
    }

    /// The tree changed at `now`.
    pub fn on_edit(&mut self, now: Instant) -> Action {
        match self.state {
            SaveState::Idle | SaveState::Dirty { .. } => {
                let deadline = now + self.debounce;
                self.state = SaveState::Dirty { deadline };
                Action::Schedule(deadline)
            }
            SaveState::Saving { .. } => {
                self.state = SaveState::Saving { again: true };
                Action::None
            }
        }
    }

    /// The debounce timer fired at `now`. Stale timers re-arm.
    pub fn on_deadline(&mut self, now: Instant, latest: impl FnOnce() -> String) -> Action {
        match self.state {
            SaveState::Dirty { deadline } if now >= deadline => self.begin_save(latest()),
            SaveState::Dirty { deadline } => Action::Schedule(deadline),
            _ => Action::None,
        }
    }

    /// Save now, skipping the debounce window. During a save the request
    /// becomes a follow-up.
    pub fn flush(&mut self, latest: impl FnOnce() -> String) -> Action {
        match self.state {
            SaveState::Saving { .. } => {
                self.state = SaveState::Saving { again: true };
                Action::None
            }
            SaveState::Idle | SaveState::Dirty { .. } => self.begin_save(latest()),
        }
    }

    /// The in-flight save finished. On failure `last_persisted` is kept so
    /// the next attempt carries the full latest state.
    pub fn on_save_complete(&mut self, ok: bool, latest: impl FnOnce() -> String) -> Action {
        let SaveState::Saving { again } = self.state else {
            return Action::None;
        };
        let saved = self.in_flight.take();
        if ok {
            if let Some(saved) = saved {
                self.last_persisted = saved;
            }
            self.last_failed = false;
        } else {
            self.last_failed = true;
        }

        if again {
            self.begin_save(latest())
        } else {
            self.state = SaveState::Idle;
            Action::None
        }
    }

    /// Whether the session has a save in flight or queued.
    pub fn is_busy(&self) -> bool {
        !matches!(self.state, SaveState::Idle)
    }

    fn begin_save(&mut self, serialization: String) -> Action {
        if serialization == self.last_persisted {
            self.state = SaveState::Idle;
            self.last_failed = false;
            return Action::None;
        }
        self.state = SaveState::Saving { again: false };
        self.in_flight = Some(serialization.clone());
        Action::Save(serialization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEBOUNCE: Duration = Duration::from_millis(500);

    fn coordinator() -> (AutosaveCoordinator, Instant) {
        (AutosaveCoordinator::new(DEBOUNCE, "<p></p>"), Instant::now())
    }

    #[test]
    fn test_edit_schedules_deadline() {
        let (mut c, t0) = coordinator();
        assert_eq!(c.on_edit(t0), Action::Schedule(t0 + DEBOUNCE));
        assert_eq!(c.status(), SaveStatus::Pending);
    }

    #[test]
    fn test_edits_reset_window_and_coalesce() {
        let (mut c, t0) = coordinator();
        c.on_edit(t0);
        let t1 = t0 + Duration::from_millis(100);
        assert_eq!(c.on_edit(t1), Action::Schedule(t1 + DEBOUNCE));

        // The first timer is stale and re-arms.
        assert_eq!(
            c.on_deadline(t0 + DEBOUNCE, || "<p>HelloWorld</p>".into()),
            Action::Schedule(t1 + DEBOUNCE)
        );
        assert_eq!(
            c.on_deadline(t1 + DEBOUNCE, || "<p>HelloWorld</p>".into()),
            Action::Save("<p>HelloWorld</p>".into())
        );
        assert_eq!(c.state(), SaveState::Saving { again: false });
    }

    #[test]
    fn test_identical_serialization_skipped() {
        let (mut c, t0) = coordinator();
        c.on_edit(t0);
        assert_eq!(c.on_deadline(t0 + DEBOUNCE, || "<p></p>".into()), Action::None);
        assert_eq!(c.state(), SaveState::Idle);
        assert_eq!(c.status(), SaveStatus::Saved);
    }

    #[test]
    fn test_edit_during_save_triggers_one_follow_up() {
        let (mut c, t0) = coordinator();
        c.on_edit(t0);
        c.on_deadline(t0 + DEBOUNCE, || "<p>a</p>".into());

        let mid = t0 + Duration::from_millis(600);
        assert_eq!(c.on_edit(mid), Action::None);
        assert_eq!(c.on_edit(mid), Action::None);
        assert_eq!(c.state(), SaveState::Saving { again: true });

        assert_eq!(
            c.on_save_complete(true, || "<p>ab</p>".into()),
            Action::Save("<p>ab</p>".into())
        );
        assert_eq!(c.last_persisted(), "<p>a</p>");

        assert_eq!(c.on_save_complete(true, || "<p>ab</p>".into()), Action::None);
        assert_eq!(c.last_persisted(), "<p>ab</p>");
        assert_eq!(c.state(), SaveState::Idle);
    }

    #[test]
    fn test_failure_keeps_last_persisted() {
        let (mut c, t0) = coordinator();
        c.on_edit(t0);
        c.on_deadline(t0 + DEBOUNCE, || "<p>a</p>".into());
        assert_eq!(c.on_save_complete(false, || "<p>a</p>".into()), Action::None);
        assert_eq!(c.last_persisted(), "<p></p>");
        assert_eq!(c.status(), SaveStatus::Unsaved);

        // The next edit retries with the full latest state.
        let t1 = t0 + Duration::from_secs(2);
        c.on_edit(t1);
        assert_eq!(
            c.on_deadline(t1 + DEBOUNCE, || "<p>ab</p>".into()),
            Action::Save("<p>ab</p>".into())
        );
    }

    #[test]
    fn test_flush_skips_debounce() {
        let (mut c, t0) = coordinator();
        c.on_edit(t0);
        assert_eq!(c.flush(|| "<p>x</p>".into()), Action::Save("<p>x</p>".into()));
        assert_eq!(c.flush(|| "<p>x</p>".into()), Action::None);
        assert_eq!(c.state(), SaveState::Saving { again: true });
    }

    #[test]
    fn test_flush_when_clean_is_noop() {
        let (mut c, _) = coordinator();
        assert_eq!(c.flush(|| "<p></p>".into()), Action::None);
        assert!(!c.is_busy());
    }

    #[test]
    fn test_completion_without_save_ignored() {
        let (mut c, _) = coordinator();
        assert_eq!(c.on_save_complete(true, || unreachable!()), Action::None);
    }
}
