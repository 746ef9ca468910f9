//! Polling lifecycle for a report whose run may still be in progress
//!
//! ```text
//! Initial --start--> Polling --cycle done, running--> Idle --timer--> Polling
//!                       |                                |
//!                       +--cycle done, finished--+       +--stop--> Stopped (final cycle)
//!                                                v
//!                                             Stopped
//! ```
//!
//! One cycle fetches both documents. The next cycle is scheduled only after
//! both halves of the current one have completed, so cycles never overlap.

use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Longer intervals are clamped to this
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Initial,
    /// A fetch cycle is in flight
    Polling,
    /// Waiting for the scheduled next cycle
    Idle,
    Stopped,
}

/// What the controller asks its host to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollCommand {
    /// Fetch `summary.json` and `annotations.json`
    FetchCycle,
    Schedule(Duration),
    CancelScheduled,
    /// The run has completed; drop the running indicator
    RunFinished,
    /// Polling has ended; hide the stop control
    HideStopControl,
}

#[derive(Debug, Default, Clone, Copy)]
struct Cycle {
    summary_done: bool,
    annotations_done: bool,
}

#[derive(Debug, Clone)]
pub struct PollingController {
    state: PollState,
    interval: Duration,
    cycle: Option<Cycle>,
    /// Last run status seen in a successfully parsed annotations document
    running: Option<bool>,
    cycles_started: u64,
}

impl Default for PollingController {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl PollingController {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: PollState::Initial,
            interval: interval.min(MAX_POLL_INTERVAL),
            cycle: None,
            running: None,
            cycles_started: 0,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn cycle_in_flight(&self) -> bool {
        self.cycle.is_some()
    }

    /// Run status as last reported; unknown counts as running
    pub fn is_running(&self) -> bool {
        self.running.unwrap_or(true)
    }

    pub fn is_polling(&self) -> bool {
        matches!(self.state, PollState::Polling | PollState::Idle)
    }

    pub fn cycles_started(&self) -> u64 {
        self.cycles_started
    }

    fn begin_cycle(&mut self) -> PollCommand {
        self.cycle = Some(Cycle::default());
        self.cycles_started += 1;
        PollCommand::FetchCycle
    }

    /// Page load: issue the first cycle
    pub fn start(&mut self) -> Vec<PollCommand> {
        if self.state != PollState::Initial {
            return vec![];
        }
        self.state = PollState::Polling;
        vec![self.begin_cycle()]
    }

    /// The scheduled delay elapsed
    pub fn timer_fired(&mut self) -> Vec<PollCommand> {
        if self.state != PollState::Idle {
            tracing::debug!(state = ?self.state, "ignoring stale poll timer");
            return vec![];
        }
        self.state = PollState::Polling;
        vec![self.begin_cycle()]
    }

    /// Summary half of the current cycle has been ingested (or failed)
    pub fn summary_done(&mut self) -> Vec<PollCommand> {
        match self.cycle.as_mut() {
            Some(cycle) => cycle.summary_done = true,
            None => return vec![],
        }
        self.maybe_finish_cycle()
    }

    /// Annotations half of the current cycle completed. `running` is `None`
    /// when the document could not be fetched or parsed.
    pub fn annotations_done(&mut self, running: Option<bool>) -> Vec<PollCommand> {
        match self.cycle.as_mut() {
            Some(cycle) => cycle.annotations_done = true,
            None => return vec![],
        }
        if running.is_some() {
            self.running = running;
        }
        self.maybe_finish_cycle()
    }

    fn maybe_finish_cycle(&mut self) -> Vec<PollCommand> {
        match self.cycle {
            Some(c) if c.summary_done && c.annotations_done => self.cycle = None,
            _ => return vec![],
        }

        if !self.is_running() {
            let was_polling = self.is_polling();
            self.state = PollState::Stopped;
            tracing::info!("run finished, polling stopped");
            let mut commands = vec![PollCommand::RunFinished];
            if was_polling {
                commands.push(PollCommand::HideStopControl);
            }
            return commands;
        }

        match self.state {
            PollState::Polling => {
                self.state = PollState::Idle;
                vec![PollCommand::Schedule(self.interval)]
            }
            // final cycle after a user stop
            _ => vec![],
        }
    }

    /// Leave the poll loop without another fetch; used when the host only
    /// ever runs one cycle. The last run status is kept.
    pub fn halt(&mut self) {
        if self.state != PollState::Stopped {
            tracing::debug!(state = ?self.state, "polling halted");
        }
        self.state = PollState::Stopped;
        self.cycle = None;
    }

    /// User asked to stop polling. Any scheduled cycle is cancelled; one
    /// final fetch still happens so the page shows the latest state.
    pub fn stop(&mut self) -> Vec<PollCommand> {
        match self.state {
            PollState::Stopped => vec![],
            PollState::Initial => {
                self.state = PollState::Stopped;
                vec![PollCommand::HideStopControl]
            }
            PollState::Polling => {
                // the in-flight cycle is the final fetch
                self.state = PollState::Stopped;
                vec![PollCommand::HideStopControl]
            }
            PollState::Idle => {
                self.state = PollState::Stopped;
                vec![
                    PollCommand::CancelScheduled,
                    PollCommand::HideStopControl,
                    self.begin_cycle(),
                ]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_cycle(ctl: &mut PollingController, running: Option<bool>) -> Vec<PollCommand> {
        let mut out = ctl.summary_done();
        out.extend(ctl.annotations_done(running));
        out
    }

    #[test]
    fn test_start_issues_one_cycle() {
        let mut ctl = PollingController::default();
        assert_eq!(ctl.state(), PollState::Initial);
        assert_eq!(ctl.start(), vec![PollCommand::FetchCycle]);
        assert_eq!(ctl.state(), PollState::Polling);
        assert!(ctl.start().is_empty());
        assert_eq!(ctl.cycles_started(), 1);
    }

    #[test]
    fn test_running_run_schedules_next_cycle() {
        let mut ctl = PollingController::new(Duration::from_secs(5));
        ctl.start();
        assert_eq!(
            run_cycle(&mut ctl, Some(true)),
            vec![PollCommand::Schedule(Duration::from_secs(5))]
        );
        assert_eq!(ctl.state(), PollState::Idle);
        assert_eq!(ctl.timer_fired(), vec![PollCommand::FetchCycle]);
        assert_eq!(ctl.state(), PollState::Polling);
    }

    #[test]
    fn test_decision_waits_for_both_halves_in_any_order() {
        let mut ctl = PollingController::default();
        ctl.start();
        assert!(ctl.annotations_done(Some(true)).is_empty());
        assert_eq!(ctl.state(), PollState::Polling);
        assert_eq!(
            ctl.summary_done(),
            vec![PollCommand::Schedule(DEFAULT_POLL_INTERVAL)]
        );
    }

    #[test]
    fn test_finished_run_stops() {
        let mut ctl = PollingController::default();
        ctl.start();
        assert_eq!(
            run_cycle(&mut ctl, Some(false)),
            vec![PollCommand::RunFinished, PollCommand::HideStopControl]
        );
        assert_eq!(ctl.state(), PollState::Stopped);
        assert!(ctl.timer_fired().is_empty());
        assert!(!ctl.is_running());
    }

    #[test]
    fn test_finished_run_after_polling_for_a_while() {
        let mut ctl = PollingController::default();
        ctl.start();
        run_cycle(&mut ctl, Some(true));
        ctl.timer_fired();
        run_cycle(&mut ctl, Some(true));
        ctl.timer_fired();
        let out = run_cycle(&mut ctl, Some(false));
        assert!(out.contains(&PollCommand::RunFinished));
        assert!(!out.iter().any(|c| matches!(c, PollCommand::Schedule(_))));
        assert_eq!(ctl.cycles_started(), 3);
    }

    #[test]
    fn test_user_stop_while_idle_cancels_and_fetches_once() {
        let mut ctl = PollingController::default();
        ctl.start();
        run_cycle(&mut ctl, Some(true));
        assert_eq!(
            ctl.stop(),
            vec![
                PollCommand::CancelScheduled,
                PollCommand::HideStopControl,
                PollCommand::FetchCycle
            ]
        );
        assert_eq!(ctl.state(), PollState::Stopped);
        // final cycle completes without rescheduling
        assert!(run_cycle(&mut ctl, Some(true)).is_empty());
        assert!(ctl.timer_fired().is_empty());
        assert!(ctl.stop().is_empty());
    }

    #[test]
    fn test_user_stop_while_cycle_in_flight() {
        let mut ctl = PollingController::default();
        ctl.start();
        assert_eq!(ctl.stop(), vec![PollCommand::HideStopControl]);
        assert!(ctl.cycle_in_flight());
        assert!(run_cycle(&mut ctl, Some(true)).is_empty());
        assert!(!ctl.cycle_in_flight());
        assert_eq!(ctl.cycles_started(), 1);
    }

    #[test]
    fn test_run_finishing_after_user_stop_reports_finish() {
        let mut ctl = PollingController::default();
        ctl.start();
        run_cycle(&mut ctl, Some(true));
        ctl.stop();
        assert_eq!(run_cycle(&mut ctl, Some(false)), vec![PollCommand::RunFinished]);
    }

    #[test]
    fn test_failed_annotations_keep_last_status() {
        let mut ctl = PollingController::default();
        ctl.start();
        // unknown status: keep polling
        assert_eq!(
            run_cycle(&mut ctl, None),
            vec![PollCommand::Schedule(DEFAULT_POLL_INTERVAL)]
        );
        ctl.timer_fired();
        run_cycle(&mut ctl, Some(true));
        ctl.timer_fired();
        assert_eq!(
            run_cycle(&mut ctl, None),
            vec![PollCommand::Schedule(DEFAULT_POLL_INTERVAL)]
        );
    }

    #[test]
    fn test_interval_clamped() {
        let ctl = PollingController::new(Duration::from_secs(u64::MAX));
        assert_eq!(ctl.interval(), MAX_POLL_INTERVAL);
        assert_eq!(PollingController::default().interval(), DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn test_halt_after_cycle() {
        let mut ctl = PollingController::default();
        ctl.start();
        run_cycle(&mut ctl, Some(true));
        ctl.halt();
        assert_eq!(ctl.state(), PollState::Stopped);
        assert!(!ctl.is_polling());
        assert!(ctl.is_running());
        assert!(ctl.timer_fired().is_empty());
        assert!(ctl.stop().is_empty());
    }

    #[test]
    fn test_completion_without_cycle_ignored() {
        let mut ctl = PollingController::default();
        assert!(ctl.summary_done().is_empty());
        assert!(ctl.annotations_done(Some(false)).is_empty());
        assert_eq!(ctl.state(), PollState::Initial);
    }
}
