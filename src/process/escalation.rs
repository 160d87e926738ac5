/*!
 * Termination Escalation
 *
 * Applies SIGTERM then SIGKILL to a process tree, waiting up to the join
 * timeout after each signal. Stops as soon as nothing is left alive.
 * Whatever survives both phases is reported to the caller as a zombie.
 */

use super::control::ProcessControl;
use super::tree::ProcessTree;
use super::types::{Pid, TerminationSignal};
use std::time::{Duration, Instant};
use tracing::warn;

/// Outcome of one signal phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub signal: TerminationSignal,
    /// Processes the signal was sent to
    pub signalled: Vec<Pid>,
    /// Processes still alive when the phase ended
    pub survivors: Vec<Pid>,
    pub waited: Duration,
}

/// Outcome of the whole escalation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationReport {
    pub tree: ProcessTree,
    pub phases: Vec<PhaseReport>,
}

impl EscalationReport {
    /// Processes alive after the last phase
    pub fn survivors(&self) -> &[Pid] {
        self.phases
            .last()
            .map(|phase| phase.survivors.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_clean(&self) -> bool {
        self.survivors().is_empty()
    }

    /// Signals in the order they were applied
    pub fn signals(&self) -> Vec<TerminationSignal> {
        self.phases.iter().map(|phase| phase.signal).collect()
    }
}

/// Terminate/kill escalation over a `ProcessControl`
pub struct Escalation<'a, C: ProcessControl + ?Sized> {
    control: &'a C,
    join_timeout: Duration,
    poll_interval: Duration,
}

impl<'a, C: ProcessControl + ?Sized> Escalation<'a, C> {
    pub fn new(control: &'a C, join_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            control,
            join_timeout,
            poll_interval,
        }
    }

    /// Run every phase against `tree` until nothing survives
    pub fn run(&self, tree: ProcessTree) -> EscalationReport {
        let mut alive: Vec<Pid> = tree
            .members()
            .iter()
            .copied()
            .filter(|pid| self.control.is_alive(*pid))
            .collect();
        let mut phases = Vec::with_capacity(TerminationSignal::ESCALATION.len());

        for signal in TerminationSignal::ESCALATION {
            if alive.is_empty() {
                break;
            }

            for &pid in &alive {
                if let Err(e) = self.control.signal(pid, signal) {
                    warn!(%pid, %signal, error = %e, "failed to signal process");
                }
            }

            let started = Instant::now();
            let survivors = self.wait_for_exit(&alive);
            let waited = started.elapsed();

            warn!(
                %signal,
                signalled = alive.len(),
                survivors = survivors.len(),
                waited_ms = waited.as_millis() as u64,
                "escalation phase finished"
            );

            phases.push(PhaseReport {
                signal,
                signalled: std::mem::replace(&mut alive, survivors.clone()),
                survivors,
                waited,
            });
        }

        EscalationReport { tree, phases }
    }

    /// Poll until every pid has exited or the join timeout elapses
    ///
    /// A join timeout too large to form a deadline polls until exit.
    fn wait_for_exit(&self, pids: &[Pid]) -> Vec<Pid> {
        let deadline = Instant::now().checked_add(self.join_timeout);
        let mut remaining = pids.to_vec();

        loop {
            remaining.retain(|pid| self.control.is_alive(*pid));
            if remaining.is_empty() {
                return remaining;
            }
            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return remaining;
                    }
                    self.poll_interval.min(deadline - now)
                }
                None => self.poll_interval,
            };
            std::thread::sleep(pause);
        }
    }
}
