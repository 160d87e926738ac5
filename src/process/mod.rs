/*!
 * Process Management
 * Worker ownership, process-tree introspection and termination escalation
 */

pub mod control;
pub mod escalation;
pub mod handle;
pub mod tree;
pub mod types;

// Re-export public types
pub use control::{ProcessControl, SystemProcesses};
pub use escalation::{Escalation, EscalationReport, PhaseReport};
pub use handle::ProcessHandle;
pub use tree::{ProcStat, ProcessTree};
pub use types::{Pid, TerminationSignal, WorkerStatus};
