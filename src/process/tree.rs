/*!
 * Process Tree
 * Snapshot of the worker and its transitive descendants
 *
 * The tree is computed once, when the timeout fires. Descendants are found
 * by scanning `/proc/<pid>/stat` for parent links.
 */

use super::control::ProcessControl;
use super::types::Pid;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use tracing::warn;

/// Worker plus descendants, root first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessTree {
    members: Vec<Pid>,
}

impl ProcessTree {
    /// Enumerate `root` and its descendants through `control`
    ///
    /// If enumeration fails the tree degrades to the root alone.
    pub fn snapshot<C: ProcessControl + ?Sized>(control: &C, root: Pid) -> Self {
        let descendants = control.descendants(root).unwrap_or_else(|e| {
            warn!(%root, error = %e, "could not enumerate descendants; escalating root only");
            Vec::new()
        });
        Self::from_parts(root, descendants)
    }

    pub fn from_parts(root: Pid, descendants: Vec<Pid>) -> Self {
        let mut members = Vec::with_capacity(descendants.len() + 1);
        members.push(root);
        for pid in descendants {
            if !members.contains(&pid) {
                members.push(pid);
            }
        }
        Self { members }
    }

    pub fn root(&self) -> Pid {
        self.members[0]
    }

    pub fn members(&self) -> &[Pid] {
        &self.members
    }

    /// Never zero: the root is always a member
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.members.contains(&pid)
    }
}

// ============================================================================
// procfs
// ============================================================================

/// The fields of `/proc/<pid>/stat` the executor needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcStat {
    pub pid: i32,
    pub comm: String,
    pub state: char,
    pub ppid: i32,
}

impl ProcStat {
    /// Zombies (`Z`) and dead tasks (`X`/`x`) have already exited
    pub fn is_running(&self) -> bool {
        !matches!(self.state, 'Z' | 'X' | 'x')
    }
}

/// Parse one `/proc/<pid>/stat` line
///
/// The command name sits between the first `(` and the last `)` and may
/// itself contain spaces and parentheses.
pub fn parse_stat(line: &str) -> Option<ProcStat> {
    let open = line.find('(')?;
    let close = line.rfind(')')?;
    if close < open {
        return None;
    }

    let pid = line[..open].trim().parse().ok()?;
    let comm = line[open + 1..close].to_string();

    let mut rest = line[close + 1..].split_whitespace();
    let state = rest.next()?.chars().next()?;
    let ppid = rest.next()?.parse().ok()?;

    Some(ProcStat {
        pid,
        comm,
        state,
        ppid,
    })
}

/// Read the stat of one process; `Ok(None)` if it no longer exists
pub fn read_stat(pid: Pid) -> io::Result<Option<ProcStat>> {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(line) => Ok(parse_stat(&line)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        // ESRCH surfaces when the process exits mid-read
        Err(e) if e.raw_os_error() == Some(libc::ESRCH) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Read the stat of every process currently in `/proc`
pub fn scan_proc() -> io::Result<Vec<ProcStat>> {
    let mut table = Vec::new();
    for entry in std::fs::read_dir("/proc")? {
        let entry = entry?;
        let pid: i32 = match entry.file_name().to_str().and_then(|s| s.parse().ok()) {
            Some(pid) => pid,
            None => continue,
        };
        // Processes may vanish between listing and reading
        if let Ok(Some(stat)) = read_stat(Pid::from_raw(pid)) {
            table.push(stat);
        }
    }
    Ok(table)
}

/// Breadth-first descendants of `root` in a process table
pub fn descendants_of(table: &[ProcStat], root: Pid) -> Vec<Pid> {
    let mut children: HashMap<i32, Vec<i32>> = HashMap::new();
    for stat in table {
        children.entry(stat.ppid).or_default().push(stat.pid);
    }

    let mut seen = HashSet::from([root.as_raw()]);
    let mut queue = VecDeque::from([root.as_raw()]);
    let mut found = Vec::new();

    while let Some(parent) = queue.pop_front() {
        for &child in children.get(&parent).into_iter().flatten() {
            if seen.insert(child) {
                found.push(Pid::from_raw(child));
                queue.push_back(child);
            }
        }
    }

    found
}
