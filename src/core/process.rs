use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tracing::{debug, warn};

use super::error::{Error, Result};

/// Process names and termination, backed by a `sysinfo` process snapshot.
pub struct ProcessDirectory {
    system_info: System,
}

impl ProcessDirectory {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing().with_processes(ProcessRefreshKind::everything());
        Self {
            system_info: System::new_with_specifics(refresh_kind),
        }
    }

    pub fn refresh(&mut self) {
        self.system_info.refresh_processes(ProcessesToUpdate::All, true);
    }

    /// `None` when the process exited since the last refresh.
    pub fn name(&self, pid: u32) -> Option<String> {
        self.system_info
            .process(Pid::from_u32(pid))
            .map(|proc| proc.name().to_string_lossy().to_string())
    }

    pub fn terminate(&mut self, pid: u32) -> Result<()> {
        let target = Pid::from_u32(pid);
        self.system_info.refresh_processes(ProcessesToUpdate::Some(&[target]), true);

        let process = self.system_info
            .process(target)
            .ok_or(Error::ProcessNotFound(pid))?;

        if process.kill() {
            debug!(pid, "sent termination signal");
            Ok(())
        } else {
            warn!(pid, "termination refused");
            Err(Error::TerminateFailed(pid))
        }
    }
}

impl Default for ProcessDirectory {
    fn default() -> Self {
        Self::new()
    }
}
