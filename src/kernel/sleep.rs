use crate::config::TICKS_PER_SECOND;
use crate::hal::IntLevel;

use super::process::ProcessState;
use super::syscall::{PendingCall, SysReply};
use super::Kernel;

impl Kernel {
    /// sleep(seconds): park the caller on the sleep queue until the clock
    /// counts it back down. `sleep(0)` returns immediately.
    pub(super) fn sys_sleep(&mut self) -> SysReply {
        let cur = self.running();
        let seconds = self.hal.read_register(1);
        let ticks = seconds.saturating_mul(TICKS_PER_SECOND as u64);
        if ticks == 0 {
            return SysReply::Value(0);
        }
        log::debug!("process {cur} sleeps for {seconds}s ({ticks} ticks)");

        let prev = self.hal.set_interrupt_level(IntLevel::Level3);
        self.procs[cur].state = ProcessState::Blocked;
        self.procs[cur].sleep_ticks = ticks;
        self.procs[cur].pending = Some(PendingCall::Sleep);
        self.sleepers.push_tail(&mut self.procs, cur);
        self.suspend_current(prev)
    }

    /// Clock-driven countdown over the sleep queue. Processes whose counter
    /// hits zero move to the ready tail in queue order, so same-tick expiries
    /// wake in the order they went to sleep.
    pub(super) fn sleep_countdown(&mut self) {
        let prev = self.hal.set_interrupt_level(IntLevel::Level3);
        for pid in self.sleepers.pids(&self.procs) {
            self.procs[pid].sleep_ticks = self.procs[pid].sleep_ticks.saturating_sub(1);
            if self.procs[pid].sleep_ticks == 0 {
                self.sleepers.remove(&mut self.procs, pid);
                self.procs[pid].state = ProcessState::Ready;
                self.ready.push_tail(&mut self.procs, pid);
                log::debug!("process {pid} finished sleeping");
            }
        }
        self.hal.set_interrupt_level(prev);
    }
}
