use crate::hal::IntLevel;

use super::process::ProcessState;
use super::Kernel;

impl Kernel {
    /// Clock tick: count sleepers down, then charge the running process one
    /// tick of its quantum.
    pub(super) fn clock_interrupt(&mut self) {
        log::trace!("clock tick");
        self.sleep_countdown();
        self.quantum_tick();
    }

    fn quantum_tick(&mut self) {
        let Some(cur) = self.current else { return };
        if self.procs[cur].state != ProcessState::Running {
            // the CPU is idling in the dispatcher; nobody is consuming quantum
            return;
        }
        self.slice_left = self.slice_left.saturating_sub(1);
        if self.slice_left == 0 {
            self.preempted = Some(cur);
            self.hal.raise_software_interrupt();
        }
    }

    /// Preemption: if the process marked by the clock handler is still
    /// running, rotate it to the ready tail and hand the CPU to the new head.
    /// When the rotation re-selects the same process there is nothing to
    /// switch to and it keeps running.
    pub(super) fn software_interrupt(&mut self) {
        let prev = self.hal.set_interrupt_level(IntLevel::Level3);
        let cur = match self.current {
            Some(cur) if self.current == self.preempted => cur,
            _ => {
                // the marked process already left the CPU for another reason
                self.hal.set_interrupt_level(prev);
                return;
            }
        };
        self.procs[cur].state = ProcessState::Ready;
        self.ready.push_tail(&mut self.procs, cur);
        let next = self.dispatch();
        self.current = Some(next);
        self.procs[next].state = ProcessState::Running;
        self.hal.set_interrupt_level(prev);
        if next != cur {
            log::debug!("quantum expired: {cur} -> {next}");
            let (save, restore) = self.procs.switch_pair(cur, next);
            self.hal.context_switch(Some(save), restore);
        }
    }

    /// A character arrived on the terminal; fetching it is all the core does,
    /// line discipline belongs to the terminal driver.
    pub(super) fn terminal_interrupt(&mut self) {
        let ch = self.hal.terminal_read_port();
        log::debug!("terminal interrupt: {:?}", ch as char);
    }

    pub(super) fn arithmetic_fault(&mut self) {
        if !self.hal.came_from_user_mode() {
            panic!("arithmetic exception inside the kernel");
        }
        let cur = self.running();
        log::warn!("arithmetic exception in process {cur}");
        self.release_current();
    }

    pub(super) fn memory_fault(&mut self) {
        if !self.hal.came_from_user_mode() {
            panic!("memory exception inside the kernel");
        }
        let cur = self.running();
        log::warn!("memory exception in process {cur}");
        self.release_current();
    }
}
