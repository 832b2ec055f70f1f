//! The kernel value: process table, scheduler queues, mutex table and the
//! handlers that run on every interrupt and trap.
//!
//! All mutable state lives in one [`Kernel`] owned by the embedding. The
//! embedding boots it, then feeds it interrupts through
//! [`Kernel::handle_interrupt`]; dispatch, preemption, sleep countdown and
//! mutex waits all happen inside.

mod interrupts;
pub mod mutex;
pub mod process;
pub mod queue;
mod sleep;
pub mod syscall;


use crate::config::{TICKS_PER_SECOND, TICKS_PER_SLICE};
use crate::hal::{Hal, IntLevel, Vector};

use mutex::MutexTable;
use process::ProcTable;
use queue::ProcQueue;
use syscall::{PendingCall, Step, SysReply};

pub use process::{Pid, Process, ProcessState};

/// The kernel. One value holds every piece of global state: the process
/// table, the ready/sleep/admission queues, the mutex table, the current
/// process and the round-robin accounting.
pub struct Kernel {
    hal: Box<dyn Hal>,
    procs: ProcTable,
    ready: ProcQueue,
    sleepers: ProcQueue,
    admission: ProcQueue,
    mutexes: MutexTable,
    current: Option<Pid>,
    /// Ticks left in the running process's quantum; reset on every dispatch.
    slice_left: u32,
    /// Process marked for preemption by the clock handler; the software
    /// interrupt rotates it out if it is still running.
    preempted: Option<Pid>,
}

impl Kernel {
    /// Bring the kernel up: install the interrupt handlers, program the
    /// clock, create the initial process and hand the CPU to it with the
    /// one-way boot context switch. Returns the kernel value so the
    /// embedding can keep delivering interrupts.
    ///
    /// Panics if the image for `init_program` cannot be built; a system
    /// without its initial process cannot run.
    pub fn boot(hal: Box<dyn Hal>, init_program: &str) -> Kernel {
        let mut kernel = Kernel {
            hal,
            procs: ProcTable::new(),
            ready: ProcQueue::new(),
            sleepers: ProcQueue::new(),
            admission: ProcQueue::new(),
            mutexes: MutexTable::new(),
            current: None,
            slice_left: TICKS_PER_SLICE,
            preempted: None,
        };
        for vector in [
            Vector::ArithmeticFault,
            Vector::MemoryFault,
            Vector::Clock,
            Vector::Terminal,
            Vector::Syscall,
            Vector::Software,
        ] {
            kernel.hal.install_handler(vector);
        }
        kernel.hal.init_interrupt_controller();
        kernel.hal.init_clock(TICKS_PER_SECOND);
        kernel.hal.init_keyboard();

        if kernel.create_task(init_program).is_err() {
            panic!("initial program {init_program:?} could not be loaded");
        }
        let first = kernel.dispatch();
        kernel.current = Some(first);
        kernel.procs[first].state = ProcessState::Running;
        log::info!("boot: entering process {first}");
        kernel.hal.context_switch(None, &kernel.procs[first].context);
        kernel
    }

    /// Deliver an interrupt or trap to its handler. The embedding calls this
    /// for every vector its simulated hardware raises.
    pub fn handle_interrupt(&mut self, vector: Vector) {
        self.deliver(vector);
    }

    /// Identity of the running process.
    pub fn current_pid(&self) -> Option<Pid> {
        self.current
    }

    /// Snapshot of all live processes for display, the running one first.
    pub fn tasks(&self) -> Vec<(Pid, ProcessState)> {
        let mut out = Vec::new();
        if let Some(cur) = self.current {
            out.push((cur, self.procs[cur].state));
        }
        for proc in self.procs.iter() {
            if proc.state != ProcessState::Unused && Some(proc.id) != self.current {
                out.push((proc.id, proc.state));
            }
        }
        out
    }

    fn deliver(&mut self, vector: Vector) {
        match vector {
            Vector::ArithmeticFault => self.arithmetic_fault(),
            Vector::MemoryFault => self.memory_fault(),
            Vector::Clock => self.clock_interrupt(),
            Vector::Terminal => self.terminal_interrupt(),
            Vector::Syscall => self.syscall_trap(),
            Vector::Software => self.software_interrupt(),
        }
    }

    fn running(&self) -> Pid {
        self.current.expect("service routine with no current process")
    }

    /// Pick the next process to run. Resets the quantum and the preemption
    /// marker, idles in the low-power wait while nothing is ready (handling
    /// the interrupts that end the wait), and replays the blocked system
    /// call of the chosen process; a replay that parks again sends the
    /// dispatcher back for another head.
    fn dispatch(&mut self) -> Pid {
        loop {
            self.slice_left = TICKS_PER_SLICE;
            self.preempted = None;
            let pid = loop {
                if let Some(pid) = self.ready.pop_head(&mut self.procs) {
                    break pid;
                }
                let prev = self.hal.set_interrupt_level(IntLevel::Level1);
                let vector = self.hal.halt();
                self.hal.set_interrupt_level(prev);
                self.deliver(vector);
            };
            match self.procs[pid].pending.take() {
                None => return pid,
                Some(call) => match self.replay(pid, call) {
                    Step::Done(result) => {
                        self.procs[pid].context.set_reg(0, result as u64);
                        return pid;
                    }
                    Step::Park => continue,
                },
            }
        }
    }

    /// Re-run the call a process was blocked in, now that it was woken.
    fn replay(&mut self, pid: Pid, call: PendingCall) -> Step {
        match call {
            PendingCall::Sleep => Step::Done(0),
            PendingCall::Lock { des } => match self.lock_step(pid, des) {
                Ok(step) => step,
                Err(err) => {
                    log::warn!("lock retry by process {pid}: {err}");
                    Step::Done(-1)
                }
            },
            PendingCall::CreateMutex { des, name, kind } => {
                self.create_mutex_step(pid, des, &name, kind)
            }
        }
    }

    /// Hand the CPU to the next runnable process after the caller parked the
    /// current one. The parked process must already sit in its destination
    /// queue with state and pending call set; the switch is the last thing
    /// that happens here.
    fn suspend_current(&mut self, restore_to: IntLevel) -> SysReply {
        let old = self.running();
        let next = self.dispatch();
        self.current = Some(next);
        self.procs[next].state = ProcessState::Running;
        if next == old {
            // woken during the idle wait before anyone else became runnable;
            // resume in place with the result its replay produced
            self.hal.set_interrupt_level(restore_to);
            let result = self.procs[old].context.reg(0) as i64;
            return SysReply::Value(result);
        }
        self.hal.set_interrupt_level(restore_to);
        log::debug!("context switch: {old} -> {next}");
        let (save, restore) = self.procs.switch_pair(old, next);
        self.hal.context_switch(Some(save), restore);
        SysReply::Suspended
    }
}
