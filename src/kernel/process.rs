use core::ops::{Index, IndexMut};

use crate::config::{MAX_PROCESSES, MUTEXES_PER_PROCESS};
use crate::hal::{Context, Image, Stack};

use super::syscall::PendingCall;

/// Process identifier; doubles as the index into the process table.
pub type Pid = usize;

/// Process state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Unused,
    Ready,
    Running,
    Blocked,
    Terminated,
}

/// Process control block.
///
/// A process sits in at most one queue at a time, linked through `next`:
/// the ready queue while runnable, the sleep queue while counting down, the
/// admission queue or one mutex waiter queue while blocked. The running
/// process is linked nowhere.
pub struct Process {
    pub id: Pid,
    pub state: ProcessState,
    pub context: Context,
    pub stack: Option<Stack>,
    pub image: Option<Image>,
    /// Link for whichever queue currently holds this process.
    pub next: Option<Pid>,
    /// Ticks left until wakeup while in the sleep queue.
    pub sleep_ticks: u64,
    /// Open mutex descriptors: entry = global mutex slot, `None` = free.
    pub descriptors: [Option<usize>; MUTEXES_PER_PROCESS],
    pub descriptor_count: usize,
    /// The system call this process is blocked in, replayed on dispatch.
    pub pending: Option<PendingCall>,
}

impl Process {
    fn unused(id: Pid) -> Self {
        Process {
            id,
            state: ProcessState::Unused,
            context: Context::default(),
            stack: None,
            image: None,
            next: None,
            sleep_ticks: 0,
            descriptors: [None; MUTEXES_PER_PROCESS],
            descriptor_count: 0,
            pending: None,
        }
    }

    /// First free slot in the descriptor table.
    pub fn free_descriptor(&self) -> Option<usize> {
        self.descriptors.iter().position(|d| d.is_none())
    }

    /// Reset every field except the slot identity, releasing the slot.
    pub fn recycle(&mut self) {
        *self = Process::unused(self.id);
    }
}

/// Fixed table of all process control blocks.
pub struct ProcTable {
    slots: [Process; MAX_PROCESSES],
}

impl ProcTable {
    pub fn new() -> Self {
        ProcTable {
            slots: core::array::from_fn(Process::unused),
        }
    }

    /// First unused slot, if any.
    pub fn alloc(&mut self) -> Option<Pid> {
        self.slots
            .iter()
            .position(|p| p.state == ProcessState::Unused)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.slots.iter()
    }

    /// Mutable access to the saved contexts of two distinct processes, for
    /// the save/restore pair of a context switch.
    pub fn switch_pair(&mut self, save: Pid, restore: Pid) -> (&mut Context, &Context) {
        debug_assert_ne!(save, restore);
        if save < restore {
            let (low, high) = self.slots.split_at_mut(restore);
            (&mut low[save].context, &high[0].context)
        } else {
            let (low, high) = self.slots.split_at_mut(save);
            (&mut high[0].context, &low[restore].context)
        }
    }
}

impl Default for ProcTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<Pid> for ProcTable {
    type Output = Process;

    fn index(&self, pid: Pid) -> &Process {
        &self.slots[pid]
    }
}

impl IndexMut<Pid> for ProcTable {
    fn index_mut(&mut self, pid: Pid) -> &mut Process {
        &mut self.slots[pid]
    }
}
