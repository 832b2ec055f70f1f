use super::process::{Pid, ProcTable};

/// FIFO queue of processes, linked in place through the PCB `next` field.
///
/// The queue owns no storage; it threads head/tail indices through the
/// process table, so a process can belong to at most one queue at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcQueue {
    head: Option<Pid>,
    tail: Option<Pid>,
}

impl ProcQueue {
    pub const fn new() -> Self {
        ProcQueue {
            head: None,
            tail: None,
        }
    }

    pub fn head(&self) -> Option<Pid> {
        self.head
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn push_tail(&mut self, table: &mut ProcTable, pid: Pid) {
        debug_assert!(table[pid].next.is_none());
        table[pid].next = None;
        match self.tail {
            Some(tail) => table[tail].next = Some(pid),
            None => self.head = Some(pid),
        }
        self.tail = Some(pid);
    }

    pub fn pop_head(&mut self, table: &mut ProcTable) -> Option<Pid> {
        let head = self.head?;
        self.head = table[head].next;
        if self.head.is_none() {
            self.tail = None;
        }
        table[head].next = None;
        Some(head)
    }

    /// Unlink `pid` wherever it sits. Head removal goes through `pop_head`;
    /// removing the last element moves the tail back. Returns whether the
    /// process was a member.
    pub fn remove(&mut self, table: &mut ProcTable, pid: Pid) -> bool {
        if self.head == Some(pid) {
            self.pop_head(table);
            return true;
        }
        let mut prev = self.head;
        while let Some(p) = prev {
            if table[p].next == Some(pid) {
                table[p].next = table[pid].next;
                if self.tail == Some(pid) {
                    self.tail = Some(p);
                }
                table[pid].next = None;
                return true;
            }
            prev = table[p].next;
        }
        false
    }

    /// Snapshot of the members in queue order.
    pub fn pids(&self, table: &ProcTable) -> Vec<Pid> {
        let mut out = Vec::new();
        let mut cursor = self.head;
        while let Some(pid) = cursor {
            out.push(pid);
            cursor = table[pid].next;
        }
        out
    }
}
