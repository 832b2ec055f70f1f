use core::ops::{Index, IndexMut};

use arrayvec::ArrayString;

use crate::config::{MAX_MUTEXES, MAX_MUTEX_NAME};
use crate::error::{SysError, SysResult};
use crate::hal::IntLevel;

use super::process::{Pid, ProcessState};
use super::queue::ProcQueue;
use super::syscall::{fail, PendingCall, Step, SysReply};
use super::Kernel;

/// Fixed-capacity mutex name as stored in the table.
pub type MutexName = ArrayString<MAX_MUTEX_NAME>;

/// Locking discipline of a mutex. Wire values are stable: 0 non-recursive,
/// 1 recursive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexKind {
    NonRecursive,
    Recursive,
}

impl MutexKind {
    pub fn from_raw(raw: u64) -> Option<MutexKind> {
        match raw {
            0 => Some(MutexKind::NonRecursive),
            1 => Some(MutexKind::Recursive),
            _ => None,
        }
    }
}

/// One slot of the global mutex table. The slot is free iff `open_count`
/// is zero.
pub struct Mutex {
    pub name: MutexName,
    pub kind: MutexKind,
    /// Descriptors across all processes currently referring to this slot.
    pub open_count: usize,
    /// 0 when unheld; above 1 only for a recursive mutex.
    pub lock_depth: u32,
    pub owner: Option<Pid>,
    pub waiters: ProcQueue,
}

impl Mutex {
    fn vacant() -> Self {
        Mutex {
            name: MutexName::new(),
            kind: MutexKind::NonRecursive,
            open_count: 0,
            lock_depth: 0,
            owner: None,
            waiters: ProcQueue::new(),
        }
    }

    pub fn in_use(&self) -> bool {
        self.open_count > 0
    }
}

/// The global table of named mutexes.
pub struct MutexTable {
    slots: [Mutex; MAX_MUTEXES],
    /// Slots currently in use; saturation parks creators on the admission
    /// queue.
    pub created: usize,
}

impl MutexTable {
    pub fn new() -> Self {
        MutexTable {
            slots: core::array::from_fn(|_| Mutex::vacant()),
            created: 0,
        }
    }

    pub fn is_full(&self) -> bool {
        self.created == MAX_MUTEXES
    }

    pub fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|m| !m.in_use())
    }

    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|m| m.in_use() && m.name.as_str() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mutex> {
        self.slots.iter()
    }
}

impl Default for MutexTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<usize> for MutexTable {
    type Output = Mutex;

    fn index(&self, slot: usize) -> &Mutex {
        &self.slots[slot]
    }
}

impl IndexMut<usize> for MutexTable {
    fn index_mut(&mut self, slot: usize) -> &mut Mutex {
        &mut self.slots[slot]
    }
}

impl Kernel {
    pub(super) fn sys_create_mutex(&mut self) -> SysReply {
        let cur = self.running();
        let name = match self.read_name(1) {
            Ok(name) => name,
            Err(err) => return fail("create_mutex", err),
        };
        let kind = match MutexKind::from_raw(self.hal.read_register(2)) {
            Some(kind) => kind,
            None => return fail("create_mutex", SysError::BadKind),
        };
        let Some(des) = self.procs[cur].free_descriptor() else {
            return fail("create_mutex", SysError::DescriptorsExhausted);
        };
        if self.mutexes.find_by_name(&name).is_some() {
            return fail("create_mutex", SysError::NameTaken);
        }
        let prev = self.hal.set_interrupt_level(IntLevel::Level3);
        match self.create_mutex_step(cur, des, &name, kind) {
            Step::Done(value) => {
                self.hal.set_interrupt_level(prev);
                SysReply::Value(value)
            }
            Step::Park => self.suspend_current(prev),
        }
    }

    pub(super) fn sys_open_mutex(&mut self) -> SysReply {
        let cur = self.running();
        match self.open_mutex_call(cur) {
            Ok(value) => SysReply::Value(value),
            Err(err) => fail("open_mutex", err),
        }
    }

    pub(super) fn sys_lock(&mut self) -> SysReply {
        let cur = self.running();
        let des = self.hal.read_register(1) as usize;
        let prev = self.hal.set_interrupt_level(IntLevel::Level3);
        match self.lock_step(cur, des) {
            Ok(Step::Done(value)) => {
                self.hal.set_interrupt_level(prev);
                SysReply::Value(value)
            }
            Ok(Step::Park) => self.suspend_current(prev),
            Err(err) => {
                self.hal.set_interrupt_level(prev);
                fail("lock", err)
            }
        }
    }

    pub(super) fn sys_unlock(&mut self) -> SysReply {
        let cur = self.running();
        let des = self.hal.read_register(1) as usize;
        match self.unlock_call(cur, des) {
            Ok(value) => SysReply::Value(value),
            Err(err) => fail("unlock", err),
        }
    }

    pub(super) fn sys_close_mutex(&mut self) -> SysReply {
        let cur = self.running();
        let des = self.hal.read_register(1) as usize;
        match self.close_mutex_call(cur, des) {
            Ok(value) => SysReply::Value(value),
            Err(err) => fail("close_mutex", err),
        }
    }

    /// One attempt at the saturation check plus slot creation. Parks the
    /// caller on the admission queue while the table is full; the descriptor
    /// slot reserved by the original call travels with the pending call.
    pub(super) fn create_mutex_step(
        &mut self,
        pid: Pid,
        des: usize,
        name: &MutexName,
        kind: MutexKind,
    ) -> Step {
        if self.mutexes.is_full() {
            log::info!(
                "mutex table full, process {pid} waits for a slot to close"
            );
            self.procs[pid].state = ProcessState::Blocked;
            self.procs[pid].pending = Some(PendingCall::CreateMutex {
                des,
                name: *name,
                kind,
            });
            self.admission.push_tail(&mut self.procs, pid);
            return Step::Park;
        }
        let slot = self
            .mutexes
            .free_slot()
            .expect("mutex table count out of sync");
        let mutex = &mut self.mutexes[slot];
        mutex.name = *name;
        mutex.kind = kind;
        mutex.open_count = 1;
        mutex.lock_depth = 0;
        mutex.owner = None;
        mutex.waiters = ProcQueue::new();
        self.mutexes.created += 1;
        self.procs[pid].descriptors[des] = Some(slot);
        self.procs[pid].descriptor_count += 1;
        log::info!(
            "process {pid} created mutex {:?} in slot {slot}",
            name.as_str()
        );
        Step::Done(des as i64)
    }

    fn open_mutex_call(&mut self, pid: Pid) -> SysResult<i64> {
        let name = self.read_name(1)?;
        let des = self.procs[pid]
            .free_descriptor()
            .ok_or(SysError::DescriptorsExhausted)?;
        let slot = self
            .mutexes
            .find_by_name(&name)
            .ok_or(SysError::UnknownMutex)?;
        self.procs[pid].descriptors[des] = Some(slot);
        self.procs[pid].descriptor_count += 1;
        self.mutexes[slot].open_count += 1;
        log::info!("process {pid} opened mutex {:?}", name.as_str());
        Ok(des as i64)
    }

    /// One attempt at taking the mutex. Acquires or re-enters on success,
    /// parks the caller on the waiter queue when another process holds it.
    /// A parked caller retries from here when it is next dispatched and may
    /// lose the race to a process that locked in between.
    pub(super) fn lock_step(&mut self, pid: Pid, des: usize) -> SysResult<Step> {
        let slot = self.resolve_descriptor(pid, des)?;
        let mutex = &mut self.mutexes[slot];
        if mutex.lock_depth == 0 {
            mutex.lock_depth = 1;
            mutex.owner = Some(pid);
            return Ok(Step::Done(0));
        }
        if mutex.owner == Some(pid) {
            return match mutex.kind {
                MutexKind::Recursive => {
                    mutex.lock_depth += 1;
                    Ok(Step::Done(0))
                }
                MutexKind::NonRecursive => Err(SysError::WouldDeadlock),
            };
        }
        log::debug!(
            "mutex {:?} held by process {:?}, process {pid} blocks",
            mutex.name.as_str(),
            mutex.owner
        );
        self.procs[pid].state = ProcessState::Blocked;
        self.procs[pid].pending = Some(PendingCall::Lock { des });
        self.mutexes[slot].waiters.push_tail(&mut self.procs, pid);
        Ok(Step::Park)
    }

    fn unlock_call(&mut self, pid: Pid, des: usize) -> SysResult<i64> {
        let slot = self.resolve_descriptor(pid, des)?;
        let mutex = &mut self.mutexes[slot];
        if mutex.lock_depth == 0 {
            return Err(SysError::NotLocked);
        }
        if mutex.owner != Some(pid) {
            return Err(SysError::NotOwner);
        }
        mutex.lock_depth -= 1;
        if mutex.lock_depth > 0 {
            return Ok(0);
        }
        mutex.owner = None;
        let prev = self.hal.set_interrupt_level(IntLevel::Level3);
        if let Some(waiter) = self.mutexes[slot].waiters.pop_head(&mut self.procs) {
            // the waiter is only made runnable; ownership is decided when it
            // re-runs lock
            self.procs[waiter].state = ProcessState::Ready;
            self.ready.push_tail(&mut self.procs, waiter);
            log::debug!("process {waiter} may retry locking slot {slot}");
        }
        self.hal.set_interrupt_level(prev);
        Ok(0)
    }

    pub(super) fn close_mutex_call(&mut self, pid: Pid, des: usize) -> SysResult<i64> {
        let slot = self.resolve_descriptor(pid, des)?;
        self.procs[pid].descriptors[des] = None;
        self.procs[pid].descriptor_count -= 1;

        let prev = self.hal.set_interrupt_level(IntLevel::Level3);
        if self.mutexes[slot].owner == Some(pid) {
            // closing while holding releases the lock; every waiter gets to
            // race for it again
            self.mutexes[slot].lock_depth = 0;
            self.mutexes[slot].owner = None;
            while let Some(waiter) = self.mutexes[slot].waiters.pop_head(&mut self.procs) {
                self.procs[waiter].state = ProcessState::Ready;
                self.ready.push_tail(&mut self.procs, waiter);
                log::debug!("process {waiter} released from waiting on slot {slot}");
            }
        }
        self.mutexes[slot].open_count -= 1;
        if self.mutexes[slot].open_count == 0 {
            debug_assert!(self.mutexes[slot].waiters.is_empty());
            self.mutexes.created -= 1;
            log::info!("mutex slot {slot} freed");
            // a slot opened up: unpark every admission-blocked creator for a
            // retry of the saturation check
            while let Some(waiter) = self.admission.pop_head(&mut self.procs) {
                self.procs[waiter].state = ProcessState::Ready;
                self.ready.push_tail(&mut self.procs, waiter);
            }
        }
        self.hal.set_interrupt_level(prev);
        Ok(0)
    }

    /// Map a per-process descriptor index to its global mutex slot.
    fn resolve_descriptor(&self, pid: Pid, des: usize) -> SysResult<usize> {
        let slot = self.procs[pid]
            .descriptors
            .get(des)
            .copied()
            .flatten()
            .ok_or(SysError::BadDescriptor)?;
        if !self.mutexes[slot].in_use() {
            return Err(SysError::BadDescriptor);
        }
        Ok(slot)
    }

    /// Read a mutex name from the user pointer in register `reg`.
    fn read_name(&self, reg: usize) -> SysResult<MutexName> {
        let addr = self.hal.read_register(reg);
        let name = self
            .hal
            .read_user_str(addr, MAX_MUTEX_NAME)
            .ok_or(SysError::BadName)?;
        if name.is_empty() {
            return Err(SysError::BadName);
        }
        MutexName::from(&name).map_err(|_| SysError::BadName)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vacant_table_reports_no_names() {
        let table = MutexTable::new();
        assert_eq!(table.created, 0);
        assert!(!table.is_full());
        assert_eq!(table.free_slot(), Some(0));
        assert_eq!(table.find_by_name("anything"), None);
    }

    #[test]
    fn find_by_name_skips_vacant_slots() {
        let mut table = MutexTable::new();
        table[2].name = MutexName::from("disk").unwrap();
        table[2].open_count = 1;
        // a vacant slot keeps its stale name but must not match
        table[0].name = MutexName::from("disk").unwrap();
        assert_eq!(table.find_by_name("disk"), Some(2));
        assert_eq!(table.free_slot(), Some(0));
    }

    #[test]
    fn kind_wire_values() {
        assert_eq!(MutexKind::from_raw(0), Some(MutexKind::NonRecursive));
        assert_eq!(MutexKind::from_raw(1), Some(MutexKind::Recursive));
        assert_eq!(MutexKind::from_raw(2), None);
    }
}
