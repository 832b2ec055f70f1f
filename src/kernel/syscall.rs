use crate::config::STACK_SIZE;
use crate::error::{SysError, SysResult};
use crate::hal::Context;

use super::mutex::{MutexKind, MutexName};
use super::process::{Pid, ProcessState};
use super::Kernel;

/// Service numbers passed in register 0. The numbering is wire-level stable.
pub const SYS_CREATE_PROCESS: u64 = 0;
pub const SYS_TERMINATE_PROCESS: u64 = 1;
pub const SYS_WRITE: u64 = 2;
pub const SYS_GET_PID: u64 = 3;
pub const SYS_SLEEP: u64 = 4;
pub const SYS_CREATE_MUTEX: u64 = 5;
pub const SYS_OPEN_MUTEX: u64 = 6;
pub const SYS_LOCK: u64 = 7;
pub const SYS_UNLOCK: u64 = 8;
pub const SYS_CLOSE_MUTEX: u64 = 9;

/// Longest accepted program name in `create_process`.
const PROGRAM_NAME_MAX: usize = 64;

/// Largest buffer `write` accepts in one call.
const WRITE_MAX: usize = 1024 * 1024;

/// What a service routine did with the calling process.
pub(super) enum SysReply {
    /// The call completed; the result goes into register 0.
    Value(i64),
    /// The caller was suspended or destroyed; the CPU now belongs to another
    /// process and the live registers must not be touched.
    Suspended,
}

/// Outcome of one attempt at a call that can park its caller.
pub(super) enum Step {
    Done(i64),
    Park,
}

/// A system call that parked its caller. It stays on the PCB and is replayed
/// when the process is next dispatched, so a woken process re-checks its
/// condition instead of assuming it still holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingCall {
    Sleep,
    Lock { des: usize },
    CreateMutex {
        des: usize,
        name: MutexName,
        kind: MutexKind,
    },
}

pub(super) fn fail(service: &str, err: SysError) -> SysReply {
    log::warn!("{service}: {err}");
    SysReply::Value(-1)
}

impl Kernel {
    /// System call trap: the service number sits in register 0, arguments in
    /// the registers after it, and the result goes back into register 0
    /// unless the call suspended its caller.
    pub(super) fn syscall_trap(&mut self) {
        let number = self.hal.read_register(0);
        let reply = match number {
            SYS_CREATE_PROCESS => self.sys_create_process(),
            SYS_TERMINATE_PROCESS => self.sys_terminate_process(),
            SYS_WRITE => self.sys_write(),
            SYS_GET_PID => self.sys_get_pid(),
            SYS_SLEEP => self.sys_sleep(),
            SYS_CREATE_MUTEX => self.sys_create_mutex(),
            SYS_OPEN_MUTEX => self.sys_open_mutex(),
            SYS_LOCK => self.sys_lock(),
            SYS_UNLOCK => self.sys_unlock(),
            SYS_CLOSE_MUTEX => self.sys_close_mutex(),
            _ => {
                log::warn!("unknown system call {number}");
                SysReply::Value(-1)
            }
        };
        if let SysReply::Value(value) = reply {
            self.hal.write_register(0, value as u64);
        }
    }

    fn sys_create_process(&mut self) -> SysReply {
        let cur = self.running();
        let addr = self.hal.read_register(1);
        let Some(program) = self.hal.read_user_str(addr, PROGRAM_NAME_MAX) else {
            return fail("create_process", SysError::BadAddress);
        };
        log::info!("process {cur}: create process {program:?}");
        match self.create_task(&program) {
            Ok(_) => SysReply::Value(0),
            Err(err) => fail("create_process", err),
        }
    }

    fn sys_terminate_process(&mut self) -> SysReply {
        let cur = self.running();
        log::info!("process {cur} exiting");
        self.release_current();
        SysReply::Suspended
    }

    fn sys_write(&mut self) -> SysReply {
        let addr = self.hal.read_register(1);
        let len = self.hal.read_register(2) as usize;
        if len > WRITE_MAX {
            return fail("write", SysError::BadAddress);
        }
        let Some(buf) = self.hal.read_user(addr, len) else {
            return fail("write", SysError::BadAddress);
        };
        self.hal.write_to_terminal(&buf);
        SysReply::Value(0)
    }

    fn sys_get_pid(&mut self) -> SysReply {
        SysReply::Value(self.running() as i64)
    }

    /// Build a new task from a program image and queue it at the ready tail.
    pub(super) fn create_task(&mut self, program: &str) -> SysResult<Pid> {
        let pid = self.procs.alloc().ok_or(SysError::ProcessTableFull)?;
        let (image, entry) = self
            .hal
            .create_image(program)
            .ok_or(SysError::BadImage)?;
        let stack = self.hal.create_stack(STACK_SIZE);
        let mut ctx = Context::default();
        self.hal
            .init_context(&image, &stack, STACK_SIZE, entry, &mut ctx);

        let proc = &mut self.procs[pid];
        proc.recycle();
        proc.context = ctx;
        proc.image = Some(image);
        proc.stack = Some(stack);
        proc.state = ProcessState::Ready;
        self.ready.push_tail(&mut self.procs, pid);
        log::info!("created process {pid} running {program:?}");
        Ok(pid)
    }

    /// Tear the current process down and hand the CPU to the next one: close
    /// every open mutex descriptor (waking waiters and admission-blocked
    /// creators as a side effect), free the image, pick a successor, free the
    /// stack, release the table slot and switch with no save target.
    pub(super) fn release_current(&mut self) {
        let cur = self.running();
        for des in 0..self.procs[cur].descriptors.len() {
            if self.procs[cur].descriptors[des].is_some() {
                if let Err(err) = self.close_mutex_call(cur, des) {
                    log::warn!("closing descriptor {des} of process {cur}: {err}");
                }
            }
        }
        if let Some(image) = self.procs[cur].image.take() {
            self.hal.free_image(image);
        }
        self.procs[cur].state = ProcessState::Terminated;

        let next = self.dispatch();
        log::info!("context switch on exit: {cur} -> {next}");
        if let Some(stack) = self.procs[cur].stack.take() {
            self.hal.free_stack(stack);
        }
        self.procs[cur].recycle();
        self.current = Some(next);
        self.procs[next].state = ProcessState::Running;
        self.hal.context_switch(None, &self.procs[next].context);
    }
}
