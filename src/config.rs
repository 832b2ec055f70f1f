//! Compile-time tunables for the kernel core.

/// Number of slots in the process table.
pub const MAX_PROCESSES: usize = 16;

/// Number of slots in the global mutex table. Creating a mutex while every
/// slot is in use parks the caller until one is closed.
pub const MAX_MUTEXES: usize = 4;

/// Mutex descriptors available to each process.
pub const MUTEXES_PER_PROCESS: usize = 4;

/// Longest accepted mutex name, in bytes.
pub const MAX_MUTEX_NAME: usize = 16;

/// Size of each user task stack requested from the HAL (16 KiB).
pub const STACK_SIZE: usize = 4096 * 4;

/// Clock interrupt frequency programmed at boot.
pub const TICKS_PER_SECOND: u32 = 100;

/// Round-robin quantum, in clock ticks.
pub const TICKS_PER_SLICE: u32 = 4;
