//! Interface consumed from the hardware abstraction layer.
//!
//! The kernel never touches hardware directly. Interrupt masking, the
//! low-power wait, context save/restore, image and stack allocation and all
//! privileged I/O go through an implementation of [`Hal`] supplied by the
//! embedding: a simulator on a development host, a thin architecture port on
//! real hardware.

/// Number of general-purpose registers addressable by index in a [`Context`].
pub const NUM_REGS: usize = 8;

/// Interrupt mask levels, lowest to highest. `Level3` masks every interrupt
/// and delimits kernel critical sections; `Level0` is the level user code
/// runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IntLevel {
    Level0,
    Level1,
    Level2,
    Level3,
}

/// Interrupt and trap vectors the kernel services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vector {
    /// Arithmetic exception raised by user code.
    ArithmeticFault,
    /// Invalid memory access raised by user code.
    MemoryFault,
    /// Periodic clock tick.
    Clock,
    /// A character arrived on the terminal.
    Terminal,
    /// System call trap.
    Syscall,
    /// Software interrupt used for preemption.
    Software,
}

/// Saved CPU register set of one process.
///
/// The snapshot is filled by [`Hal::init_context`] and saved/restored by
/// [`Hal::context_switch`]; the kernel treats it as mostly opaque, except
/// that it stores a deferred system-call result into register 0 when it
/// completes a call the process was blocked in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    regs: [u64; NUM_REGS],
    pc: u64,
    sp: u64,
}

impl Context {
    pub fn reg(&self, idx: usize) -> u64 {
        self.regs[idx]
    }

    pub fn set_reg(&mut self, idx: usize, value: u64) {
        self.regs[idx] = value;
    }

    pub fn pc(&self) -> u64 {
        self.pc
    }

    pub fn sp(&self) -> u64 {
        self.sp
    }

    /// Point the snapshot at an entry point and stack top. Called by HAL
    /// implementations from [`Hal::init_context`].
    pub fn set_entry(&mut self, pc: u64, sp: u64) {
        self.pc = pc;
        self.sp = sp;
    }
}

/// Owning handle to a process memory image built by the HAL.
#[derive(Debug, PartialEq, Eq)]
pub struct Image(u64);

impl Image {
    pub fn new(raw: u64) -> Self {
        Image(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Owning handle to a process stack allocated by the HAL.
#[derive(Debug, PartialEq, Eq)]
pub struct Stack(u64);

impl Stack {
    pub fn new(raw: u64) -> Self {
        Stack(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Services the kernel requires from the platform.
pub trait Hal {
    /// Set the interrupt mask, returning the previous level.
    fn set_interrupt_level(&mut self, level: IntLevel) -> IntLevel;

    /// Low-power wait for the next interrupt admitted by the current mask.
    /// Reports the vector that ended the wait so the kernel can run the
    /// matching handler before re-checking its queues. Only hardware vectors
    /// (`Clock`, `Terminal`, `Software`) are delivered this way.
    fn halt(&mut self) -> Vector;

    /// Declare that the kernel services `vector`. Delivery happens through
    /// [`crate::kernel::Kernel::handle_interrupt`].
    fn install_handler(&mut self, vector: Vector);

    /// Read a live CPU register of the running process.
    fn read_register(&self, idx: usize) -> u64;

    /// Write a live CPU register of the running process.
    fn write_register(&mut self, idx: usize, value: u64);

    /// Save the live CPU state into `save` (when given) and resume `restore`.
    /// The first switch at boot and the final switch of a terminating
    /// process pass no save target.
    fn context_switch(&mut self, save: Option<&mut Context>, restore: &Context);

    /// Build the memory image for `program`; returns the owning handle and
    /// the program entry point, or `None` if no such program exists.
    fn create_image(&mut self, program: &str) -> Option<(Image, u64)>;

    fn free_image(&mut self, image: Image);

    fn create_stack(&mut self, size: usize) -> Stack;

    fn free_stack(&mut self, stack: Stack);

    /// Fill `ctx` so that restoring it enters `entry` on the given stack.
    fn init_context(
        &mut self,
        image: &Image,
        stack: &Stack,
        stack_size: usize,
        entry: u64,
        ctx: &mut Context,
    );

    /// Privileged copy-in of `len` bytes at user address `addr`.
    fn read_user(&self, addr: u64, len: usize) -> Option<Vec<u8>>;

    /// Privileged copy-in of a NUL-terminated string at user address `addr`.
    /// Returns `None` if the address is unreadable or no terminator shows up
    /// within `max` content bytes.
    fn read_user_str(&self, addr: u64, max: usize) -> Option<String>;

    /// Fetch the character pending on the terminal port.
    fn terminal_read_port(&mut self) -> u8;

    fn write_to_terminal(&mut self, buf: &[u8]);

    /// Whether the interrupt being handled arrived from user mode.
    fn came_from_user_mode(&self) -> bool;

    /// Flag the software interrupt; it fires once the mask admits it.
    fn raise_software_interrupt(&mut self);

    fn init_interrupt_controller(&mut self);

    fn init_clock(&mut self, ticks_per_second: u32);

    fn init_keyboard(&mut self);
}
