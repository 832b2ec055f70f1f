use thiserror::Error;

/// Failures a service routine can report. Every variant maps to `-1` at the
/// system-call boundary; the variant itself only feeds the diagnostic log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SysError {
    #[error("process table is full")]
    ProcessTableFull,
    #[error("program image could not be built")]
    BadImage,
    #[error("mutex name is empty or too long")]
    BadName,
    #[error("invalid mutex kind")]
    BadKind,
    #[error("a mutex with this name already exists")]
    NameTaken,
    #[error("no open mutex has this name")]
    UnknownMutex,
    #[error("no free mutex descriptor")]
    DescriptorsExhausted,
    #[error("descriptor does not refer to an open mutex")]
    BadDescriptor,
    #[error("relocking a non-recursive mutex would deadlock")]
    WouldDeadlock,
    #[error("mutex is not locked")]
    NotLocked,
    #[error("mutex is locked by another process")]
    NotOwner,
    #[error("unreadable user buffer")]
    BadAddress,
}

pub type SysResult<T> = Result<T, SysError>;
