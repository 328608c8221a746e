//! Errors reported by the virtual memory core.

use core::fmt;

/// Exit status a process is terminated with after a fatal memory fault.
pub const FAULT_EXIT_STATUS: i32 = -1;

/// Errors that can occur while managing an address space.
///
/// Table bookkeeping errors ([`DuplicateMapping`](VmError::DuplicateMapping),
/// [`NotFound`](VmError::NotFound), [`PagePinned`](VmError::PagePinned)) are
/// local and recoverable. The rest compromise the faulting process's memory
/// and must end in its termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// The address is outside user space, or unmapped and not a stack access.
    InvalidAddress,
    /// A descriptor already exists for this virtual page.
    DuplicateMapping,
    /// No descriptor exists for this virtual page.
    NotFound,
    /// Fewer bytes than expected were read from backing storage.
    LoadFailure,
    /// No physical frame or swap slot is available.
    OutOfMemory,
    /// The page is pinned, or is not in a state that can be pinned.
    PagePinned,
    /// The swap store failed to read or write a slot.
    SwapFailure,
}

impl VmError {
    /// Returns true if the owning process must be terminated.
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            VmError::InvalidAddress
                | VmError::LoadFailure
                | VmError::OutOfMemory
                | VmError::SwapFailure
        )
    }

    /// The exit status to terminate the process with, if the error is fatal.
    pub const fn exit_status(self) -> Option<i32> {
        if self.is_fatal() {
            Some(FAULT_EXIT_STATUS)
        } else {
            None
        }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            VmError::InvalidAddress => "invalid user address",
            VmError::DuplicateMapping => "virtual page is already mapped",
            VmError::NotFound => "virtual page is not mapped",
            VmError::LoadFailure => "short read from backing file",
            VmError::OutOfMemory => "out of physical memory",
            VmError::PagePinned => "page is pinned",
            VmError::SwapFailure => "swap i/o failed",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for VmError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_carry_exit_status() {
        for err in [
            VmError::InvalidAddress,
            VmError::LoadFailure,
            VmError::OutOfMemory,
            VmError::SwapFailure,
        ] {
            assert!(err.is_fatal());
            assert_eq!(err.exit_status(), Some(FAULT_EXIT_STATUS));
        }
    }

    #[test]
    fn bookkeeping_errors_are_recoverable() {
        for err in [VmError::DuplicateMapping, VmError::NotFound, VmError::PagePinned] {
            assert!(!err.is_fatal());
            assert_eq!(err.exit_status(), None);
        }
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", VmError::DuplicateMapping), "virtual page is already mapped");
    }
}
