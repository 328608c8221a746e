//! Page fault resolution.
//!
//! Given the faulting address and the stack pointer saved by the trap, decide
//! whether the fault refers to a declared page, is a legitimate stack push that
//! should grow the stack, or is a bad access that kills the process.

use crate::{PageDescriptor, SupplementalPageTable, UserLayout, VirtualAddress, VmError};

/// The kind of access that caused a fault, as decoded from the trap's error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAccess {
    Read,
    Write,
}

/// Finds or creates the descriptor a fault at `fault` should be served from.
///
/// Returns the existing descriptor unchanged when the page is declared. Otherwise,
/// if the fault is within the stack-growth window of `stack_pointer`, a new
/// anonymous writable page is inserted and returned. Anything else, including any
/// address outside user space, is [`VmError::InvalidAddress`].
pub fn resolve<'t>(
    table: &'t mut SupplementalPageTable,
    layout: &UserLayout,
    fault: VirtualAddress,
    stack_pointer: VirtualAddress,
) -> Result<&'t mut PageDescriptor, VmError> {
    if !layout.is_user_address(fault) {
        log::debug!("fault at {} is outside user space", fault);
        return Err(VmError::InvalidAddress);
    }

    if table.search(fault).is_none() {
        if !layout.is_stack_growth(fault, stack_pointer) {
            log::debug!("unmapped fault at {} (sp {}) is not a stack access", fault, stack_pointer);
            return Err(VmError::InvalidAddress);
        }

        log::trace!("growing stack to {}", fault.page_round_down());
        table.insert(PageDescriptor::anonymous(fault.page_round_down(), true))?;
    }

    table.search_mut(fault).ok_or(VmError::InvalidAddress)
}
