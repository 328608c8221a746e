//! User address-space layout and stack-growth policy.

use core::fmt;

use crate::VirtualAddress;

/// Page size in bytes (4 KiB).
pub const PAGE_SIZE: usize = 4096;

/// Lowest address a user program may touch; the conventional ELF load address.
pub const USER_BASE: VirtualAddress = VirtualAddress::new(0x0804_8000);

/// First address above user space. The initial user stack starts just below it.
pub const PHYS_BASE: VirtualAddress = VirtualAddress::new(0xc000_0000);

/// How far below the stack pointer a fault may land and still count as a push.
///
/// Instructions such as `pusha` touch memory below the stack pointer before
/// adjusting it.
pub const DEFAULT_STACK_SLACK: usize = 32;

/// Maximum size of the user stack, measured down from [`PHYS_BASE`].
pub const DEFAULT_MAX_STACK_SIZE: usize = 8 * 1024 * 1024;

/// Describes the user portion of an address space and the stack-growth policy.
///
/// The slack and maximum stack size are conventions rather than correctness
/// requirements, so each address space carries its own copy.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct UserLayout {
    user_base: VirtualAddress,
    phys_base: VirtualAddress,
    stack_slack: usize,
    max_stack_size: usize,
}

impl UserLayout {
    /// The default user layout.
    pub const fn new() -> Self {
        Self {
            user_base: USER_BASE,
            phys_base: PHYS_BASE,
            stack_slack: DEFAULT_STACK_SLACK,
            max_stack_size: DEFAULT_MAX_STACK_SIZE,
        }
    }

    /// Overrides the user address range `[user_base, phys_base)`.
    ///
    /// # Panics
    ///
    /// Panics if the range is empty or `phys_base` is not page-aligned.
    pub const fn with_user_range(mut self, user_base: VirtualAddress, phys_base: VirtualAddress) -> Self {
        assert!(
            user_base.as_usize() < phys_base.as_usize(),
            "user range must not be empty"
        );
        assert!(phys_base.is_page_aligned(), "top of user space must be page-aligned");
        self.user_base = user_base;
        self.phys_base = phys_base;
        self
    }

    /// Overrides how far below the stack pointer a growth fault may land.
    pub const fn with_stack_slack(mut self, stack_slack: usize) -> Self {
        self.stack_slack = stack_slack;
        self
    }

    /// Overrides the maximum stack size.
    pub const fn with_max_stack_size(mut self, max_stack_size: usize) -> Self {
        self.max_stack_size = max_stack_size;
        self
    }

    pub const fn user_base(&self) -> VirtualAddress {
        self.user_base
    }

    pub const fn phys_base(&self) -> VirtualAddress {
        self.phys_base
    }

    pub const fn stack_slack(&self) -> usize {
        self.stack_slack
    }

    pub const fn max_stack_size(&self) -> usize {
        self.max_stack_size
    }

    /// Returns true if `addr` lies in `[user_base, phys_base)`.
    pub fn is_user_address(&self, addr: VirtualAddress) -> bool {
        addr >= self.user_base && addr < self.phys_base
    }

    /// Lowest address the stack may grow down to.
    pub fn stack_limit(&self) -> VirtualAddress {
        self.phys_base
            .checked_sub(self.max_stack_size)
            .unwrap_or(VirtualAddress::new(0))
    }

    /// Decides whether an unmapped fault at `fault` is a legitimate stack access
    /// given the saved stack pointer `stack_pointer`.
    pub fn is_stack_growth(&self, fault: VirtualAddress, stack_pointer: VirtualAddress) -> bool {
        let lowest_push = stack_pointer
            .checked_sub(self.stack_slack)
            .unwrap_or(VirtualAddress::new(0));

        self.is_user_address(fault.page_round_down())
            && fault >= lowest_push
            && fault >= self.stack_limit()
    }
}

impl Default for UserLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UserLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserLayout")
            .field("user", &format_args!("{}..{}", self.user_base, self.phys_base))
            .field("stack_slack", &self.stack_slack)
            .field("max_stack_size", &format_args!("{:#x}", self.max_stack_size))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bounds() {
        let layout = UserLayout::default();
        assert!(layout.is_user_address(USER_BASE));
        assert!(layout.is_user_address(PHYS_BASE - 1));
        assert!(!layout.is_user_address(USER_BASE - 1));
        assert!(!layout.is_user_address(PHYS_BASE));
        assert_eq!(layout.stack_limit(), VirtualAddress::new(0xbf80_0000));
    }

    #[test]
    fn growth_within_slack() {
        let layout = UserLayout::default();
        let sp = PHYS_BASE - 0x100;
        assert!(layout.is_stack_growth(sp - 4, sp));
        assert!(layout.is_stack_growth(sp - 32, sp));
        assert!(!layout.is_stack_growth(sp - 33, sp));
        assert!(!layout.is_stack_growth(sp - 40, sp));
    }

    #[test]
    fn growth_above_stack_pointer() {
        let layout = UserLayout::default();
        let sp = PHYS_BASE - 0x2000;
        assert!(layout.is_stack_growth(sp + 0x10, sp));
    }

    #[test]
    fn growth_stops_at_stack_limit() {
        let layout = UserLayout::default();
        let limit = layout.stack_limit();
        assert!(layout.is_stack_growth(limit, limit));
        let beyond = limit - PAGE_SIZE;
        assert!(!layout.is_stack_growth(beyond, beyond));
    }

    #[test]
    fn configurable_policy() {
        let layout = UserLayout::new()
            .with_stack_slack(64)
            .with_max_stack_size(16 * PAGE_SIZE);
        let sp = PHYS_BASE - 0x100;
        assert!(layout.is_stack_growth(sp - 40, sp));
        assert_eq!(layout.stack_limit(), PHYS_BASE - 16 * PAGE_SIZE);
    }

    #[test]
    fn tiny_stack_pointer_does_not_underflow() {
        let layout = UserLayout::default().with_user_range(VirtualAddress::new(0), PHYS_BASE);
        assert!(!layout.is_stack_growth(VirtualAddress::new(8), VirtualAddress::new(16)));
    }

    #[test]
    #[should_panic(expected = "user range must not be empty")]
    fn rejects_empty_user_range() {
        let _ = UserLayout::new().with_user_range(PHYS_BASE, PHYS_BASE);
    }
}
