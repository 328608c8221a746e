//! Page table entry flags for the software page table.

/// Permission bits of an emulated page table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageFlags(usize);

impl PageFlags {
    /// Present bit (bit 0).
    const PRESENT: usize = 1 << 0;

    /// Writable bit (bit 1).
    const WRITABLE: usize = 1 << 1;

    /// User-accessible bit (bit 2).
    const USER: usize = 1 << 2;

    /// Every bit an entry can carry.
    pub(super) const MASK: usize = Self::PRESENT | Self::WRITABLE | Self::USER;

    /// Creates empty page flags (page not present).
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Flags for a present user page.
    pub const fn user(writable: bool) -> Self {
        let mut raw = Self::PRESENT | Self::USER;
        if writable {
            raw |= Self::WRITABLE;
        }
        Self(raw)
    }

    pub const fn from_raw(raw: usize) -> Self {
        Self(raw & Self::MASK)
    }

    pub const fn to_raw(self) -> usize {
        self.0
    }

    pub fn is_present(self) -> bool {
        (self.0 & Self::PRESENT) != 0
    }

    pub fn is_writable(self) -> bool {
        (self.0 & Self::WRITABLE) != 0
    }

    pub fn is_user(self) -> bool {
        (self.0 & Self::USER) != 0
    }

    /// Sets or clears the writable bit.
    pub fn set_writable(&mut self, writable: bool) {
        if writable {
            self.0 |= Self::WRITABLE;
        } else {
            self.0 &= !Self::WRITABLE;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_flags() {
        let ro = PageFlags::user(false);
        assert!(ro.is_present());
        assert!(ro.is_user());
        assert!(!ro.is_writable());

        let rw = PageFlags::user(true);
        assert!(rw.is_writable());
        assert_eq!(rw.to_raw(), 0b111);
    }

    #[test]
    fn from_raw_drops_unknown_bits() {
        assert_eq!(PageFlags::from_raw(0xF0 | 0b011).to_raw(), 0b011);
    }

    #[test]
    fn toggle_writable() {
        let mut flags = PageFlags::user(false);
        flags.set_writable(true);
        assert!(flags.is_writable());
        flags.set_writable(false);
        assert!(!flags.is_writable());
        assert!(flags.is_present());
    }
}
