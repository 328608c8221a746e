#![cfg_attr(not(any(test, feature = "software-emulation")), no_std)]

//! # Polaris Virtual Memory Manager (VMM)
//!
//! The Polaris Virtual Memory Manager is the demand-paging core of the Polaris
//! kernel's user address spaces. It provides:
//!
//! - A per-process supplemental page table recording every declared page and where
//!   its contents come from.
//! - Page fault resolution, including automatic growth of the user stack.
//! - Lazy loading of executable segments, zero-filled pages and swapped-out pages.
//! - Eviction and pinning of resident pages.
//! - Software emulation of frames, page tables, swap and files for testing in
//!   non-kernel environments.

extern crate alloc;

mod address;
mod address_space;
mod collaborators;
mod error;
mod layout;
mod numbers;
mod page;
mod supplemental_page_table;

pub mod fault;
pub mod loader;

#[cfg(any(test, feature = "software-emulation"))]
pub mod emulation;

pub use address::{PhysicalAddress, VirtualAddress};
pub use address_space::AddressSpace;
pub use collaborators::{
    BackingFile, FILESYSTEM_LOCK, FrameAllocator, PageMapper, PhysicalMemory, SwapSlot, SwapStore,
};
pub use error::{FAULT_EXIT_STATUS, VmError};
pub use fault::FaultAccess;
pub use layout::{
    DEFAULT_MAX_STACK_SIZE, DEFAULT_STACK_SLACK, PAGE_SIZE, PHYS_BASE, USER_BASE, UserLayout,
};
pub use numbers::{FrameNumber, PageNumber};
pub use page::{PageDescriptor, PageState};
pub use supplemental_page_table::SupplementalPageTable;
