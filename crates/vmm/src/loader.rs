//! Populates freshly allocated frames.
//!
//! A frame handed out by the allocator may still hold another process's data.
//! Every byte of it is overwritten here before the frame is mapped into user space.

use crate::{FILESYSTEM_LOCK, PAGE_SIZE, PageDescriptor, VmError};

/// Fills `frame` with the contents of a file-backed page.
///
/// Reads exactly `page.read_bytes()` bytes from the backing file at
/// `page.file_offset()` and zeroes the `page.zero_bytes()` bytes after them. A
/// short read fails with [`VmError::LoadFailure`], leaving the frame contents
/// undefined; the page must not be made resident in that case.
pub fn load(frame: &mut [u8], page: &PageDescriptor) -> Result<(), VmError> {
    assert_eq!(frame.len(), PAGE_SIZE, "frame must be exactly one page");

    let read_bytes = page.read_bytes();
    let (data, padding) = frame.split_at_mut(read_bytes);

    if read_bytes > 0 {
        let Some(file) = page.backing_file() else {
            log::warn!("page {} expects {} file bytes but has no file", page.virtual_address(), read_bytes);
            return Err(VmError::LoadFailure);
        };

        let read = {
            let _guard = FILESYSTEM_LOCK.lock();
            file.read_at(data, page.file_offset())
        };

        if read != read_bytes {
            log::debug!(
                "short read for page {}: wanted {} bytes at offset {}, got {}",
                page.virtual_address(),
                read_bytes,
                page.file_offset(),
                read
            );
            return Err(VmError::LoadFailure);
        }
    }

    debug_assert_eq!(padding.len(), page.zero_bytes());
    padding.fill(0);
    Ok(())
}

/// Fills `frame` with zeros, for anonymous pages.
pub fn zero_fill(frame: &mut [u8]) {
    frame.fill(0);
}
