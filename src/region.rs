use std::ffi::c_void;
use std::ptr::NonNull;
use std::{io, slice};

use byteorder::{ByteOrder, LittleEndian as le};

use crate::error::HarnessError;
use crate::layout::RegionSpec;

/// Anonymous private RW mapping that sits exactly at its requested address.
///
/// The base is passed to `mmap` as a hint only. If the kernel puts the
/// mapping anywhere else the region is unusable: chains hold absolute
/// pointers into it.
#[derive(Debug)]
pub struct Region {
    name: &'static str,
    ptr: NonNull<u8>,
    len: usize,
}

impl Region {
    pub fn map(spec: &RegionSpec) -> Result<Region, HarnessError> {
        let ptr = unsafe {
            libc::mmap(
                spec.base as *mut c_void,
                spec.len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(HarnessError::AllocationFailure {
                region: spec.name,
                addr: spec.base,
                source: io::Error::last_os_error(),
            });
        }

        if ptr as usize != spec.base {
            unsafe { libc::munmap(ptr, spec.len) };
            return Err(HarnessError::AddressMismatch {
                region: spec.name,
                requested: spec.base,
                obtained: ptr as usize,
            });
        }

        let ptr = NonNull::new(ptr as *mut u8).ok_or(HarnessError::AddressMismatch {
            region: spec.name,
            requested: spec.base,
            obtained: 0,
        })?;

        log::debug!("mapped {} region at {:#x} ({:#x} bytes)", spec.name, spec.base, spec.len);

        Ok(Region { name: spec.name, ptr, len: spec.len })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn base(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity_words(&self) -> usize {
        self.len / 8
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Little-endian word at slot `index`.
    pub fn word(&self, index: usize) -> Option<u64> {
        let off = index.checked_mul(8)?;
        let bytes = self.as_bytes().get(off..off.checked_add(8)?)?;
        Some(le::read_u64(bytes))
    }

    /// Give up ownership; the mapping stays until the process exits.
    pub fn leak(self) -> usize {
        let base = self.base();
        std::mem::forget(self);
        base
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.ptr.as_ptr() as *mut c_void, self.len) };
    }
}
