use std::{io, ops::Range, ptr, ptr::NonNull, slice};

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Returns the virtual memory page size reported by `sysconf`.
pub fn page_size() -> usize {
  match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
    size if size > 0 => size as usize,
    _ => 4096,
  }
}

/// Fixed-length anonymous memory mapping that backs one allocator.
///
/// ```text
///   mmap(NULL, len rounded up to a page, RW, PRIVATE | ANONYMOUS)
///
///   ┌──────────────────────────────────────────────┬─────────┐
///   │                  len bytes                   │ padding │
///   └──────────────────────────────────────────────┴─────────┘
///   ▲                                              ▲         ▲
///   base                                     base + len   mapped end
/// ```
///
/// The mapping never grows. Only the first `len` bytes are reachable through
/// [`Region::bytes`] and [`Region::bytes_mut`]; dropping the region returns
/// the whole mapping to the kernel with `munmap`.
///
/// `Region` holds a raw pointer, so it is neither `Send` nor `Sync`.
#[derive(Debug)]
pub struct Region {
  base: NonNull<u8>,
  len: usize,
  mapped: usize,
}

impl Region {
  /// Maps a fresh zero-filled region of `len` bytes.
  pub fn reserve(len: usize) -> Result<Self> {
    if len == 0 {
      return Err(Error::EmptyRegion);
    }

    let mapped = len
      .checked_next_multiple_of(page_size())
      .ok_or_else(|| Error::ReserveFailed {
        size: len,
        source: io::Error::from(io::ErrorKind::OutOfMemory),
      })?;

    // Memory should be private to our process and not mapped to any file.
    let protection = libc::PROT_READ | libc::PROT_WRITE;
    let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

    let address = unsafe { libc::mmap(ptr::null_mut(), mapped, protection, flags, -1, 0) };

    if address == libc::MAP_FAILED {
      return Err(Error::ReserveFailed {
        size: len,
        source: io::Error::last_os_error(),
      });
    }

    let base = NonNull::new(address.cast::<u8>()).ok_or_else(|| Error::ReserveFailed {
      size: len,
      source: io::Error::from(io::ErrorKind::OutOfMemory),
    })?;

    debug!(len, mapped, base = ?base, "reserved region");

    Ok(Self { base, len, mapped })
  }

  /// Usable length in bytes.
  pub fn len(&self) -> usize {
    self.len
  }

  /// Always `false`, a region is never empty.
  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// Address of the first byte, for diagnostics.
  pub fn base(&self) -> *const u8 {
    self.base.as_ptr()
  }

  /// Borrows `range` of the region. Panics if the range is out of bounds.
  pub fn bytes(
    &self,
    range: Range<usize>,
  ) -> &[u8] {
    &self.as_slice()[range]
  }

  /// Mutably borrows `range` of the region. Panics if the range is out of
  /// bounds.
  pub fn bytes_mut(
    &mut self,
    range: Range<usize>,
  ) -> &mut [u8] {
    &mut self.as_mut_slice()[range]
  }

  fn as_slice(&self) -> &[u8] {
    // The mapping is readable and writable for `mapped >= len` bytes for as
    // long as `self` is alive.
    unsafe { slice::from_raw_parts(self.base.as_ptr(), self.len) }
  }

  fn as_mut_slice(&mut self) -> &mut [u8] {
    unsafe { slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
  }
}

impl Drop for Region {
  fn drop(&mut self) {
    let result = unsafe { libc::munmap(self.base.as_ptr().cast(), self.mapped) };

    if result != 0 {
      warn!(
        base = ?self.base,
        mapped = self.mapped,
        error = %io::Error::last_os_error(),
        "munmap failed, region leaked"
      );
    } else {
      debug!(base = ?self.base, mapped = self.mapped, "released region");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_reserve_is_zeroed_and_writable() {
    let mut region = Region::reserve(10_000).unwrap();

    assert_eq!(region.len(), 10_000);
    assert!(region.bytes(0..10_000).iter().all(|&byte| byte == 0));

    region.bytes_mut(9_990..10_000).fill(0xAB);

    assert_eq!(region.bytes(9_990..10_000), &[0xAB; 10]);
    assert_eq!(region.bytes(9_989..9_990), &[0]);
  }

  #[test]
  fn test_reserve_empty_fails() {
    assert!(matches!(Region::reserve(0), Err(Error::EmptyRegion)));
  }

  #[test]
  fn test_reserve_huge_fails() {
    assert!(matches!(Region::reserve(usize::MAX), Err(Error::ReserveFailed { .. })));
    assert!(matches!(Region::reserve(usize::MAX - 10), Err(Error::ReserveFailed { .. })));
  }

  #[test]
  #[should_panic]
  fn test_bytes_out_of_bounds_panics() {
    let region = Region::reserve(64).unwrap();
    let _ = region.bytes(60..65);
  }

  #[test]
  fn test_page_size_is_power_of_two() {
    assert!(page_size().is_power_of_two());
  }
}
