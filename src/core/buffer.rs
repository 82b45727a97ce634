// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! A movable, non-copyable byte buffer with a sliding window and bounds-checked
//! integer accessors, used as the wire-level currency of every component in
//! this crate.

/// Owned byte storage with a cursor (`start`) that can be advanced (`cover`)
/// or retreated (`uncover`) without reallocating.
///
/// `Buffer` is move-only: cloning it would duplicate ownership of the
/// underlying bytes, which defeats the "exactly one owner" invariant relied
/// on by the transport layer.
#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    start: usize,
}

/// A non-owning view into a byte slice, used where a callee needs read
/// access without taking ownership of a `Buffer`.
#[derive(Debug, Clone, Copy)]
pub struct WeakBuffer<'a> {
    data: &'a [u8],
}

macro_rules! impl_readers_writers {
    ($($read_le:ident, $read_be:ident, $write_le:ident, $write_be:ident, $ty:ty, $width:expr;)*) => {
        $(
            /// Bounds-checked little-endian read; `None` on overflow.
            pub fn $read_le(&self, offset: usize) -> Option<$ty> {
                let end = offset.checked_add($width)?;
                let slice = self.as_slice();
                if end > slice.len() {
                    return None;
                }
                let mut buf = [0u8; $width];
                buf.copy_from_slice(&slice[offset..end]);
                Some(<$ty>::from_le_bytes(buf))
            }

            /// Bounds-checked big-endian read; `None` on overflow.
            pub fn $read_be(&self, offset: usize) -> Option<$ty> {
                let end = offset.checked_add($width)?;
                let slice = self.as_slice();
                if end > slice.len() {
                    return None;
                }
                let mut buf = [0u8; $width];
                buf.copy_from_slice(&slice[offset..end]);
                Some(<$ty>::from_be_bytes(buf))
            }

            /// Bounds-checked little-endian write; `false` (no-op) on overflow.
            pub fn $write_le(&mut self, offset: usize, v: $ty) -> bool {
                let end = match offset.checked_add($width) {
                    Some(e) => e,
                    None => return false,
                };
                let slice = self.as_mut_slice();
                if end > slice.len() {
                    return false;
                }
                slice[offset..end].copy_from_slice(&v.to_le_bytes());
                true
            }

            /// Bounds-checked big-endian write; `false` (no-op) on overflow.
            pub fn $write_be(&mut self, offset: usize, v: $ty) -> bool {
                let end = match offset.checked_add($width) {
                    Some(e) => e,
                    None => return false,
                };
                let slice = self.as_mut_slice();
                if end > slice.len() {
                    return false;
                }
                slice[offset..end].copy_from_slice(&v.to_be_bytes());
                true
            }
        )*
    };
}

impl Buffer {
    /// Allocate a zero-filled buffer of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self { data: vec![0u8; size], start: 0 }
    }

    /// Allocate a buffer of `size` bytes, left-justified copying `initializer`
    /// into the front (truncated if `initializer` is longer than `size`).
    pub fn from_initializer(initializer: &[u8], size: usize) -> Self {
        let mut data = vec![0u8; size];
        let n = initializer.len().min(size);
        data[..n].copy_from_slice(&initializer[..n]);
        Self { data, start: 0 }
    }

    /// Wrap an existing owned vector as a buffer with no initial offset.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data, start: 0 }
    }

    /// Bytes from the cursor to the end.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.start..]
    }

    /// Mutable bytes from the cursor to the end.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[self.start..]
    }

    /// Number of bytes visible from the cursor.
    pub fn size(&self) -> usize {
        self.data.len() - self.start
    }

    /// Borrow as a weak, non-owning view.
    pub fn as_weak(&self) -> WeakBuffer<'_> {
        WeakBuffer { data: self.as_slice() }
    }

    /// Move the cursor forward by `num` bytes, shrinking the visible window.
    /// Returns `false` (no-op) if `num` exceeds the current size.
    pub fn cover(&mut self, num: usize) -> bool {
        if num > self.size() {
            return false;
        }
        self.start += num;
        true
    }

    /// Move the cursor backward by `num` bytes, growing the visible window.
    /// Returns `false` (no-op) if `num` exceeds the already-covered prefix.
    pub fn uncover(&mut self, num: usize) -> bool {
        if num > self.start {
            return false;
        }
        self.start -= num;
        true
    }

    impl_readers_writers! {
        read_uint8_le, read_uint8_be, write_uint8_le, write_uint8_be, u8, 1;
        read_uint16_le, read_uint16_be, write_uint16_le, write_uint16_be, u16, 2;
        read_uint32_le, read_uint32_be, write_uint32_le, write_uint32_be, u32, 4;
        read_uint64_le, read_uint64_be, write_uint64_le, write_uint64_be, u64, 8;
    }

    /// Copy `src` into the window starting at `offset`; `false` if it would overflow.
    pub fn write(&mut self, offset: usize, src: &[u8]) -> bool {
        let end = match offset.checked_add(src.len()) {
            Some(e) => e,
            None => return false,
        };
        if end > self.size() {
            return false;
        }
        self.as_mut_slice()[offset..end].copy_from_slice(src);
        true
    }

    /// Unchecked little-endian u32 read. Caller guarantees `offset + 4 <= size()`.
    pub fn read_uint32_le_unsafe(&self, offset: usize) -> u32 {
        let b = self.as_slice();
        u32::from_le_bytes([b[offset], b[offset + 1], b[offset + 2], b[offset + 3]])
    }

    /// Unchecked little-endian u32 write. Caller guarantees `offset + 4 <= size()`.
    pub fn write_uint32_le_unsafe(&mut self, offset: usize, v: u32) {
        self.as_mut_slice()[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
    }
}

impl<'a> WeakBuffer<'a> {
    /// Wrap a borrowed slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Borrowed bytes.
    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    /// Number of visible bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cover_uncover_round_trip() {
        let mut b = Buffer::from_vec(vec![1, 2, 3, 4, 5]);
        assert_eq!(b.size(), 5);
        assert!(b.cover(2));
        assert_eq!(b.as_slice(), &[3, 4, 5]);
        assert!(b.uncover(2));
        assert_eq!(b.as_slice(), &[1, 2, 3, 4, 5]);
        assert!(!b.cover(6));
        assert!(!b.uncover(1));
    }

    #[test]
    fn bounds_checked_rw() {
        let mut b = Buffer::new(4);
        assert!(b.write_uint32_be(0, 0xdead_beef));
        assert_eq!(b.read_uint32_be(0), Some(0xdead_beef));
        assert_eq!(b.read_uint64_be(0), None);
        assert!(!b.write_uint64_be(0, 1));
    }

    #[test]
    fn from_initializer_truncates() {
        let b = Buffer::from_initializer(&[1, 2, 3, 4, 5], 3);
        assert_eq!(b.as_slice(), &[1, 2, 3]);
    }
}
