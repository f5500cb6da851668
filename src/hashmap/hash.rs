//! Key hashing for integer-vector keys

use std::mem::size_of;
use std::ptr;

use crate::dispatch::Element;
use crate::dispatch_int_dtype;
use crate::error::CoreResult;
use crate::tensor::Dtype;

const FNV_OFFSET_BASIS: u64 = 14695981039346656037;
const FNV_PRIME: u64 = 1099511628211;

/// FNV-1a over the key elements, one element per round.
pub fn fnv1a_fold(elements: impl IntoIterator<Item = u64>) -> u64 {
    elements
        .into_iter()
        .fold(FNV_OFFSET_BASIS, |hash, element| (hash ^ element).wrapping_mul(FNV_PRIME))
}

/// Hash of one key row stored as raw bytes.
pub type KeyHashFn = fn(&[u8]) -> u64;

fn hash_row<T: Element>(row: &[u8]) -> u64 {
    fnv1a_fold(row.chunks_exact(size_of::<T>()).map(|chunk| {
        // SAFETY: every chunk holds exactly one element of T.
        let value = unsafe { ptr::read_unaligned(chunk.as_ptr() as *const T) };
        value.to_i128() as u64
    }))
}

/// Row hasher for `dtype`; only integer dtypes can be keys.
pub fn key_hasher(dtype: Dtype) -> CoreResult<KeyHashFn> {
    dispatch_int_dtype!(dtype, "HashMap", T => Ok(hash_row::<T> as KeyHashFn))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes<T: Copy>(values: &[T]) -> Vec<u8> {
        let mut out = vec![0u8; std::mem::size_of_val(values)];
        unsafe {
            ptr::copy_nonoverlapping(values.as_ptr() as *const u8, out.as_mut_ptr(), out.len());
        }
        out
    }

    #[test]
    fn test_fnv1a_reference_values() {
        assert_eq!(fnv1a_fold([]), FNV_OFFSET_BASIS);
        // One round of FNV-1a on the byte 'a'.
        assert_eq!(fnv1a_fold([0x61]), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn test_same_values_hash_equal_across_widths() {
        let h32 = key_hasher(Dtype::INT32).unwrap();
        let h64 = key_hasher(Dtype::INT64).unwrap();
        assert_eq!(h32(&bytes(&[1i32, -2, 3])), h64(&bytes(&[1i64, -2, 3])));
        assert_ne!(h32(&bytes(&[1i32, 2, 3])), h32(&bytes(&[3i32, 2, 1])));
    }

    #[test]
    fn test_float_keys_rejected() {
        assert!(key_hasher(Dtype::FLOAT32).is_err());
        assert!(key_hasher(Dtype::BOOL).is_err());
    }
}
