//! Constant-time comparison helpers.
//!
//! Hashes received from a peer are compared without short-circuiting so the
//! position of the first mismatching byte is not observable through timing.

use constant_time_eq::constant_time_eq;

/// Compare two byte slices in constant time.
///
/// Slices of different length compare unequal.
///
/// # Example
///
/// ```rust
/// use gsp_crypto::utils::constant_time_compare;
///
/// let h1 = [0u8; 32];
/// let h2 = [0u8; 32];
/// assert!(constant_time_compare(&h1, &h2));
///
/// let h3 = [1u8; 32];
/// assert!(!constant_time_compare(&h1, &h3));
/// ```
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    constant_time_eq(a, b)
}
