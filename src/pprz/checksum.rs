//! # PPRZ Checksum
//!
//! Two cumulative 8-bit sums (Fletcher-style) over `LEN` through the last
//! data byte:
//!
//! - `CKA = Σ byte mod 256`
//! - `CKB = Σ CKA_i mod 256`, where `CKA_i` is the running `CKA` after byte `i`

/// Calculate `(CKA, CKB)` over a byte slice
///
/// # Examples
///
/// ```
/// use uwb_bridge::pprz::checksum::pprz_checksum;
///
/// assert_eq!(pprz_checksum(&[0x07, 0x01, 0x02]), (10, 25));
/// ```
pub fn pprz_checksum(data: &[u8]) -> (u8, u8) {
    pprz_checksum_iter(data.iter().copied())
}

/// Same as [`pprz_checksum`] over any byte iterator
///
/// Used by the ring buffer scanner, which cannot hand out a contiguous slice.
pub fn pprz_checksum_iter<I>(bytes: I) -> (u8, u8)
where
    I: IntoIterator<Item = u8>,
{
    bytes.into_iter().fold((0u8, 0u8), |(cka, ckb), byte| {
        let cka = cka.wrapping_add(byte);
        (cka, ckb.wrapping_add(cka))
    })
}
