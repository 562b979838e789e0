//! Recovery of cell addresses from the 48-bit payload of a boxed value.
//!
//! How the upper 16 bits of an address are rebuilt depends on the target:
//!
//! - x86-64 and RISC-V64 use 48-bit canonical addresses where bit 47 is
//!   copied into the upper bits, so the payload is sign-extended.
//! - AArch64 and POWER64 user-space addresses have zero upper bits, so the
//!   payload is masked.
//! - 32-bit targets keep the address in the low word.
//!
//! All three variants are exposed so each can be exercised on any host;
//! [`extract_pointer_bits`] is the one selected for the build target.

/// Mask of the 48 payload bits below the tag.
pub const PAYLOAD_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

/// Sign-extends the 48-bit payload to a full 64-bit address.
///
/// # Examples
///
/// ```
/// use core_types::payload::sign_extended_payload;
///
/// assert_eq!(sign_extended_payload(0x7FF8_0000_1234_5678), 0x1234_5678);
/// assert_eq!(sign_extended_payload(0xFFFF_8000_0000_1000), 0xFFFF_8000_0000_1000);
/// ```
#[inline]
pub const fn sign_extended_payload(encoded: u64) -> u64 {
    (((encoded << 16) as i64) >> 16) as u64
}

/// Drops the tag and keeps the payload with zeroed upper bits.
#[inline]
pub const fn zero_extended_payload(encoded: u64) -> u64 {
    encoded & PAYLOAD_MASK
}

/// Takes the low 32 bits, for targets where a pointer is a single word.
#[inline]
pub const fn direct_payload(encoded: u64) -> u64 {
    encoded & 0xFFFF_FFFF
}

/// Rebuilds the address stored in `encoded` for the current target.
#[cfg(target_pointer_width = "32")]
#[inline]
pub const fn extract_pointer_bits(encoded: u64) -> usize {
    direct_payload(encoded) as usize
}

/// Rebuilds the address stored in `encoded` for the current target.
#[cfg(all(
    target_pointer_width = "64",
    any(target_arch = "x86_64", target_arch = "riscv64")
))]
#[inline]
pub const fn extract_pointer_bits(encoded: u64) -> usize {
    sign_extended_payload(encoded) as usize
}

/// Rebuilds the address stored in `encoded` for the current target.
#[cfg(all(
    target_pointer_width = "64",
    any(target_arch = "aarch64", target_arch = "powerpc64")
))]
#[inline]
pub const fn extract_pointer_bits(encoded: u64) -> usize {
    zero_extended_payload(encoded) as usize
}

#[cfg(all(
    target_pointer_width = "64",
    not(any(
        target_arch = "x86_64",
        target_arch = "riscv64",
        target_arch = "aarch64",
        target_arch = "powerpc64"
    ))
))]
compile_error!("unknown 64-bit architecture: cannot tell whether cell addresses need sign extension");
