//! Convenience functions for arithmetics in the multiplicative group (mod p)
use crate::{error::CryptoError, BigInt, LIMBS};
use crypto_bigint::{
    modular::runtime_mod::{DynResidue, DynResidueParams},
    rand_core::CryptoRngCore,
    Encoding, NonZero, RandomMod,
};

/// Sample uniformly from the inclusive range [low, high]
pub fn sample_range(
    rng: &mut impl CryptoRngCore,
    low: &BigInt,
    high: &BigInt,
) -> Result<BigInt, CryptoError> {
    if high < low {
        return Err(CryptoError::MalformedKey("empty sampling range".into()));
    }
    let width = high.wrapping_sub(low).wrapping_add(&BigInt::ONE);
    let width: Option<NonZero<BigInt>> = NonZero::new(width).into();
    let width = width.ok_or_else(|| CryptoError::MalformedKey("sampling range overflow".into()))?;
    let offset = BigInt::random_mod(rng, &width);
    return Ok(offset.wrapping_add(low));
}

/// Lift a value into the residue ring (mod modulus). The modulus must be odd.
pub fn residue(val: &BigInt, modulus: &BigInt) -> DynResidue<LIMBS> {
    return DynResidue::new(val, DynResidueParams::new(modulus));
}

/// base ** exponent (mod modulus), for exponents no wider than the modulus
pub fn mod_pow(base: &BigInt, exponent: &BigInt, modulus: &BigInt) -> BigInt {
    return residue(base, modulus)
        .pow_bounded_exp(exponent, modulus.bits())
        .retrieve();
}

/// a * b (mod modulus)
pub fn mod_mul(a: &BigInt, b: &BigInt, modulus: &BigInt) -> BigInt {
    return residue(a, modulus).mul(&residue(b, modulus)).retrieve();
}

/// Multiplicative inverse of s under a prime modulus, computed as s ** (p - 2) (mod p).
/// Valid by Fermat's little theorem only when p is prime and s is not a multiple of p.
pub fn fermat_inverse(s: &BigInt, p: &BigInt) -> BigInt {
    let exponent = p.wrapping_sub(&BigInt::from_u8(2));
    return mod_pow(s, &exponent, p);
}

/// Big-endian bytes with the leading zeros stripped; zero becomes the empty string
pub fn to_minimal_be_bytes(val: &BigInt) -> Vec<u8> {
    let bytes = val.to_be_bytes();
    let start = bytes
        .iter()
        .position(|byte| *byte != 0)
        .unwrap_or(bytes.len());
    return bytes[start..].to_vec();
}

/// Interpret a big-endian byte string of any length up to the integer capacity
pub fn from_be_bytes(bytes: &[u8]) -> Option<BigInt> {
    if bytes.len() > BigInt::BYTES {
        return None;
    }
    let mut padded = vec![0u8; BigInt::BYTES];
    padded[BigInt::BYTES - bytes.len()..].copy_from_slice(bytes);
    return Some(BigInt::from_be_slice(&padded));
}
