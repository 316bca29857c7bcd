//! ElGamal encryption over the multiplicative group (mod p)
//!
//! Every encryption draws a fresh ephemeral exponent k; reusing k across two encryptions
//! under the same key would reveal the ratio of the two plaintexts. Ciphertexts are never
//! multiplied together: each ballot is decrypted on its own.
use crate::{
    arithmetics::{fermat_inverse, mod_mul, mod_pow, sample_range},
    encoding::{encode, BallotPayload},
    error::CryptoError,
    keys::{PublicKey, SecretKey},
    BigInt,
};
use crypto_bigint::rand_core::{CryptoRngCore, OsRng};
use serde::{Deserialize, Serialize};

/// The pair (c1, c2) = (g^k, m * y^k)
#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub struct Ciphertext {
    #[serde(with = "crate::serde_hex")]
    c1: BigInt,
    #[serde(with = "crate::serde_hex")]
    c2: BigInt,
}

impl Ciphertext {
    pub fn new(c1: BigInt, c2: BigInt) -> Self {
        return Self { c1, c2 };
    }

    pub fn get_c1(&self) -> &BigInt {
        &self.c1
    }

    pub fn get_c2(&self) -> &BigInt {
        &self.c2
    }

    /// The stored envelope form: {"c1": hex, "c2": hex}
    pub fn to_envelope(&self) -> Result<String, CryptoError> {
        return Ok(serde_json::to_string(self)?);
    }

    pub fn from_envelope(text: &str) -> Result<Self, CryptoError> {
        return Ok(serde_json::from_str(text)?);
    }
}

/// Encrypt m under the public key {p, g, y}, drawing k from the OS RNG
pub fn encrypt(message: &BigInt, pk: &PublicKey) -> Result<Ciphertext, CryptoError> {
    return encrypt_with_rng(&mut OsRng, message, pk);
}

/// Encrypt m with a fresh ephemeral exponent k drawn uniformly from [1, p-2]:
/// c1 = g^k (mod p), c2 = m * y^k (mod p)
pub fn encrypt_with_rng(
    rng: &mut impl CryptoRngCore,
    message: &BigInt,
    pk: &PublicKey,
) -> Result<Ciphertext, CryptoError> {
    let p = pk.get_p();
    if message >= p {
        return Err(CryptoError::MessageTooLarge);
    }
    let p_minus_two = p.wrapping_sub(&BigInt::from_u8(2));
    let k = sample_range(rng, &BigInt::ONE, &p_minus_two)?;

    let c1 = mod_pow(pk.get_g(), &k, p);
    let shared = mod_pow(pk.get_y(), &k, p);
    let c2 = mod_mul(message, &shared, p);
    return Ok(Ciphertext::new(c1, c2));
}

/// Recover m = c2 * (c1^x)^(-1) (mod p). The inverse is taken as s^(p-2) since p is prime.
pub fn decrypt(ciphertext: &Ciphertext, sk: &SecretKey) -> Result<BigInt, CryptoError> {
    let p = sk.get_p();
    // c1 is a power of g and never zero; c2 is zero only for the message zero
    if ciphertext.c1 == BigInt::ZERO || ciphertext.c1 >= *p || ciphertext.c2 >= *p {
        return Err(CryptoError::CiphertextOutOfRange);
    }
    let s = mod_pow(&ciphertext.c1, sk.get_x(), p);
    let s_inv = fermat_inverse(&s, p);
    return Ok(mod_mul(&ciphertext.c2, &s_inv, p));
}

/// Encode the structured ballot payload and encrypt it under the election's public key
pub fn encrypt_ballot(payload: &BallotPayload, pk: &PublicKey) -> Result<Ciphertext, CryptoError> {
    let message = encode(payload, pk.get_p())?;
    return encrypt(&message, pk);
}
