//! The key pairs
use crate::{
    arithmetics::{mod_pow, sample_range},
    error::CryptoError,
    BigInt, MAX_MODULUS_BITS, MIN_MODULUS_BITS,
};
use crypto_bigint::rand_core::{CryptoRngCore, OsRng};
use log::debug;
use serde::{Deserialize, Serialize};

/// The public half {p, g, y}, distributed to whoever encrypts ballots
#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub struct PublicKey {
    #[serde(with = "crate::serde_hex")]
    p: BigInt,
    #[serde(with = "crate::serde_hex")]
    g: BigInt,
    #[serde(with = "crate::serde_hex", rename = "public_key")]
    y: BigInt,
}

impl PublicKey {
    /// Instantiate an instance with no check
    pub fn new(p: BigInt, g: BigInt, y: BigInt) -> Self {
        return Self { p, g, y };
    }

    pub fn get_p(&self) -> &BigInt {
        &self.p
    }

    pub fn get_g(&self) -> &BigInt {
        &self.g
    }

    pub fn get_y(&self) -> &BigInt {
        &self.y
    }

    /// Check the shape of key material loaded from storage: the modulus is an odd prime of a
    /// supported size and g, y are group elements. The subgroup generated by g is not checked.
    pub fn validate(&self) -> Result<(), CryptoError> {
        validate_modulus(&self.p)?;
        let p_minus_one = self.p.wrapping_sub(&BigInt::ONE);
        if self.g < BigInt::from_u8(2) || self.g >= p_minus_one {
            return Err(CryptoError::MalformedKey("generator outside [2, p-2]".into()));
        }
        if self.y == BigInt::ZERO || self.y >= self.p {
            return Err(CryptoError::MalformedKey("public exponent outside the group".into()));
        }
        return Ok(());
    }

    pub fn to_json(&self) -> Result<String, CryptoError> {
        return Ok(serde_json::to_string(self)?);
    }

    pub fn from_json(text: &str) -> Result<Self, CryptoError> {
        let pk: Self = serde_json::from_str(text)?;
        pk.validate()?;
        return Ok(pk);
    }
}

/// The private half {p, x}, restricted to tally-time use
#[derive(Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub struct SecretKey {
    #[serde(with = "crate::serde_hex")]
    p: BigInt,
    #[serde(with = "crate::serde_hex", rename = "private_key")]
    x: BigInt,
}

impl SecretKey {
    /// Instantiate an instance with no check
    pub fn new(p: BigInt, x: BigInt) -> Self {
        Self { p, x }
    }

    pub fn get_p(&self) -> &BigInt {
        &self.p
    }

    pub fn get_x(&self) -> &BigInt {
        &self.x
    }

    pub fn validate(&self) -> Result<(), CryptoError> {
        validate_modulus(&self.p)?;
        let p_minus_one = self.p.wrapping_sub(&BigInt::ONE);
        if self.x == BigInt::ZERO || self.x >= p_minus_one {
            return Err(CryptoError::MalformedKey("private exponent outside [1, p-2]".into()));
        }
        return Ok(());
    }

    pub fn to_json(&self) -> Result<String, CryptoError> {
        return Ok(serde_json::to_string(self)?);
    }

    pub fn from_json(text: &str) -> Result<Self, CryptoError> {
        let sk: Self = serde_json::from_str(text)?;
        sk.validate()?;
        return Ok(sk);
    }
}

// Keep the exponent out of logs and panic messages
impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("p", &self.p)
            .field("x", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct KeyPair {
    pk: PublicKey,
    sk: SecretKey,
}

impl KeyPair {
    pub fn new(pk: PublicKey, sk: SecretKey) -> Self {
        Self { pk, sk }
    }

    pub fn get_pk(&self) -> &PublicKey {
        &self.pk
    }

    pub fn get_sk(&self) -> &SecretKey {
        &self.sk
    }

    /// Split into the public half and the private half
    pub fn split(self) -> (PublicKey, SecretKey) {
        return (self.pk, self.sk);
    }

    /// Check that y = g^x (mod p) holds exactly
    pub fn check_consistency(&self) -> bool {
        if self.pk.p != self.sk.p {
            return false;
        }
        return mod_pow(&self.pk.g, &self.sk.x, &self.pk.p) == self.pk.y;
    }

    /// Generate a key pair with a modulus of the given bit length, drawing from the OS RNG
    pub fn keygen(modulus_bits: usize) -> Result<Self, CryptoError> {
        return Self::keygen_with_rng(&mut OsRng, modulus_bits);
    }

    /// Generate a probable prime p, then a generator candidate g uniformly from [2, p-2] and a
    /// private exponent x uniformly from [1, p-2]; the public exponent is y = g^x (mod p).
    ///
    /// The generator is not checked to span a subgroup of any particular order, and p is not
    /// required to be a safe prime.
    pub fn keygen_with_rng(
        rng: &mut impl CryptoRngCore,
        modulus_bits: usize,
    ) -> Result<Self, CryptoError> {
        if !(MIN_MODULUS_BITS..=MAX_MODULUS_BITS).contains(&modulus_bits) {
            return Err(CryptoError::UnsupportedModulusBits(modulus_bits));
        }
        debug!("searching for a {modulus_bits}-bit prime modulus");
        let p: BigInt = crypto_primes::generate_prime_with_rng(rng, Some(modulus_bits));
        let p_minus_two = p.wrapping_sub(&BigInt::from_u8(2));

        let g = sample_range(rng, &BigInt::from_u8(2), &p_minus_two)?;
        let x = sample_range(rng, &BigInt::ONE, &p_minus_two)?;
        let y = mod_pow(&g, &x, &p);
        debug!("generated {modulus_bits}-bit election key pair");

        return Ok(Self::new(PublicKey::new(p, g, y), SecretKey::new(p, x)));
    }
}

/// Generate the per-election key quadruple {p, g, x, y}
pub fn generate_election_keys(modulus_bits: usize) -> Result<KeyPair, CryptoError> {
    return KeyPair::keygen(modulus_bits);
}

fn validate_modulus(p: &BigInt) -> Result<(), CryptoError> {
    let bits = p.bits();
    if !(MIN_MODULUS_BITS..=MAX_MODULUS_BITS).contains(&bits) {
        return Err(CryptoError::UnsupportedModulusBits(bits));
    }
    if !crypto_primes::is_prime(p) {
        return Err(CryptoError::MalformedKey("modulus is not prime".into()));
    }
    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, TEST_MODULUS_BITS};

    #[test]
    fn test_keygen_invariants() {
        let keypair = testing::keypair();
        let p = keypair.get_pk().get_p();
        let p_minus_two = p.wrapping_sub(&BigInt::from_u8(2));

        assert_eq!(p.bits(), TEST_MODULUS_BITS);
        assert!(crypto_primes::is_prime(p));
        assert!(*keypair.get_pk().get_g() >= BigInt::from_u8(2));
        assert!(*keypair.get_pk().get_g() <= p_minus_two);
        assert!(*keypair.get_sk().get_x() >= BigInt::ONE);
        assert!(*keypair.get_sk().get_x() <= p_minus_two);
        assert!(keypair.check_consistency());
    }

    #[test]
    fn test_keygen_rejects_unsupported_sizes() {
        assert!(matches!(
            KeyPair::keygen(MIN_MODULUS_BITS - 1),
            Err(CryptoError::UnsupportedModulusBits(_))
        ));
        assert!(matches!(
            KeyPair::keygen(MAX_MODULUS_BITS + 1),
            Err(CryptoError::UnsupportedModulusBits(_))
        ));
    }

    /// Key halves survive their stored JSON form bit for bit
    #[test]
    fn test_key_serialization() {
        let (pk, sk) = testing::keypair().split();
        let pk_json = pk.to_json().unwrap();
        let sk_json = sk.to_json().unwrap();
        assert!(pk_json.contains("\"public_key\""));
        assert!(sk_json.contains("\"private_key\""));
        assert_eq!(PublicKey::from_json(&pk_json).unwrap(), pk);
        assert_eq!(SecretKey::from_json(&sk_json).unwrap(), sk);
    }

    #[test]
    fn test_rejects_composite_modulus() {
        let pk = PublicKey::new(
            BigInt::from_u64(0xffff_ffff_ffff_fffd).wrapping_mul(&BigInt::from_u8(3)),
            BigInt::from_u8(2),
            BigInt::from_u8(4),
        );
        assert!(pk.validate().is_err());
    }

    #[test]
    fn test_secret_key_debug_is_redacted() {
        let sk = testing::keypair().get_sk();
        assert!(format!("{sk:?}").contains("<redacted>"));
    }
}
