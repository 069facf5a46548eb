use alloy_primitives::{keccak256, Bytes, B256};
use alloy_signer::k256::ecdsa::{
    signature::hazmat::{PrehashVerifier, RandomizedPrehashSigner},
    Signature, SigningKey, VerifyingKey,
};
use rand_core::OsRng;
use sha2::{Digest, Sha256};

use crate::{error::SigningError, task::Task};

/// Prepended to the hex of the message hash before it is digested
pub const MESSAGE_PREFIX: &[u8; 2] = b"\x19\x01";

/// `r || s`, each a 32 byte big-endian integer, no recovery id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseSignature([u8; 64]);

impl ResponseSignature {
    pub fn r(&self) -> &[u8] {
        &self.0[..32]
    }

    pub fn s(&self) -> &[u8] {
        &self.0[32..]
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.0)
    }
}

impl From<Signature> for ResponseSignature {
    fn from(signature: Signature) -> Self {
        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(&signature.to_bytes());
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for ResponseSignature {
    type Error = SigningError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let signature = Signature::from_slice(bytes).map_err(SigningError::Malformed)?;
        Ok(signature.into())
    }
}

/// Derives the message an operator attests to for a task and signs it
///
/// The digest is `sha256(0x19 0x01 || hex(keccak256("Hello " + name)))`,
/// where the hex is lowercase and `0x` prefixed. Signing uses a fresh random
/// nonce each time, so two signatures over the same task differ.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseSigner;

impl ResponseSigner {
    pub fn display_message(task: &Task) -> String {
        format!("Hello {}", task.name)
    }

    pub fn prefixed_message(task: &Task) -> Vec<u8> {
        let hash = keccak256(Self::display_message(task).as_bytes());

        let mut message = MESSAGE_PREFIX.to_vec();
        message.extend_from_slice(const_hex::encode_prefixed(hash).as_bytes());
        message
    }

    pub fn digest(task: &Task) -> B256 {
        B256::from_slice(&Sha256::digest(Self::prefixed_message(task)))
    }

    pub fn sign(&self, key: &SigningKey, task: &Task) -> Result<ResponseSignature, SigningError> {
        let digest = Self::digest(task);

        let signature = RandomizedPrehashSigner::<Signature>::sign_prehash_with_rng(
            key,
            &mut OsRng,
            digest.as_slice(),
        )
        .map_err(SigningError::Ecdsa)?;

        Ok(signature.normalize_s().unwrap_or(signature).into())
    }

    pub fn verify(
        &self,
        key: &VerifyingKey,
        task: &Task,
        signature: &ResponseSignature,
    ) -> Result<(), SigningError> {
        let signature =
            Signature::from_slice(signature.as_bytes()).map_err(SigningError::Malformed)?;

        key.verify_prehash(Self::digest(task).as_slice(), &signature)
            .map_err(SigningError::Verification)
    }
}
