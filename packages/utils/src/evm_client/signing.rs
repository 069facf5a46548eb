use alloy_signer::k256::SecretKey;
use alloy_signer_local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner};

use crate::error::EvmClientError;

/// Builds a signer from either a hex private key (with or without `0x`) or a mnemonic phrase
pub fn make_signer(credential: &str, hd_index: Option<u32>) -> Result<PrivateKeySigner, EvmClientError> {
    let hd_index = hd_index.unwrap_or_default();
    let credential = credential.trim();

    match as_private_key_hex(credential) {
        Some(hex) => {
            // a raw private key can't derive additional keys
            if hd_index > 0 {
                return Err(EvmClientError::DerivationWithPrivateKey);
            }
            let private_key =
                const_hex::decode(hex).map_err(|e| EvmClientError::InvalidPrivateKey(e.into()))?;
            let secret_key = SecretKey::from_slice(&private_key)
                .map_err(|e| EvmClientError::InvalidPrivateKey(anyhow::anyhow!("{e}")))?;
            Ok(PrivateKeySigner::from_signing_key(secret_key.into()))
        }
        None => MnemonicBuilder::<English>::default()
            .phrase(credential)
            .index(hd_index)
            .map_err(|e| EvmClientError::InvalidMnemonic(e.into()))?
            .build()
            .map_err(|e| EvmClientError::InvalidMnemonic(e.into())),
    }
}

// a private key is 32 bytes of hex, anything else is treated as a mnemonic
fn as_private_key_hex(credential: &str) -> Option<&str> {
    let hex = credential.strip_prefix("0x").unwrap_or(credential);

    if credential.starts_with("0x")
        || (hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()))
    {
        Some(hex)
    } else {
        None
    }
}
