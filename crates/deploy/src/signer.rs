//! Signing identities used to authorize deployment transactions.

use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy};
use alloy_core::primitives::{Address, B256, Bytes};
use alloy_eips::eip2718::Encodable2718;
use alloy_signer::SignerSync;
use alloy_signer_local::{MnemonicBuilder, PrivateKeySigner, coins_bip39::English};
use anyhow::Context;

/// The account that signs and pays for deployments.
#[derive(Debug, Clone)]
pub enum SignerIdentity {
    /// A key held by this process; transactions are signed locally.
    Local(PrivateKeySigner),
    /// An account unlocked on the node itself (dev nodes such as anvil).
    Node(Address),
}

impl SignerIdentity {
    /// Build a local signer from a hex private key (with or without 0x prefix).
    pub fn from_private_key(key: &str) -> Result<Self, anyhow::Error> {
        let signer: PrivateKeySigner = key
            .trim()
            .parse()
            .context("Invalid private key")?;
        Ok(Self::Local(signer))
    }

    /// Derive a local signer from a BIP-39 mnemonic at `m/44'/60'/0'/0/{index}`.
    pub fn from_mnemonic(phrase: &str, index: u32) -> Result<Self, anyhow::Error> {
        let signer = MnemonicBuilder::<English>::default()
            .phrase(phrase.trim())
            .index(index)
            .context("Invalid derivation index")?
            .build()
            .context("Invalid mnemonic")?;
        Ok(Self::Local(signer))
    }

    /// The address of the signing account.
    pub fn address(&self) -> Address {
        match self {
            Self::Local(signer) => signer.address(),
            Self::Node(address) => *address,
        }
    }

    /// Whether transactions must be signed by this process.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

/// Unsigned contract creation transaction, in either fee model.
#[derive(Debug, Clone)]
pub enum CreationTx {
    Eip1559(TxEip1559),
    Legacy(TxLegacy),
}

/// A signed transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone)]
pub struct SignedCreation {
    pub hash: B256,
    pub raw: Bytes,
}

/// Sign a creation transaction with a local key and EIP-2718 encode it.
pub fn sign_creation(
    signer: &PrivateKeySigner,
    tx: CreationTx,
) -> Result<SignedCreation, anyhow::Error> {
    let envelope: TxEnvelope = match tx {
        CreationTx::Eip1559(tx) => {
            let signature = signer
                .sign_hash_sync(&tx.signature_hash())
                .context("Failed to sign transaction")?;
            tx.into_signed(signature).into()
        }
        CreationTx::Legacy(tx) => {
            let signature = signer
                .sign_hash_sync(&tx.signature_hash())
                .context("Failed to sign transaction")?;
            tx.into_signed(signature).into()
        }
    };

    Ok(SignedCreation {
        hash: *envelope.tx_hash(),
        raw: envelope.encoded_2718().into(),
    })
}
