//! Signed transactions
//!
//! A transaction is a borsh-encoded message signed by a single keypair.
//! The recent blockhash must come from the ledger the transaction targets.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
};

use crate::error::ProtocolError;

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message<I> {
    pub signer: Pubkey,
    pub recent_blockhash: Hash,
    pub instructions: Vec<I>,
}

impl<I: BorshSerialize> Message<I> {
    pub fn serialize(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("Message serialization should not fail")
    }
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction<I> {
    pub message: Message<I>,
    signature: [u8; 64],
}

impl<I: BorshSerialize> SignedTransaction<I> {
    /// Build and sign a transaction
    pub fn new(signer: &Keypair, instructions: Vec<I>, recent_blockhash: Hash) -> Self {
        let message = Message {
            signer: signer.pubkey(),
            recent_blockhash,
            instructions,
        };
        let signature = signer.sign_message(&message.serialize());

        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(signature.as_ref());

        Self {
            message,
            signature: bytes,
        }
    }

    pub fn signature(&self) -> Signature {
        Signature::from(self.signature)
    }

    pub fn signer(&self) -> &Pubkey {
        &self.message.signer
    }

    pub fn instructions(&self) -> &[I] {
        &self.message.instructions
    }

    /// Check the signature against the message signer
    pub fn verify(&self) -> Result<(), ProtocolError> {
        if self
            .signature()
            .verify(self.message.signer.as_ref(), &self.message.serialize())
        {
            Ok(())
        } else {
            Err(ProtocolError::InvalidSignature)
        }
    }

    /// Serialize for network transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("SignedTransaction serialization should not fail")
    }
}

impl<I: BorshDeserialize> SignedTransaction<I> {
    /// Deserialize from network
    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}
