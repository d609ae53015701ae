//! Transactions

use bytes::{BufMut, Bytes, BytesMut};
use tessera_crypto::{keccak256, recover_signer, sign_hash, CryptoError, PrivateKey, Signature};
use tessera_primitives::{Address, Nonce, H256};

/// Transaction identifier
pub type TxHash = H256;

/// Unsigned transaction body
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// Originating account
    pub sender: Address,
    /// Sender's sequence number
    pub nonce: Nonce,
    /// Target account
    pub to: Address,
    /// Method invoked on the target
    pub method_name: String,
    /// Opaque call parameters
    pub params: Bytes,
    /// Fee offered
    pub fee: u64,
}

impl Transaction {
    /// Create a call with empty params and zero fee
    pub fn new(sender: Address, nonce: Nonce, to: Address, method_name: impl Into<String>) -> Self {
        Self {
            sender,
            nonce,
            to,
            method_name: method_name.into(),
            params: Bytes::new(),
            fee: 0,
        }
    }

    /// Set params
    pub fn with_params(mut self, params: impl Into<Bytes>) -> Self {
        self.params = params.into();
        self
    }

    /// Set fee
    pub fn with_fee(mut self, fee: u64) -> Self {
        self.fee = fee;
        self
    }

    /// Canonical byte encoding covered by the signature.
    ///
    /// `sender | to | nonce | fee | len(method) | method | len(params) | params`,
    /// integers big-endian.
    pub fn signing_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(
            Address::LEN * 2 + 8 * 2 + 4 * 2 + self.method_name.len() + self.params.len(),
        );
        buf.put_slice(self.sender.as_bytes());
        buf.put_slice(self.to.as_bytes());
        buf.put_u64(self.nonce);
        buf.put_u64(self.fee);
        buf.put_u32(self.method_name.len() as u32);
        buf.put_slice(self.method_name.as_bytes());
        buf.put_u32(self.params.len() as u32);
        buf.put_slice(&self.params);
        buf.freeze()
    }

    /// Hash that gets signed
    pub fn signing_hash(&self) -> H256 {
        keccak256(&self.signing_payload())
    }

    /// Sign with `key`. The key is not required to match `sender`.
    pub fn sign(self, key: &PrivateKey) -> Result<SignedTransaction, CryptoError> {
        let signature = sign_hash(&self.signing_hash(), key)?;
        Ok(SignedTransaction::new(self, signature))
    }
}

/// Transaction with its signature and cached hash
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    tx: Transaction,
    signature: Signature,
    hash: TxHash,
    size: usize,
}

impl SignedTransaction {
    /// Attach a signature, computing the transaction hash
    pub fn new(tx: Transaction, signature: Signature) -> Self {
        let mut encoded = BytesMut::from(&tx.signing_payload()[..]);
        encoded.put_slice(signature.as_bytes());
        let hash = keccak256(&encoded);
        Self {
            size: encoded.len(),
            tx,
            signature,
            hash,
        }
    }

    /// Transaction hash
    pub fn hash(&self) -> TxHash {
        self.hash
    }

    /// Originating account
    pub fn sender(&self) -> Address {
        self.tx.sender
    }

    /// Sender sequence number
    pub fn nonce(&self) -> Nonce {
        self.tx.nonce
    }

    /// Target account
    pub fn to(&self) -> Address {
        self.tx.to
    }

    /// Invoked method
    pub fn method_name(&self) -> &str {
        &self.tx.method_name
    }

    /// Call params
    pub fn params(&self) -> &Bytes {
        &self.tx.params
    }

    /// Offered fee
    pub fn fee(&self) -> u64 {
        self.tx.fee
    }

    /// Signature
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Unsigned body
    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    /// Encoded size in bytes, payload plus signature
    pub fn size(&self) -> usize {
        self.size
    }

    /// Recover the address that signed this transaction
    pub fn recover_signer(&self) -> Result<Address, CryptoError> {
        recover_signer(&self.tx.signing_hash(), &self.signature)
    }
}
