//! Stateless admission checks

use tessera_primitives::Nonce;
use tessera_types::SignedTransaction;

use crate::error::InvalidReason;
use crate::pool::PoolConfig;

/// Checks that depend only on the transaction itself
#[derive(Debug, Clone)]
pub struct TxValidator {
    size_limit: usize,
    min_fee: u64,
    verify_signatures: bool,
}

impl TxValidator {
    /// Validator using the limits in `config`
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            size_limit: config.tx_size_limit,
            min_fee: config.min_fee,
            verify_signatures: config.verify_signatures,
        }
    }

    /// Run every check, returning the first failure
    pub fn validate(&self, tx: &SignedTransaction) -> Result<(), InvalidReason> {
        if tx.sender().is_zero() {
            return Err(InvalidReason::ZeroSender);
        }
        if tx.method_name().is_empty() {
            return Err(InvalidReason::EmptyMethod);
        }
        if tx.nonce() == Nonce::MAX {
            return Err(InvalidReason::NonceExhausted(tx.nonce()));
        }
        if tx.size() > self.size_limit {
            return Err(InvalidReason::TooLarge {
                size: tx.size(),
                limit: self.size_limit,
            });
        }
        if tx.fee() < self.min_fee {
            return Err(InvalidReason::FeeTooLow {
                fee: tx.fee(),
                minimum: self.min_fee,
            });
        }
        if self.verify_signatures {
            let recovered = tx
                .recover_signer()
                .map_err(|e| InvalidReason::BadSignature(e.to_string()))?;
            if recovered != tx.sender() {
                return Err(InvalidReason::SenderMismatch { recovered });
            }
        }
        Ok(())
    }
}
