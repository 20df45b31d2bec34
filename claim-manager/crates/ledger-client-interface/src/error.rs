use alloy_primitives::TxHash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerClientError {
    #[error("Ledger RPC error: {0}")]
    Rpc(String),

    #[error("Transaction {tx_hash} rejected: {reason}")]
    TransactionRejected { tx_hash: TxHash, reason: String },

    #[error("Timed out waiting for {what}")]
    ConfirmationTimeout { what: String },

    #[error("Missing data in ledger response: {0}")]
    MissingData(&'static str),
}

impl LedgerClientError {
    /// Returns true if the error comes from the transport rather than from the chain itself.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::ConfirmationTimeout { .. })
    }
}
