use claim_manager_commitment::CommitmentError;
use claim_manager_ledger_client_interface::{LedgerClientError, SegmentRange};
use claim_manager_storage_client_interface::StorageClientError;
use thiserror::Error;

use crate::profile::Profile;

pub type ClaimResult<T> = Result<T, ClaimManagerError>;

#[derive(Debug, Error)]
pub enum ClaimManagerError {
    #[error("Cannot find profile: {0}")]
    UnknownProfile(Profile),

    #[error("Receipt for profile {profile} already exists for segment {seq_no}")]
    DuplicateProfileReceipt { seq_no: u64, profile: Profile },

    #[error("Ledger query failed: {0}")]
    LedgerQueryFailed(#[source] LedgerClientError),

    #[error("Transaction rejected: {0}")]
    TransactionRejected(#[source] LedgerClientError),

    #[error("Confirmation failed: {0}")]
    ConfirmationTimeout(#[source] LedgerClientError),

    #[error("Failed to build commitment for segments {range}: {source}")]
    CommitmentBuildFailed {
        range: SegmentRange,
        #[source]
        source: CommitmentError,
    },

    #[error("Failed to publish segment data: {0}")]
    StoragePublishFailed(#[from] StorageClientError),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Claim manager is shut down")]
    ShutDown,
}

impl ClaimManagerError {
    /// Whether running the claim cycle again may succeed without any change on the caller's
    /// side. Only transport failures of the ledger qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::LedgerQueryFailed(err) | Self::TransactionRejected(err) | Self::ConfirmationTimeout(err) => {
                err.is_recoverable()
            }
            _ => false,
        }
    }
}

impl From<LedgerClientError> for ClaimManagerError {
    fn from(err: LedgerClientError) -> Self {
        match err {
            LedgerClientError::Rpc(_) | LedgerClientError::MissingData(_) => Self::LedgerQueryFailed(err),
            LedgerClientError::TransactionRejected { .. } => Self::TransactionRejected(err),
            LedgerClientError::ConfirmationTimeout { .. } => Self::ConfirmationTimeout(err),
        }
    }
}
