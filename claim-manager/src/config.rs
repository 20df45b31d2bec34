use std::time::Duration;

use alloy_primitives::{Address, U256};
use clap::Args;

use crate::error::{ClaimManagerError, ClaimResult};
use crate::profile::{Profile, ProfileSet};

/// Bound on every individual ledger poll.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Blocks after the assignment's creation during which a provisionally assigned worker may
/// still submit the first claim.
pub const BLOCKS_UNTIL_FIRST_CLAIM_DEADLINE: u64 = 230;

#[derive(Debug, Clone, Args)]
pub struct ClaimManagerCliArgs {
    /// Timeout in seconds applied to each ledger poll while waiting for blocks.
    #[arg(env = "CLAIM_MANAGER_RPC_TIMEOUT_SECS", long = "claim-rpc-timeout-secs", default_value_t = 10)]
    pub rpc_timeout_secs: u64,

    /// Number of blocks after the assignment's creation block during which the first claim
    /// can be made without being bound to the assignment.
    #[arg(env = "CLAIM_MANAGER_FIRST_CLAIM_DEADLINE_BLOCKS", long, default_value_t = BLOCKS_UNTIL_FIRST_CLAIM_DEADLINE)]
    pub first_claim_deadline_blocks: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimManagerParams {
    pub rpc_timeout: Duration,
    pub first_claim_deadline_blocks: u64,
}

impl Default for ClaimManagerParams {
    fn default() -> Self {
        Self { rpc_timeout: DEFAULT_RPC_TIMEOUT, first_claim_deadline_blocks: BLOCKS_UNTIL_FIRST_CLAIM_DEADLINE }
    }
}

impl TryFrom<ClaimManagerCliArgs> for ClaimManagerParams {
    type Error = ClaimManagerError;

    fn try_from(args: ClaimManagerCliArgs) -> ClaimResult<Self> {
        if args.rpc_timeout_secs == 0 {
            return Err(ClaimManagerError::InvalidConfiguration("claim rpc timeout must be at least one second".into()));
        }
        Ok(Self {
            rpc_timeout: Duration::from_secs(args.rpc_timeout_secs),
            first_claim_deadline_blocks: args.first_claim_deadline_blocks,
        })
    }
}

/// Identity of the work assignment a manager claims for.
#[derive(Debug, Clone)]
pub struct AssignmentParams {
    pub stream_id: String,
    pub assignment_id: U256,
    /// Account whose deposit pays for the work.
    pub requester: Address,
    pub price_per_segment: U256,
    pub profiles: Vec<Profile>,
}

impl AssignmentParams {
    pub(crate) fn profile_set(&self) -> ClaimResult<ProfileSet> {
        ProfileSet::new(self.profiles.iter().cloned())
    }
}
