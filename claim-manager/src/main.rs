use alloy_primitives::{Address, U256};
use clap::Parser as _;
use claim_manager::{AssignmentParams, ClaimManagerCliArgs, ClaimManagerParams, ClaimResult, Profile, ProfileSet};
use claim_manager_utils::logging::init_logging;
use tracing::{error, info};

/// Checks the claim manager settings of one work assignment the way an embedding worker
/// would resolve them.
#[derive(Debug, clap::Parser)]
#[command(name = "claim-manager", version, about)]
struct Cli {
    #[command(flatten)]
    claim: ClaimManagerCliArgs,

    /// Stream whose segments are being transcoded.
    #[arg(env = "CLAIM_MANAGER_STREAM_ID", long)]
    stream_id: String,

    #[arg(env = "CLAIM_MANAGER_ASSIGNMENT_ID", long)]
    assignment_id: u64,

    /// Account whose escrow deposit pays for the work.
    #[arg(env = "CLAIM_MANAGER_REQUESTER", long)]
    requester: Address,

    #[arg(env = "CLAIM_MANAGER_PRICE_PER_SEGMENT", long)]
    price_per_segment: u64,

    /// Transcoding profiles of the assignment, comma separated or repeated.
    #[arg(env = "CLAIM_MANAGER_PROFILES", long = "profile", value_delimiter = ',', required = true)]
    profiles: Vec<String>,
}

fn resolve(cli: Cli) -> ClaimResult<(AssignmentParams, ClaimManagerParams, ProfileSet)> {
    let params = ClaimManagerParams::try_from(cli.claim)?;
    let assignment = AssignmentParams {
        stream_id: cli.stream_id,
        assignment_id: U256::from(cli.assignment_id),
        requester: cli.requester,
        price_per_segment: U256::from(cli.price_per_segment),
        profiles: cli.profiles.into_iter().map(Profile::new).collect(),
    };
    let profiles = ProfileSet::new(assignment.profiles.clone())?;
    Ok((assignment, params, profiles))
}

fn main() -> color_eyre::Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    let (assignment, params, profiles) = resolve(cli).inspect_err(|err| {
        error!(error = %err, "Invalid claim manager configuration");
    })?;

    let canonical_order: Vec<&str> = profiles.iter().map(Profile::name).collect();
    info!(
        stream_id = %assignment.stream_id,
        assignment_id = %assignment.assignment_id,
        requester = %assignment.requester,
        price_per_segment = %assignment.price_per_segment,
        profiles = ?canonical_order,
        rpc_timeout = ?params.rpc_timeout,
        first_claim_deadline_blocks = params.first_claim_deadline_blocks,
        "Claim manager configuration is valid"
    );
    Ok(())
}
