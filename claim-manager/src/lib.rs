//! Claim and verification manager for off-chain transcoding work paid through an escrow
//! ledger.
//!
//! Transcoded segment receipts are batched into contiguous ranges, each range is committed
//! on-chain through a single merkle root, and every accepted claim then runs its own audit
//! and settlement task in the background.

mod batcher;
pub mod config;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod profile;
pub mod sampler;
pub mod segment;
mod state;
pub mod workflow;


pub use config::{AssignmentParams, ClaimManagerCliArgs, ClaimManagerParams};
pub use error::{ClaimManagerError, ClaimResult};
pub use manager::{ClaimCycleReport, ClaimManager};
pub use profile::{Profile, ProfileSet};
pub use segment::SegmentRecord;
pub use workflow::CommittedBatch;
