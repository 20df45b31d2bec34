use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Meter};

pub static CLAIM_MANAGER_METRICS: Lazy<ClaimManagerMetrics> = Lazy::new(ClaimManagerMetrics::register);

pub struct ClaimManagerMetrics {
    pub claims_submitted: Counter<u64>,
    pub claim_failures: Counter<u64>,
    pub segments_committed: Counter<u64>,
    pub audits_submitted: Counter<u64>,
    pub audit_failures: Counter<u64>,
    pub settlements_completed: Counter<u64>,
    pub settlement_failures: Counter<u64>,
    pub claims_abandoned: Counter<u64>,
}

impl ClaimManagerMetrics {
    pub fn register() -> Self {
        let meter: Meter = global::meter("crates.claim_manager.opentelemetry");

        let claims_submitted = meter
            .u64_counter("claims_submitted")
            .with_description("Count of claims accepted on-chain")
            .with_unit("claims")
            .build();

        let claim_failures = meter
            .u64_counter("claim_failures")
            .with_description("Count of claim cycles aborted by a ledger failure")
            .with_unit("claims")
            .build();

        let segments_committed = meter
            .u64_counter("segments_committed")
            .with_description("Count of segments covered by accepted claims")
            .with_unit("segments")
            .build();

        let audits_submitted = meter
            .u64_counter("audits_submitted")
            .with_description("Count of confirmed segment audits")
            .with_unit("audits")
            .build();

        let audit_failures = meter
            .u64_counter("audit_failures")
            .with_description("Count of segment audits that could not be published or confirmed")
            .with_unit("audits")
            .build();

        let settlements_completed = meter
            .u64_counter("settlements_completed")
            .with_description("Count of confirmed claim settlements")
            .with_unit("claims")
            .build();

        let settlement_failures = meter
            .u64_counter("settlement_failures")
            .with_description("Count of settlement attempts that failed")
            .with_unit("claims")
            .build();

        let claims_abandoned = meter
            .u64_counter("claims_abandoned")
            .with_description("Count of accepted claims left unsettled because the audit anchor was unreadable")
            .with_unit("claims")
            .build();

        Self {
            claims_submitted,
            claim_failures,
            segments_committed,
            audits_submitted,
            audit_failures,
            settlements_completed,
            settlement_failures,
            claims_abandoned,
        }
    }
}
