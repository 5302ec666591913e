use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, PartialEq)]
pub enum FoodShareError {
    #[error("unknown status `{0}` (expected pending, approved, declined or completed)")]
    UnknownStatus(String),

    #[error("cannot move {kind} from {from} to {to}")]
    InvalidTransition {
        kind: &'static str,
        from: String,
        to: String,
    },

    #[error("listing {0} not found")]
    ListingNotFound(Uuid),

    #[error("claim {0} not found")]
    ClaimNotFound(Uuid),

    #[error("listing {id} is {status} and cannot be claimed")]
    ListingNotClaimable { id: Uuid, status: String },

    #[error("quantity must be a positive number of kilograms, got {0}")]
    InvalidQuantity(f64),

    #[error("requested {requested:.2} kg but only {available:.2} kg is still available")]
    ClaimExceedsAvailable { requested: f64, available: f64 },
}
