//! # Domain Identity Newtypes
//!
//! UUID newtypes for every identifier in SafeTrade. A `DisputeId` cannot
//! be passed where a `TransactionId` is expected, and a buyer's `UserId`
//! cannot be confused with a `VehicleId`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a buyer-seller-vehicle trade.
    TransactionId,
    "txn"
);

define_id!(
    /// Unique identifier for a dispute filed against a transaction.
    DisputeId,
    "dispute"
);

define_id!(
    /// Unique identifier for an invoice issued for a transaction.
    InvoiceId,
    "invoice"
);

define_id!(
    /// Unique identifier for a review left after a transaction.
    ReviewId,
    "review"
);

define_id!(
    /// Unique identifier for a marketplace user (buyer, seller, admin).
    UserId,
    "user"
);

define_id!(
    /// Unique identifier for a listed vehicle.
    VehicleId,
    "vehicle"
);

define_id!(
    /// Unique identifier for a dealership brokering a trade.
    DealerId,
    "dealer"
);
