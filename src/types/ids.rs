use uuid::Uuid;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                $name(Uuid::new_v4())
            }

            pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
                Ok($name(Uuid::parse_str(s.trim())?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id_type!(UserId);
define_id_type!(WalletId);
define_id_type!(TransactionId);
define_id_type!(InvoiceId);
define_id_type!(PaymentId);
define_id_type!(EntryId);
define_id_type!(CorrelationId);

impl CorrelationId {
    /// Idempotency key for one posting of this transfer, e.g. `<cid>:debit`.
    pub fn posting_key(&self, step: &str) -> String {
        format!("{}:{}", self.0, step)
    }

    /// Short upper-case token used inside human-facing references.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..12].to_uppercase()
    }
}
