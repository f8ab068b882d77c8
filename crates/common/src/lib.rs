//! Shared identifiers and value types used by every crate in the workspace.

mod ids;
mod money;
mod version;

pub use ids::{OrderId, PaymentId, UserId};
pub use money::Money;
pub use version::Version;
