//! Try-Confirm-Cancel transaction fencing.
//!
//! A participant in a distributed transaction executes three phases:
//! a tentative prepare, then either a confirm or a cancel dispatched by
//! the transaction manager. Message delivery is at-least-once and can be
//! reordered, so every phase must be fenced: duplicates acknowledged,
//! a confirm racing a cancel serialized, and a cancel arriving before its
//! prepare recorded so the late prepare cannot resurrect the branch.
//!
//! [`Fence`] enforces those rules around caller-supplied business
//! callbacks, backed by one fence record per branch in a
//! [`fenceline_store::Engine`]. [`limit::TokenBucket`] is the matching
//! admission gate for the inbound side of the request pipeline.
//!
//! ```ignore
//! use fenceline::{BranchContext, Fence, MemoryStore};
//!
//! let fence = Fence::new(MemoryStore::new());
//! let ctx = BranchContext::new("tx-1", "b-1", "debit");
//!
//! fence
//!     .prepare(&ctx, |tx| {
//!         Box::pin(async move {
//!             // tentative business write inside `tx`
//!             Ok(Reservation { amount: 100 })
//!         })
//!     })
//!     .await?;
//! ```

#![forbid(unsafe_code)]

mod context;
mod error;
mod fence;

pub mod limit;
pub mod metrics;

pub use context::BranchContext;
pub use error::{FenceError, Result};
pub use fence::{Fence, Phase};
pub use limit::{RateLimitConfig, TokenBucket};

pub use fenceline_store::{BranchState, Engine, FenceRecord, StoreError};
#[cfg(feature = "memory")]
pub use fenceline_store::{MemorySession, MemoryStore};
#[cfg(feature = "pg")]
pub use fenceline_store::PgStore;
