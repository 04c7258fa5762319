//! Routing and correlation state shared by the relay pipeline.
//!
//! ## Module Structure
//!
//! - `table`: Bridge definitions and the live-swappable routing table
//! - `identity`: Source -> destination message id correlation
//! - `antispam`: Rate limit for informational replies
//! - `threads`: Forum topic metadata cache

pub mod antispam;
pub mod identity;
pub mod table;
pub mod threads;

pub use antispam::AntiSpamGuard;
pub use identity::MessageIdentityMap;
pub use table::{Bridge, BridgeTable, DeliveryOptions, Direction, SharedBridgeTable, DEFAULT_FORMAT};
pub use threads::ThreadIndex;
