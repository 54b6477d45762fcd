//! Session bootstrap for the field app.
//!
//! Decides on startup whether the user lands on the main screen, the
//! pending-approval screen, or the login screen, using the stored token,
//! an online profile check and a cached session for offline starts.

pub mod bootstrap;
pub mod cache;
pub mod error;
pub mod profile;
pub mod reachability;

pub use bootstrap::{Route, SessionBootstrap};
pub use cache::{CachedSession, FileSessionCache, SessionCache};
pub use error::SessionError;
pub use profile::{HttpProfileApi, Profile, ProfileApi};
pub use reachability::{Reachability, TcpReachability};
