//! REST and OAuth clients for the two external services (Plex, Simkl),
//! plus server-clock resolution and request cancellation plumbing.

pub mod cancel;
pub mod clock;
pub mod plex;
pub mod simkl;
pub mod traits;
