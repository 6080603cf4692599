//! Authentication sessions for Gatekeep.
//!
//! This crate is the part that decides things:
//!
//! 1. **Registry** ([`SessionRegistry`]): who is connected, and whether
//!    they are still at the challenge or already authenticated.
//! 2. **Trust** ([`TrustPolicy`]): whether a returning identity may skip
//!    the challenge because it came back from the same address recently.
//! 3. **Controller** ([`SessionController`]): the state machine that turns
//!    a [`HostEvent`] into a list of [`Effect`]s, reading and writing the
//!    credential store along the way.
//!
//! # How it fits in the stack
//!
//! ```text
//! Host (connections, movement, chat commands)
//!     ↓ HostEvent              ↑ Effect
//! SessionController  ← this crate
//!     ↓
//! CredentialStore (gatekeep-store)
//! ```
//!
//! The controller never calls the host. It returns effects and the host
//! carries them out, which keeps every rule testable without a network.

mod check;
mod clock;
mod config;
mod controller;
mod error;
mod event;
mod persist;
mod registry;
mod session;
mod trust;

pub use check::{CheckedSecret, CommandPlan, SecretCheck};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthConfig, HOLDING_BLOCK};
pub use controller::{SessionController, SessionCore, notices};
pub use error::{AuthError, RegistryError};
pub use event::{CommandVerb, Effect, HostEvent};
pub use persist::Persistence;
pub use registry::SessionRegistry;
pub use session::{Session, SessionState};
pub use trust::TrustPolicy;
