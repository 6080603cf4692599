//! # Gatekeep
//!
//! A register/login gate for game hosts.
//!
//! A host connects once per player, says `Hello` with the player's name and
//! spawn position, and then forwards that player's movement and chat
//! commands. Gatekeep answers with what the host must do: hold the player
//! at the challenge point, reject a move, teleport them back, or show a
//! line of text. Returning players who come back from the same address
//! within the trust window skip the challenge.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gatekeep::prelude::*;
//!
//! # async fn start() -> Result<(), GatekeepError> {
//! let server = GatekeepServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .store_path("data/auth.yml")
//!     .build()
//!     .await?;
//! let handle = server.handle();
//! tokio::spawn(server.run());
//! // ... later, on shutdown:
//! handle.flush().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::GatekeepError;
pub use server::{GatekeepServer, GatekeepServerBuilder, PROTOCOL_VERSION, ServerHandle};

pub use gatekeep_protocol as protocol;
pub use gatekeep_session as session;
pub use gatekeep_store as store;

pub mod prelude {
    pub use crate::{
        GatekeepError, GatekeepServer, GatekeepServerBuilder, PROTOCOL_VERSION, ServerHandle,
    };
    pub use gatekeep_protocol::{
        ClientMessage, Envelope, IdentityKey, Notice, Payload, Position, ServerMessage, Tone,
    };
    pub use gatekeep_session::AuthConfig;
}
