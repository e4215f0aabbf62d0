//! UseCase layer.
//!
//! Business logic invoked from the UI layer: connection registration,
//! disconnection, and inbound frame dispatch.

pub mod connect_client;
pub mod disconnect_client;
pub mod dispatch_frame;
pub mod error;

pub use connect_client::{ConnectClientUseCase, ConnectParams, ConnectedClient};
pub use disconnect_client::DisconnectClientUseCase;
pub use dispatch_frame::{ClientContext, DispatchFrameUseCase};
pub use error::SessionError;
