//! Infrastructure layer: the live room registry, the file producer
//! pipeline, and the signed-token codec.

pub mod fileprod;
pub mod registry;
pub mod token;

pub use registry::{
    BroadcastOpts, BroadcastOutcome, MemberHandle, OriginatorEcho, Outbound, Room, RoomGroup,
    UnicastOutcome,
};
pub use token::TokenSigner;
