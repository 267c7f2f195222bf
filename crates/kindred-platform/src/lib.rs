pub mod config;
pub mod contracts;
pub mod db;
pub mod redis_bus;

pub use config::ServiceConfig;
pub use contracts::{
    ActorRequest, AuraProfileResponse, ClaimRequest, ClaimResponse, CollaborateResponse,
    CreatePostRequest, LeaderboardEntry, LeaderboardResponse, PayItForwardRequest, PostResponse,
    ProvenanceBreakdown, UpdateStatusRequest,
};
pub use db::connect_database;
pub use redis_bus::{NOTIFICATIONS_CHANNEL, RedisBus};
