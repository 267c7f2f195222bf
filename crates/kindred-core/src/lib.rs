pub mod error;
pub mod events;
pub mod levels;
pub mod locks;
pub mod models;
pub mod storage;

pub use error::{CoreError, CoreResult};
pub use events::{DomainEvent, DomainEventKind};
pub use levels::{AuraTier, badge_for_level, level_for, percentage_to_next_level};
pub use locks::EntityLocks;
pub use models::{
    AuraProfile, BadgeAward, Claim, Collaborator, KindnessPost, NotificationEvent, PayItForward,
    PointSource, PostKind, PostStatus, Visibility,
};
pub use storage::{EventEnvelope, EventStore, KindnessStore, NotificationSink, UserDirectory};
