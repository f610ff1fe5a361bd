// ── Domain model ──
//
// Plain data types shared by every component. Nothing here performs I/O.

mod group;
mod profile;
mod session;

pub use group::{GroupId, GroupKind, ProfileGroup, SubscriptionMeta};
pub use profile::{Protocol, ServerProfile, Source};
pub use session::{EngineStatus, ErrorReason, SessionState};
