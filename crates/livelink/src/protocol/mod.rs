// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire protocol.
//!
//! Every message travels inside an [`Envelope`] carrying the sender's
//! wall-clock send stamp and string annotations. Payload kinds are a closed
//! [`LinkMessage`] enum decoded once at the transport boundary.
//!
//! Envelope JSON layout:
//! ```text
//! {
//!   "sent_at": 1718000000.125,
//!   "annotations": { "subject_name": "Hero", "role": "Animation" },
//!   "message": { "type": "frame_data", "shape": "AnimationFrameData", ... }
//! }
//! ```

mod data;
mod message;
mod role;

pub use data::{FrameData, StaticData, SubjectKey, SubjectSnapshot};
pub use message::{
    Annotations, Envelope, LinkMessage, ANNOTATION_ROLE, ANNOTATION_SUBJECT_NAME,
    PROTOCOL_VERSION,
};
pub use role::{shapes, RoleRegistry, RoleSchema};
