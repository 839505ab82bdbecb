//! # VRM avatar core
//!
//! Animation runtime for VRM humanoid avatars: motion capture clips from several container
//! formats are retargeted onto a common humanoid rig, blended with crossfades, layered with
//! procedural idle gestures and nudged toward the cursor, while the face blinks, talks and
//! reacts to chat messages.
//!
//! ## Overview
//!
//! - A [`HumanoidRig`](rig::HumanoidRig) resolves the canonical humanoid slots of one
//!   model's [`Skeleton`](skeleton::Skeleton) once, when the model is loaded.
//! - Motion files are decoded into a [`SourceClip`](clip::source::SourceClip) by a
//!   [`MotionDecoder`](decode::MotionDecoder) chosen by extension (`.fbx`, `.bvh`, `.vrma`,
//!   `.vmd`), then [`retarget`](retarget::retarget)ed into a [`Clip`](clip::Clip) bound to
//!   the rig's nodes. The [`MotionLoader`](loader::MotionLoader) does both asynchronously.
//! - [`ProceduralGenerator`](procedural::ProceduralGenerator) synthesizes short idle
//!   gestures from the [built-in movement catalog](procedural::catalog::builtin_movements).
//! - Each character's [`AvatarRuntime`](avatar::AvatarRuntime) owns an
//!   [`AnimationMixer`](mixer::AnimationMixer), an idle scheduler, a sequence player, the
//!   cursor overlay and the expression driver, and advances them once per frame.
//! - The [`AvatarStore`](store::AvatarStore) maps character names to runtimes, hands out
//!   load requests, delivers results only to the avatar that asked for them and keeps the
//!   optional clip cache.
//!
//! Tuning lives in [`AvatarConfig`](config::AvatarConfig) and per model settings in
//! [`ModelSettings`](config::ModelSettings), both loadable from RON:
//!
//! ```ron
//! (
//!     scale: 1.2,
//!     default_expression: "relaxed",
//!     default_motion: "Idle.bvh",
//!     classify: {
//!         "joy": (expression: "happy", motion: "Wave.fbx"),
//!         "curiosity": (sequence: "point,wait:500,nod:loop:true:duration:4000"),
//!     },
//! )
//! ```

pub mod avatar;
pub mod bone_map;
pub mod clip;
pub mod config;
pub mod decode;
pub mod errors;
pub mod expression;
pub mod humanoid;
pub mod id;
pub mod idle;
pub mod interpolation;
pub mod lip_sync;
pub mod loader;
pub mod mixer;
pub mod motion;
pub mod overlay;
pub mod procedural;
pub mod retarget;
pub mod rig;
pub mod scheduler;
pub mod sequence;
pub mod skeleton;
pub mod store;

pub mod prelude {
    pub use super::avatar::{AvatarRuntime, AvatarSetup, LoadPurpose, LoadRequest};
    pub use super::clip::{Clip, ClipProvenance, ClipTrack, source::SourceClip};
    pub use super::config::{AvatarConfig, FeatureToggles, ModelSettings};
    pub use super::decode::{DecodeBinding, DecoderRegistry, MotionDecoder, MotionFormat};
    pub use super::errors::*;
    pub use super::humanoid::HumanoidBone;
    pub use super::id::InstanceId;
    pub use super::loader::{AssetFetch, DirectoryFetch, MotionLoader, ReaderFetch};
    pub use super::mixer::{AnimationMixer, Transition};
    pub use super::motion::MotionCatalog;
    pub use super::retarget::{RetargetOptions, retarget};
    pub use super::rig::HumanoidRig;
    pub use super::skeleton::{NodeId, Skeleton};
    pub use super::store::{AvatarStore, ClipCache, PendingLoad};
}
