//! Engine agnostic core of the volleyball trainer: the player's forearms, how
//! they hit balls, and when they are allowed to.

pub mod contact;
pub mod grab;
pub mod ik;
pub mod pose;
pub mod receive;
pub mod rig;
pub mod settings;
pub mod velocity;

pub use crate::contact::{ColliderKind, CollisionResponder, ContactInput, ImpactSound};
pub use crate::grab::{BallRegistry, CollisionGate, GrabStateTracker};
pub use crate::ik::{solve_elbow, TwoBoneIk};
pub use crate::pose::{ArmPart, ArmPartId, ArmSide, Pose};
pub use crate::receive::{platform_velocity, PlatformQuad, PlatformTransition, ReceivePlatform};
pub use crate::rig::{IkArmRig, TrackedPoses};
pub use crate::settings::{SettingsError, TrainerSettings};
pub use crate::velocity::VelocityTracker;
