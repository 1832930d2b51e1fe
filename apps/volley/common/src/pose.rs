use bevy::{
	ecs::component::Component,
	math::{Quat, Vec3},
	reflect::Reflect,
};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// A position and orientation, like a `Transform` without scale.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default, Reflect)]
pub struct Pose {
	pub trans: Vec3,
	pub rot: Quat,
}

impl Pose {
	pub const IDENTITY: Self = Self {
		trans: Vec3::ZERO,
		rot: Quat::IDENTITY,
	};

	pub fn new(trans: Vec3, rot: Quat) -> Self {
		Self { trans, rot }
	}

	pub fn from_translation(trans: Vec3) -> Self {
		Self {
			trans,
			rot: Quat::IDENTITY,
		}
	}

	/// Composes `other`, expressed in the local frame of `self`, into the frame
	/// `self` is expressed in.
	pub fn mul_pose(&self, other: Pose) -> Pose {
		Pose {
			trans: self.trans + (self.rot * other.trans),
			rot: self.rot * other.rot,
		}
	}

	pub fn transform_point(&self, point: Vec3) -> Vec3 {
		self.trans + self.rot * point
	}

	/// Keeps only the rotation around the vertical axis. Used so that looking
	/// up or down does not swing the shoulders.
	pub fn yaw_only(&self) -> Pose {
		let forward = self.rot * Vec3::NEG_Z;
		let flat = Vec3::new(forward.x, 0.0, forward.z);
		let rot = if flat.length_squared() < 1e-8 {
			// Looking straight up or down, so fall back to where the top of the
			// head points.
			let up = self.rot * Vec3::Y;
			let flat_up = Vec3::new(up.x, 0.0, up.z) * -forward.y.signum();
			if flat_up.length_squared() < 1e-8 {
				Quat::IDENTITY
			} else {
				yaw_rotation(flat_up.normalize())
			}
		} else {
			yaw_rotation(flat.normalize())
		};
		Pose {
			trans: self.trans,
			rot,
		}
	}

	pub fn is_finite(&self) -> bool {
		self.trans.is_finite() && self.rot.is_finite()
	}
}

/// Rotation around +Y taking -Z onto `flat_forward`.
fn yaw_rotation(flat_forward: Vec3) -> Quat {
	let yaw = (-flat_forward.x).atan2(-flat_forward.z);
	Quat::from_rotation_y(yaw)
}

/// A side of the body.
#[derive(
	Serialize, Deserialize, Debug, Display, Clone, Copy, Eq, PartialEq, Hash, Reflect,
)]
pub enum ArmSide {
	Left,
	Right,
}

impl ArmSide {
	pub const BOTH: [ArmSide; 2] = [ArmSide::Left, ArmSide::Right];
}

/// The individually tracked pieces of one arm.
#[derive(
	Serialize, Deserialize, Debug, Display, Clone, Copy, Eq, PartialEq, Hash, Reflect,
)]
pub enum ArmPart {
	UpperArm,
	Elbow,
	Forearm,
	Hand,
}

impl ArmPart {
	pub const ALL: [ArmPart; 4] = [
		ArmPart::UpperArm,
		ArmPart::Elbow,
		ArmPart::Forearm,
		ArmPart::Hand,
	];
}

/// Identifies a part of the player's arms. Attached to the entity rendering
/// and colliding as that part.
#[derive(
	Component,
	Serialize,
	Deserialize,
	Debug,
	Display,
	Clone,
	Copy,
	Eq,
	PartialEq,
	Hash,
	Reflect,
)]
#[display("{side} {part}")]
pub struct ArmPartId {
	pub side: ArmSide,
	pub part: ArmPart,
}

impl ArmPartId {
	pub fn new(side: ArmSide, part: ArmPart) -> Self {
		Self { side, part }
	}

	pub fn all() -> impl Iterator<Item = ArmPartId> {
		ArmSide::BOTH
			.into_iter()
			.flat_map(|side| ArmPart::ALL.into_iter().map(move |part| Self::new(side, part)))
	}
}
