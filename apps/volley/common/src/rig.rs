//! The player's forearms, driven from head and controller poses.
//!
//! Each frame the shoulders are placed relative to the head, the hands follow
//! the controllers, and [`TwoBoneIk`] fills in the elbows. The rig is purely
//! kinematic: it never applies forces, it only publishes poses and part
//! velocities for the physics side to read.

use bevy::{
	ecs::system::Resource,
	math::{Quat, Vec3},
	reflect::Reflect,
	render::color::Color,
};
use tracing::{debug, warn};

use crate::ik::{Reach, Segment, TwoBoneIk};
use crate::pose::{ArmPart, ArmPartId, ArmSide, Pose};
use crate::settings::{ArmSettings, HandOffset, TrainerSettings};
use crate::velocity::VelocityTracker;

/// How far down the hands hang, as a fraction of full reach, while there is
/// no controller pose yet.
const REST_REACH_FRACTION: f32 = 0.95;

/// Latest tracking data. A `None` means the pose could not be resolved this
/// frame.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Default, Reflect)]
pub struct TrackedPoses {
	pub head: Option<Pose>,
	pub left: Option<Pose>,
	pub right: Option<Pose>,
}

impl TrackedPoses {
	pub fn controller(&self, side: ArmSide) -> Option<Pose> {
		match side {
			ArmSide::Left => self.left,
			ArmSide::Right => self.right,
		}
	}
}

/// One arm.
#[derive(Debug, Clone)]
pub struct ArmRig {
	side: ArmSide,
	ik: TwoBoneIk,
	shoulder_offset: Vec3,
	hand_offset: HandOffset,
	bend_hint: Vec3,
	last_head: Option<Pose>,
	last_controller: Option<Pose>,
	pub shoulder: Pose,
	pub elbow: Vec3,
	pub hand: Pose,
	pub upper_arm: Segment,
	pub forearm: Segment,
	pub reach: Reach,
}

impl ArmRig {
	pub fn new(side: ArmSide, settings: &ArmSettings) -> Self {
		let ik = TwoBoneIk::new(settings.upper_arm_length, settings.forearm_length);
		let shoulder = Pose::from_translation(settings.shoulder_offset(side));
		let bend_hint = settings.bend_hint.try_normalize().unwrap_or(Vec3::NEG_Y);
		let elbow = shoulder.trans + bend_hint * ik.upper_len;
		let hand = Pose::from_translation(elbow + bend_hint * ik.lower_len);
		Self {
			side,
			ik,
			shoulder_offset: settings.shoulder_offset(side),
			hand_offset: settings.hand_offset(side),
			bend_hint,
			last_head: None,
			last_controller: None,
			shoulder,
			elbow,
			hand,
			upper_arm: Segment::between(shoulder.trans, elbow),
			forearm: Segment::between(elbow, hand.trans),
			reach: Reach::OverExtended,
		}
	}

	pub fn side(&self) -> ArmSide {
		self.side
	}

	pub fn ik(&self) -> TwoBoneIk {
		self.ik
	}

	/// Whether the head has ever been tracked. Until then the rig stays in its
	/// initial rest pose.
	pub fn is_anchored(&self) -> bool {
		self.last_head.is_some()
	}

	/// Hand target for a controller pose.
	pub fn hand_target(&self, controller: Pose) -> Pose {
		Pose {
			trans: controller.trans + controller.rot * self.hand_offset.position,
			rot: (controller.rot * self.hand_offset.rotation).normalize(),
		}
	}

	/// Shoulder anchor for a head pose.
	pub fn shoulder_anchor(&self, head: Pose) -> Pose {
		let body = head.yaw_only();
		Pose {
			trans: body.transform_point(self.shoulder_offset),
			rot: body.rot,
		}
	}

	/// Re-solves the arm. Missing poses fall back to the last known ones so a
	/// tracking hiccup freezes the arm instead of snapping it to the origin.
	pub fn update(&mut self, head: Option<Pose>, controller: Option<Pose>) {
		if let Some(head) = head.filter(Pose::is_finite) {
			self.last_head = Some(head);
		}
		if let Some(controller) = controller.filter(Pose::is_finite) {
			self.last_controller = Some(controller);
		}
		let Some(head) = self.last_head else {
			return;
		};

		self.shoulder = self.shoulder_anchor(head);
		self.hand = match self.last_controller {
			Some(controller) => self.hand_target(controller),
			None => Pose {
				trans: self.shoulder.trans
					+ self.bend_hint * self.ik.max_reach() * REST_REACH_FRACTION,
				rot: self.shoulder.rot,
			},
		};

		let solution = self.ik.solve(self.shoulder.trans, self.hand.trans, self.bend_hint);
		self.elbow = solution.elbow;
		self.reach = solution.reach;
		self.upper_arm = Segment::between(self.shoulder.trans, self.elbow);
		self.forearm = Segment::between(self.elbow, self.hand.trans);
	}

	pub fn part_position(&self, part: ArmPart) -> Vec3 {
		match part {
			ArmPart::UpperArm => self.upper_arm.midpoint,
			ArmPart::Elbow => self.elbow,
			ArmPart::Forearm => self.forearm.midpoint,
			ArmPart::Hand => self.hand.trans,
		}
	}

	/// World pose of the primitive representing `part`. Segments are oriented
	/// with +Y along the bone.
	pub fn part_pose(&self, part: ArmPart) -> Pose {
		match part {
			ArmPart::UpperArm => Pose::new(self.upper_arm.midpoint, self.upper_arm.rotation),
			ArmPart::Elbow => Pose::new(self.elbow, self.forearm.rotation),
			ArmPart::Forearm => Pose::new(self.forearm.midpoint, self.forearm.rotation),
			ArmPart::Hand => self.hand,
		}
	}
}

/// Visual color of the arms, overridable for feedback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmColor {
	base: Color,
	current: Color,
}

impl ArmColor {
	pub fn new(base: Color) -> Self {
		Self {
			base,
			current: base,
		}
	}

	pub fn set(&mut self, color: Color) {
		self.current = color;
	}

	pub fn reset(&mut self) {
		self.current = self.base;
	}

	pub fn current(&self) -> Color {
		self.current
	}

	pub fn is_overridden(&self) -> bool {
		self.current != self.base
	}
}

/// Both arms plus the velocities of their parts.
#[derive(Resource, Debug, Clone)]
pub struct IkArmRig {
	pub left: ArmRig,
	pub right: ArmRig,
	velocities: VelocityTracker<ArmPartId>,
	color: ArmColor,
	tracking_lost: bool,
}

impl IkArmRig {
	pub fn new(settings: &TrainerSettings) -> Self {
		Self {
			left: ArmRig::new(ArmSide::Left, &settings.arms),
			right: ArmRig::new(ArmSide::Right, &settings.arms),
			velocities: VelocityTracker::new(settings.velocity.smoothing),
			color: ArmColor::new(settings.arms.base_color),
			tracking_lost: false,
		}
	}

	pub fn arm(&self, side: ArmSide) -> &ArmRig {
		match side {
			ArmSide::Left => &self.left,
			ArmSide::Right => &self.right,
		}
	}

	fn arm_mut(&mut self, side: ArmSide) -> &mut ArmRig {
		match side {
			ArmSide::Left => &mut self.left,
			ArmSide::Right => &mut self.right,
		}
	}

	/// Solves both arms and records part velocities. Must run once per frame
	/// before anything reads [`Self::arm_velocity`].
	pub fn update(&mut self, poses: &TrackedPoses, dt: f32) {
		let lost = poses.head.is_none()
			|| poses.left.is_none()
			|| poses.right.is_none();
		if lost != self.tracking_lost {
			if lost {
				warn!(?poses, "tracking lost, holding last known arm pose");
			} else {
				debug!("tracking recovered");
			}
			self.tracking_lost = lost;
		}

		for side in ArmSide::BOTH {
			self.arm_mut(side).update(poses.head, poses.controller(side));
		}
		for id in ArmPartId::all() {
			let position = self.arm(id.side).part_position(id.part);
			self.velocities.update(id, position, dt);
		}
	}

	pub fn arm_velocity(&self, part: ArmPartId) -> Vec3 {
		self.velocities.velocity(&part)
	}

	pub fn set_smoothing(&mut self, smoothing: f32) {
		self.velocities.set_smoothing(smoothing);
	}

	pub fn set_arm_color(&mut self, color: Color) {
		self.color.set(color);
	}

	pub fn reset_arm_color(&mut self) {
		self.color.reset();
	}

	pub fn arm_color(&self) -> Color {
		self.color.current()
	}

	pub fn is_tracking_lost(&self) -> bool {
		self.tracking_lost
	}

	/// Rotation of the body frame the shoulders hang from.
	pub fn body_rotation(&self) -> Quat {
		self.left.shoulder.rot
	}
}
