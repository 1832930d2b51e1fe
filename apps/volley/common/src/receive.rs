//! Forearm passing platform.
//!
//! When both hands are held together below the shoulders the forearms are
//! treated as a single flat surface, spanned by a quad through both elbows and
//! both hands. The quad doubles as the visual and as a thin convex collider.

use bevy::math::Vec3;
use tracing::debug;

use crate::pose::{ArmPart, ArmPartId, ArmSide};
use crate::rig::IkArmRig;
use crate::settings::{ReceiveSettings, TrainerSettings};

/// Whether the hands are in a receiving position.
///
/// Heights are relative to the average shoulder height, so both window bounds
/// are usually negative.
pub fn is_receive_pose(
	hands: [Vec3; 2],
	shoulders: [Vec3; 2],
	settings: &ReceiveSettings,
) -> bool {
	let [left_hand, right_hand] = hands;
	if left_hand.distance(right_hand) > settings.max_hand_distance {
		return false;
	}
	let hand_height = (left_hand.y + right_hand.y) * 0.5;
	let shoulder_height = (shoulders[0].y + shoulders[1].y) * 0.5;
	let relative = hand_height - shoulder_height;
	relative >= settings.min_height_below_shoulders
		&& relative <= settings.max_height_below_shoulders
}

/// Velocity of the platform surface, the mean tracked velocity of the elbows and
/// hands spanning it.
pub fn platform_velocity(rig: &IkArmRig) -> Vec3 {
	let corners = ArmSide::BOTH
		.into_iter()
		.flat_map(|side| [ArmPart::Elbow, ArmPart::Hand].map(|p| ArmPartId::new(side, p)));
	corners.map(|id| rig.arm_velocity(id)).sum::<Vec3>() * 0.25
}

/// Quad spanned by the forearms, in the order left elbow, left hand, right
/// hand, right elbow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlatformQuad {
	pub corners: [Vec3; 4],
}

impl PlatformQuad {
	/// Triangle list over [`Self::corners`].
	pub const INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

	pub fn new(corners: [Vec3; 4]) -> Self {
		Self { corners }
	}

	pub fn from_rig(rig: &IkArmRig) -> Self {
		Self::new([
			rig.left.elbow,
			rig.left.hand.trans,
			rig.right.hand.trans,
			rig.right.elbow,
		])
	}

	pub fn center(&self) -> Vec3 {
		self.corners.iter().copied().sum::<Vec3>() * 0.25
	}

	/// Unit normal of the quad, flipped to face upwards. The quad may not be
	/// planar, so this is taken from the cross product of its diagonals.
	pub fn normal(&self) -> Vec3 {
		let [a, b, c, d] = self.corners;
		let n = (c - a).cross(d - b).try_normalize().unwrap_or(Vec3::Y);
		if n.y < 0.0 {
			-n
		} else {
			n
		}
	}

	pub fn is_finite(&self) -> bool {
		self.corners.iter().all(|c| c.is_finite())
	}

	/// Corners relative to the center, for a mesh placed at [`Self::center`].
	pub fn local_corners(&self) -> [Vec3; 4] {
		let center = self.center();
		self.corners.map(|c| c - center)
	}

	/// Points of a slab of `thickness` centered on the quad, relative to
	/// [`Self::center`]. A flat quad has no volume, so the collider is built as
	/// the convex hull of these.
	pub fn collision_points(&self, thickness: f32) -> [Vec3; 8] {
		let half = self.normal() * (thickness * 0.5);
		let local = self.local_corners();
		let mut points = [Vec3::ZERO; 8];
		for (i, corner) in local.into_iter().enumerate() {
			points[i] = corner + half;
			points[i + 4] = corner - half;
		}
		points
	}
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PlatformTransition {
	Activated,
	Deactivated,
}

/// Activation state of the platform, re-derived every frame.
#[derive(Debug, Clone, Default)]
pub struct ReceivePlatform {
	active: bool,
	quad: Option<PlatformQuad>,
}

impl ReceivePlatform {
	pub fn is_active(&self) -> bool {
		self.active
	}

	/// Quad for this frame, `None` while inactive.
	pub fn quad(&self) -> Option<&PlatformQuad> {
		self.quad.as_ref()
	}

	/// Re-evaluates the pose after the rig has been solved for this frame and
	/// switches the arm color when the platform turns on or off. `enabled`
	/// comes from the current training mode.
	pub fn update(
		&mut self,
		rig: &mut IkArmRig,
		enabled: bool,
		settings: &TrainerSettings,
	) -> Option<PlatformTransition> {
		let hands = ArmSide::BOTH.map(|side| rig.arm(side).hand.trans);
		let shoulders = ArmSide::BOTH.map(|side| rig.arm(side).shoulder.trans);
		let quad = PlatformQuad::from_rig(rig);
		let active = enabled
			&& rig.left.is_anchored()
			&& quad.is_finite()
			&& is_receive_pose(hands, shoulders, &settings.receive);

		self.quad = active.then_some(quad);
		if active == self.active {
			return None;
		}
		self.active = active;
		if active {
			debug!("receive platform ready");
			rig.set_arm_color(settings.arms.ready_color);
			Some(PlatformTransition::Activated)
		} else {
			debug!("receive platform dropped");
			rig.reset_arm_color();
			Some(PlatformTransition::Deactivated)
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::pose::Pose;
	use crate::rig::TrackedPoses;

	const EPS: f32 = 1e-4;
	const SHOULDERS: [Vec3; 2] = [Vec3::new(-0.18, 1.4, 0.0), Vec3::new(0.18, 1.4, 0.0)];

	#[test]
	fn test_receive_pose_window() {
		let settings = ReceiveSettings::default();
		let at = |y: f32, gap: f32| {
			is_receive_pose(
				[Vec3::new(-gap * 0.5, y, -0.3), Vec3::new(gap * 0.5, y, -0.3)],
				SHOULDERS,
				&settings,
			)
		};
		assert!(at(1.0, 0.1));
		// just inside both edges of the height window
		assert!(at(1.4 + settings.min_height_below_shoulders + 1e-3, 0.1));
		assert!(at(1.4 + settings.max_height_below_shoulders - 1e-3, 0.1));
		assert!(!at(1.4 + settings.min_height_below_shoulders - 1e-3, 0.1));
		assert!(!at(1.4, 0.1), "hands at shoulder height");
		assert!(!at(0.5, 0.1), "hands too low");
		assert!(!at(1.0, settings.max_hand_distance + 0.01), "hands apart");
		assert!(at(1.0, settings.max_hand_distance - 0.01));
	}

	#[test]
	fn test_quad_normal_faces_up() {
		let quad = PlatformQuad::new([
			Vec3::new(-0.15, 1.1, 0.0),
			Vec3::new(-0.03, 1.0, -0.3),
			Vec3::new(0.03, 1.0, -0.3),
			Vec3::new(0.15, 1.1, 0.0),
		]);
		let n = quad.normal();
		assert!((n.length() - 1.0).abs() < EPS);
		assert!(n.y > 0.0);
		// the forearms slope down towards the hands, so the normal tilts forward
		assert!(n.z < 0.0);

		let mut flipped = quad;
		flipped.corners.reverse();
		assert!(flipped.normal().abs_diff_eq(n, EPS));
	}

	#[test]
	fn test_degenerate_quad_normal() {
		let quad = PlatformQuad::new([Vec3::ONE; 4]);
		assert_eq!(quad.normal(), Vec3::Y);
		assert!(quad.collision_points(0.02).iter().all(|p| p.is_finite()));
	}

	#[test]
	fn test_collision_points_form_slab() {
		let quad = PlatformQuad::new([
			Vec3::new(-0.1, 1.0, 0.0),
			Vec3::new(-0.1, 1.0, -0.3),
			Vec3::new(0.1, 1.0, -0.3),
			Vec3::new(0.1, 1.0, 0.0),
		]);
		assert!(quad.center().abs_diff_eq(Vec3::new(0.0, 1.0, -0.15), EPS));
		let points = quad.collision_points(0.04);
		for (top, bottom) in points[..4].iter().zip(&points[4..]) {
			assert!((top.y - 0.02).abs() < EPS);
			assert!((bottom.y + 0.02).abs() < EPS);
			assert!((top.x - bottom.x).abs() < EPS && (top.z - bottom.z).abs() < EPS);
		}
	}

	fn receiving_rig(settings: &TrainerSettings, hand_y: f32) -> IkArmRig {
		let mut rig = IkArmRig::new(settings);
		rig.update(
			&TrackedPoses {
				head: Some(Pose::from_translation(Vec3::new(0.0, 1.64, 0.0))),
				left: Some(Pose::from_translation(Vec3::new(-0.04, hand_y, -0.35))),
				right: Some(Pose::from_translation(Vec3::new(0.04, hand_y, -0.35))),
			},
			1.0 / 72.0,
		);
		rig
	}

	#[test]
	fn test_transitions_toggle_arm_color() {
		let settings = TrainerSettings::default();
		let mut platform = ReceivePlatform::default();

		// shoulders sit at 1.4, so hands at 1.0 are inside the window
		let mut rig = receiving_rig(&settings, 1.0);
		assert_eq!(
			platform.update(&mut rig, true, &settings),
			Some(PlatformTransition::Activated)
		);
		assert!(platform.is_active());
		assert!(platform.quad().is_some());
		assert_eq!(rig.arm_color(), settings.arms.ready_color);

		// staying active is not a transition
		assert_eq!(platform.update(&mut rig, true, &settings), None);

		let mut raised = receiving_rig(&settings, 1.5);
		raised.set_arm_color(settings.arms.ready_color);
		assert_eq!(
			platform.update(&mut raised, true, &settings),
			Some(PlatformTransition::Deactivated)
		);
		assert!(platform.quad().is_none());
		assert_eq!(raised.arm_color(), settings.arms.base_color);
	}

	#[test]
	fn test_disabled_by_training_mode() {
		let settings = TrainerSettings::default();
		let mut platform = ReceivePlatform::default();
		let mut rig = receiving_rig(&settings, 1.0);
		assert_eq!(platform.update(&mut rig, false, &settings), None);
		assert!(!platform.is_active());
		assert_eq!(rig.arm_color(), settings.arms.base_color);
	}

	#[test]
	fn test_platform_moves_with_forearms() {
		let settings = TrainerSettings::default();
		let mut rig = receiving_rig(&settings, 1.0);
		assert_eq!(platform_velocity(&rig), Vec3::ZERO);

		// the player rises, say on a jump, keeping the arms still
		let dt = 1.0 / 72.0;
		let mut lift = 0.0;
		for _ in 0..30 {
			lift += 1.2 * dt;
			let at = |x: f32, y: f32, z: f32| {
				Some(Pose::from_translation(Vec3::new(x, y + lift, z)))
			};
			rig.update(
				&TrackedPoses {
					head: at(0.0, 1.64, 0.0),
					left: at(-0.04, 1.0, -0.35),
					right: at(0.04, 1.0, -0.35),
				},
				dt,
			);
		}
		let v = platform_velocity(&rig);
		assert!(v.abs_diff_eq(Vec3::new(0.0, 1.2, 0.0), 1e-2), "{v}");
	}

	#[test]
	fn test_inactive_before_tracking() {
		let settings = TrainerSettings::default();
		let mut platform = ReceivePlatform::default();
		let mut rig = IkArmRig::new(&settings);
		assert_eq!(platform.update(&mut rig, true, &settings), None);
	}
}
