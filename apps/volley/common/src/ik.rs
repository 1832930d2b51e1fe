//! Analytic two bone inverse kinematics for shoulder -> elbow -> hand chains.

use bevy::math::{Quat, Vec3};

/// Below this the bend plane normal is considered degenerate.
const DEGENERATE_CROSS_LEN: f32 = 1e-4;
/// Shoulder and hand closer than this are treated as coincident.
const COINCIDENT_DIST: f32 = 1e-6;

/// Which branch of the solver produced an elbow.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Reach {
	/// Target out of reach, the arm is fully straight.
	OverExtended,
	/// Target too close to the shoulder, the arm is collapsed.
	OverContracted,
	/// The elbow satisfies both bone lengths.
	Solved,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElbowSolution {
	pub elbow: Vec3,
	pub reach: Reach,
}

/// Bone lengths of one arm. Both lengths must be validated as positive before
/// constructing this, see [`crate::settings::TrainerSettings::validate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwoBoneIk {
	pub upper_len: f32,
	pub lower_len: f32,
}

impl TwoBoneIk {
	pub fn new(upper_len: f32, lower_len: f32) -> Self {
		debug_assert!(upper_len > 0.0 && lower_len > 0.0);
		Self {
			upper_len,
			lower_len,
		}
	}

	pub fn max_reach(&self) -> f32 {
		self.upper_len + self.lower_len
	}

	pub fn min_reach(&self) -> f32 {
		(self.upper_len - self.lower_len).abs()
	}

	/// Solves for the elbow, bending towards `down` (world down when in doubt).
	pub fn solve(&self, shoulder: Vec3, hand: Vec3, down: Vec3) -> ElbowSolution {
		let a = self.upper_len;
		let b = self.lower_len;
		let to_hand = hand - shoulder;
		let c = to_hand.length();
		let down = down.try_normalize().unwrap_or(Vec3::NEG_Y);

		if c <= COINCIDENT_DIST || !c.is_finite() {
			// No direction to work with, collapse the arm along the bend hint.
			return ElbowSolution {
				elbow: shoulder + down * (a * 0.5),
				reach: Reach::OverContracted,
			};
		}
		let dir = to_hand / c;

		if c >= a + b {
			return ElbowSolution {
				elbow: shoulder + dir * a,
				reach: Reach::OverExtended,
			};
		}
		if c <= (a - b).abs() {
			return ElbowSolution {
				elbow: shoulder + dir * (a * 0.5),
				reach: Reach::OverContracted,
			};
		}

		let cos_theta = ((a * a + c * c - b * b) / (2.0 * a * c)).clamp(-1.0, 1.0);
		let theta = cos_theta.acos();
		let normal = bend_normal(dir, down);

		let elbow_pos = shoulder + Quat::from_axis_angle(normal, theta) * dir * a;
		let elbow_neg = shoulder + Quat::from_axis_angle(normal, -theta) * dir * a;
		// Whichever candidate lies further along `down` wins, so the elbow always
		// hangs towards the ground.
		let elbow = if elbow_neg.dot(down) > elbow_pos.dot(down) {
			elbow_neg
		} else {
			elbow_pos
		};

		ElbowSolution {
			elbow,
			reach: Reach::Solved,
		}
	}
}

/// Normal of the plane the arm bends in. Falls back to forward and then right
/// when the arm points along `down`.
fn bend_normal(dir: Vec3, down: Vec3) -> Vec3 {
	[down, Vec3::NEG_Z, Vec3::X]
		.into_iter()
		.map(|reference| dir.cross(reference))
		.find(|n| n.length() > DEGENERATE_CROSS_LEN)
		.map(Vec3::normalize)
		.unwrap_or(Vec3::X)
}

/// Solves for the elbow position of a shoulder -> elbow -> hand chain.
pub fn solve_elbow(
	shoulder: Vec3,
	hand: Vec3,
	upper_len: f32,
	lower_len: f32,
	down: Vec3,
) -> Vec3 {
	TwoBoneIk::new(upper_len, lower_len)
		.solve(shoulder, hand, down)
		.elbow
}

/// Placement of a primitive spanning two joints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
	pub midpoint: Vec3,
	/// Rotates +Y onto the segment direction.
	pub rotation: Quat,
	pub length: f32,
}

impl Segment {
	pub fn between(from: Vec3, to: Vec3) -> Self {
		let delta = to - from;
		let length = delta.length();
		let rotation = match delta.try_normalize() {
			Some(dir) => Quat::from_rotation_arc(Vec3::Y, dir),
			None => Quat::IDENTITY,
		};
		Self {
			midpoint: from + delta * 0.5,
			rotation,
			length,
		}
	}
}
