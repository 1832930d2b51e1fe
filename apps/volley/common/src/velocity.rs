//! Velocity estimation for parts that are moved kinematically.

use std::collections::HashMap;
use std::hash::Hash;

use bevy::math::Vec3;

pub const DEFAULT_SMOOTHING: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocitySample {
	pub previous_position: Vec3,
	pub smoothed_velocity: Vec3,
}

/// Exponentially smoothed velocity from per-frame position deltas.
///
/// The smoothing weight favors the newest sample, so hits feel immediate at
/// the cost of letting some tracking jitter through.
#[derive(Debug, Clone)]
pub struct VelocityTracker<K> {
	samples: HashMap<K, VelocitySample>,
	smoothing: f32,
}

impl<K> Default for VelocityTracker<K> {
	fn default() -> Self {
		Self::new(DEFAULT_SMOOTHING)
	}
}

impl<K> VelocityTracker<K> {
	pub fn new(smoothing: f32) -> Self {
		Self {
			samples: HashMap::new(),
			smoothing,
		}
	}

	pub fn smoothing(&self) -> f32 {
		self.smoothing
	}

	pub fn set_smoothing(&mut self, smoothing: f32) {
		self.smoothing = smoothing;
	}

	pub fn len(&self) -> usize {
		self.samples.len()
	}

	pub fn is_empty(&self) -> bool {
		self.samples.is_empty()
	}

	pub fn clear(&mut self) {
		self.samples.clear();
	}
}

impl<K: Eq + Hash> VelocityTracker<K> {
	/// Feeds the current position of `part`. Parts seen for the first time are
	/// seeded at rest. Frames with a non-positive `dt` are ignored.
	pub fn update(&mut self, part: K, position: Vec3, dt: f32) {
		let smoothing = self.smoothing;
		match self.samples.get_mut(&part) {
			None => {
				self.samples.insert(
					part,
					VelocitySample {
						previous_position: position,
						smoothed_velocity: Vec3::ZERO,
					},
				);
			}
			Some(sample) => {
				if !(dt > 0.0) {
					return;
				}
				let instant = (position - sample.previous_position) / dt;
				sample.smoothed_velocity =
					sample.smoothed_velocity.lerp(instant, smoothing);
				sample.previous_position = position;
			}
		}
	}

	/// Smoothed velocity of `part`, zero for parts that were never seen.
	pub fn velocity(&self, part: &K) -> Vec3 {
		self.samples
			.get(part)
			.map(|s| s.smoothed_velocity)
			.unwrap_or(Vec3::ZERO)
	}

	pub fn sample(&self, part: &K) -> Option<&VelocitySample> {
		self.samples.get(part)
	}

	pub fn remove(&mut self, part: &K) -> Option<VelocitySample> {
		self.samples.remove(part)
	}

	pub fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) {
		self.samples.retain(|k, _| keep(k));
	}
}
