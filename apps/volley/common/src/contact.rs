//! How a ball responds when it touches something.
//!
//! Bounces off the ground and other static geometry are left entirely to the
//! physics engine's materials. Moving bodies and the player's arms inject an
//! extra impulse that grows faster than linearly with the approach speed, plus
//! an optional push taken straight from the arm's tracked velocity.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use bevy::{ecs::component::Component, math::Vec3, reflect::Reflect};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::settings::ContactSettings;

/// What a collider is, assigned once when it is spawned.
#[derive(
	Component,
	Serialize,
	Deserialize,
	Debug,
	Clone,
	Copy,
	Eq,
	PartialEq,
	Hash,
	Reflect,
)]
pub enum ColliderKind {
	Ground,
	Arm,
	Ball,
	Generic,
}

/// Motion of the body a ball touched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyMotion {
	pub velocity: Vec3,
	pub kinematic: bool,
}

/// The body on the other side of a contact. `motion` is `None` for colliders
/// without a rigid body. For arm parts it carries the tracked velocity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OtherBody {
	pub kind: ColliderKind,
	pub motion: Option<BodyMotion>,
}

impl OtherBody {
	pub fn fixed(kind: ColliderKind) -> Self {
		Self { kind, motion: None }
	}

	pub fn arm(velocity: Vec3) -> Self {
		Self {
			kind: ColliderKind::Arm,
			motion: Some(BodyMotion {
				velocity,
				kinematic: true,
			}),
		}
	}

	fn velocity(&self) -> Vec3 {
		self.motion.map(|m| m.velocity).unwrap_or(Vec3::ZERO)
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
	Static,
	Moving { velocity: Vec3 },
	ArmPart { velocity: Vec3 },
	OtherBall { velocity: Vec3 },
}

impl Classification {
	/// Velocity of the other body as far as the response is concerned.
	pub fn velocity(&self) -> Vec3 {
		match *self {
			Classification::Static => Vec3::ZERO,
			Classification::Moving { velocity }
			| Classification::ArmPart { velocity }
			| Classification::OtherBall { velocity } => velocity,
		}
	}

	/// Whether this contact gets an impulse on top of the engine's response.
	pub fn injects_force(&self) -> bool {
		matches!(
			self,
			Classification::Moving { .. } | Classification::ArmPart { .. }
		)
	}
}

pub fn classify(other: &OtherBody, settings: &ContactSettings) -> Classification {
	match other.kind {
		ColliderKind::Ground => Classification::Static,
		ColliderKind::Ball => Classification::OtherBall {
			velocity: other.velocity(),
		},
		ColliderKind::Arm => Classification::ArmPart {
			velocity: other.velocity(),
		},
		ColliderKind::Generic => {
			let Some(motion) = other.motion else {
				return Classification::Static;
			};
			let speed = motion.velocity.length();
			if motion.kinematic && speed < settings.resting_speed_threshold {
				Classification::Static
			} else if speed >= settings.moving_speed_threshold {
				Classification::Moving {
					velocity: motion.velocity,
				}
			} else {
				Classification::Static
			}
		}
	}
}

/// Impulse magnitude for an approach at `relative_speed`, capped at
/// `max_force`.
pub fn force_magnitude(
	relative_speed: f32,
	type_multiplier: f32,
	settings: &ContactSettings,
) -> f32 {
	let speed = relative_speed.max(0.0);
	let force = speed * type_multiplier * (1.0 + speed * settings.speed_multiplier);
	force.clamp(0.0, settings.max_force)
}

/// Numeric contract for the audio side. `pitch` is a playback rate around 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactSound {
	pub volume: f32,
	pub pitch: f32,
	pub impact_speed: f32,
}

impl ImpactSound {
	/// `jitter` is a uniform sample in `[-1, 1]`.
	pub fn new(impact_speed: f32, jitter: f32, settings: &ContactSettings) -> Self {
		let volume = (impact_speed / settings.full_volume_speed).clamp(0.0, 1.0);
		let pitch = 1.0 + jitter.clamp(-1.0, 1.0) * settings.pitch_jitter;
		Self {
			volume,
			pitch,
			impact_speed,
		}
	}
}

/// One contact between a ball and something else, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactInput {
	pub ball_velocity: Vec3,
	/// Points away from the struck surface, towards the ball.
	pub normal: Vec3,
	pub point_count: usize,
	pub other: OtherBody,
	/// Result of the grab gate. Only consulted for arm contacts.
	pub arm_contact_allowed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactResponse {
	pub classification: Classification,
	/// Approach speed along the contact normal.
	pub relative_speed: f32,
	/// Instantaneous impulse to apply to the ball.
	pub impulse: Vec3,
	/// Velocity added directly to the ball.
	pub velocity_boost: Vec3,
	pub sound: Option<ImpactSound>,
}

impl ContactResponse {
	pub fn has_effect(&self) -> bool {
		self.impulse != Vec3::ZERO
			|| self.velocity_boost != Vec3::ZERO
			|| self.sound.is_some()
	}
}

/// Computes the response to a single contact. Returns `None` when the contact
/// must be ignored entirely.
pub fn respond(
	input: &ContactInput,
	settings: &ContactSettings,
	jitter: f32,
) -> Option<ContactResponse> {
	if input.point_count == 0 {
		return None;
	}
	let normal = input.normal.try_normalize()?;
	let classification = classify(&input.other, settings);
	if matches!(classification, Classification::ArmPart { .. })
		&& !input.arm_contact_allowed
	{
		return None;
	}

	let other_velocity = classification.velocity();
	let relative_velocity = input.ball_velocity - other_velocity;
	let relative_speed = relative_velocity.dot(-normal);

	let mut impulse = Vec3::ZERO;
	let mut velocity_boost = Vec3::ZERO;
	if classification.injects_force() && relative_speed >= settings.min_force_speed {
		let type_multiplier =
			if other_velocity.length() >= settings.moving_speed_threshold {
				settings.moving_object_force_multiplier
			} else {
				settings.static_object_force_multiplier
			};
		impulse = normal * force_magnitude(relative_speed, type_multiplier, settings);
		if let Classification::ArmPart { velocity } = classification {
			velocity_boost = (velocity * settings.arm_push_factor)
				.clamp_length_max(settings.max_push_speed);
		}
	}

	let sound = (relative_speed >= settings.min_sound_speed)
		.then(|| ImpactSound::new(relative_speed, jitter, settings));

	Some(ContactResponse {
		classification,
		relative_speed,
		impulse,
		velocity_boost,
		sound,
	})
}

/// Per ball minimum interval between responses, so that a multi point
/// manifold or a few frames of touching only count once.
#[derive(Debug, Clone)]
pub struct ContactCooldown<K> {
	last_response: HashMap<K, Duration>,
}

impl<K> Default for ContactCooldown<K> {
	fn default() -> Self {
		Self {
			last_response: HashMap::new(),
		}
	}
}

impl<K: Eq + Hash + Copy> ContactCooldown<K> {
	pub fn is_ready(&self, ball: &K, now: Duration, cooldown: Duration) -> bool {
		match self.last_response.get(ball) {
			None => true,
			Some(last) => now.saturating_sub(*last) >= cooldown,
		}
	}

	pub fn mark(&mut self, ball: K, now: Duration) {
		self.last_response.insert(ball, now);
	}

	pub fn remove(&mut self, ball: &K) {
		self.last_response.remove(ball);
	}
}

/// Stateless contact response behind a per ball cooldown.
#[derive(Debug, Clone)]
pub struct CollisionResponder<K> {
	cooldown: ContactCooldown<K>,
}

impl<K> Default for CollisionResponder<K> {
	fn default() -> Self {
		Self {
			cooldown: ContactCooldown::default(),
		}
	}
}

impl<K: Eq + Hash + Copy + std::fmt::Debug> CollisionResponder<K> {
	pub fn handle(
		&mut self,
		ball: K,
		now: Duration,
		input: &ContactInput,
		settings: &ContactSettings,
		jitter: f32,
	) -> Option<ContactResponse> {
		if !self.cooldown.is_ready(&ball, now, settings.cooldown()) {
			trace!(?ball, "contact ignored, ball is cooling down");
			return None;
		}
		let response = respond(input, settings, jitter)?;
		if !response.has_effect() {
			return None;
		}
		self.cooldown.mark(ball, now);
		trace!(
			?ball,
			classification = ?response.classification,
			speed = response.relative_speed,
			impulse = ?response.impulse,
			"contact response"
		);
		Some(response)
	}

	pub fn forget(&mut self, ball: &K) {
		self.cooldown.remove(ball);
	}
}
