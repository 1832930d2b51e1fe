//! Tunable settings for the trainer.
//!
//! Everything is plain numbers and vectors so that a settings blob can be
//! loaded from disk or edited live. [`TrainerSettings::validate`] must pass
//! before the settings reach any of the solvers.

use std::path::Path;
use std::time::Duration;

use bevy::{
	ecs::system::Resource,
	math::{Quat, Vec3},
	reflect::Reflect,
	render::color::Color,
};
use serde::{Deserialize, Serialize};

use crate::pose::ArmSide;

#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
	#[error("failed to read settings file")]
	Io(#[from] std::io::Error),
	#[error("failed to parse settings file")]
	Parse(#[from] serde_json::Error),
	#[error("`{field}` must be a finite number greater than zero, got {value}")]
	NotPositive { field: &'static str, value: f32 },
	#[error("`{field}` must be a finite number that is not negative, got {value}")]
	Negative { field: &'static str, value: f32 },
	#[error("`{field}` must only contain finite numbers, got {value}")]
	NotFinite { field: &'static str, value: Vec3 },
	#[error("`velocity.smoothing` must be in (0, 1], got {0}")]
	Smoothing(f32),
	#[error(
		"receive platform height window is inverted: min {min} is above max {max}"
	)]
	InvertedHeightWindow { min: f32, max: f32 },
}

#[derive(Resource, Serialize, Deserialize, Debug, Clone, PartialEq, Default, Reflect)]
#[serde(default)]
pub struct TrainerSettings {
	pub arms: ArmSettings,
	pub velocity: VelocitySettings,
	pub grab: GrabSettings,
	pub contact: ContactSettings,
	pub receive: ReceiveSettings,
	pub ball: BallSettings,
}

impl TrainerSettings {
	/// Reads settings from a json file. Missing fields use their defaults.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
		let bytes = std::fs::read(path.as_ref())?;
		let settings: Self = serde_json::from_slice(&bytes)?;
		settings.validate()?;
		Ok(settings)
	}

	pub fn validate(&self) -> Result<(), SettingsError> {
		positive("arms.upper_arm_length", self.arms.upper_arm_length)?;
		positive("arms.forearm_length", self.arms.forearm_length)?;
		positive("arms.arm_radius", self.arms.arm_radius)?;
		positive("arms.hand_radius", self.arms.hand_radius)?;

		let s = self.velocity.smoothing;
		if !(s.is_finite() && s > 0.0 && s <= 1.0) {
			return Err(SettingsError::Smoothing(s));
		}

		non_negative("grab.release_cooldown_secs", self.grab.release_cooldown_secs)?;

		let c = &self.contact;
		non_negative("contact.cooldown_secs", c.cooldown_secs)?;
		non_negative("contact.min_force_speed", c.min_force_speed)?;
		non_negative("contact.min_sound_speed", c.min_sound_speed)?;
		non_negative("contact.moving_speed_threshold", c.moving_speed_threshold)?;
		non_negative("contact.resting_speed_threshold", c.resting_speed_threshold)?;
		non_negative(
			"contact.moving_object_force_multiplier",
			c.moving_object_force_multiplier,
		)?;
		non_negative(
			"contact.static_object_force_multiplier",
			c.static_object_force_multiplier,
		)?;
		non_negative("contact.speed_multiplier", c.speed_multiplier)?;
		positive("contact.max_force", c.max_force)?;
		non_negative("contact.arm_push_factor", c.arm_push_factor)?;
		non_negative("contact.max_push_speed", c.max_push_speed)?;
		positive("contact.full_volume_speed", c.full_volume_speed)?;
		non_negative("contact.pitch_jitter", c.pitch_jitter)?;

		let r = &self.receive;
		non_negative("receive.max_hand_distance", r.max_hand_distance)?;
		positive("receive.platform_thickness", r.platform_thickness)?;
		if r.min_height_below_shoulders > r.max_height_below_shoulders {
			return Err(SettingsError::InvertedHeightWindow {
				min: r.min_height_below_shoulders,
				max: r.max_height_below_shoulders,
			});
		}

		let b = &self.ball;
		positive("ball.radius", b.radius)?;
		positive("ball.mass", b.mass)?;
		non_negative("ball.linear_damping", b.linear_damping)?;
		non_negative("ball.angular_damping", b.angular_damping)?;
		non_negative("ball.restitution", b.restitution)?;
		non_negative("ball.friction", b.friction)?;
		positive("ball.spawn_interval_secs", b.spawn_interval_secs)?;
		positive("ball.lifetime_secs", b.lifetime_secs)?;
		finite("ball.pass_origin", b.pass_origin)?;
		finite("ball.pass_velocity", b.pass_velocity)?;
		finite("ball.drop_origin", b.drop_origin)?;

		Ok(())
	}
}

fn positive(field: &'static str, value: f32) -> Result<(), SettingsError> {
	if value.is_finite() && value > 0.0 {
		Ok(())
	} else {
		Err(SettingsError::NotPositive { field, value })
	}
}

fn non_negative(field: &'static str, value: f32) -> Result<(), SettingsError> {
	if value.is_finite() && value >= 0.0 {
		Ok(())
	} else {
		Err(SettingsError::Negative { field, value })
	}
}

fn finite(field: &'static str, value: Vec3) -> Result<(), SettingsError> {
	if value.is_finite() {
		Ok(())
	} else {
		Err(SettingsError::NotFinite { field, value })
	}
}

/// Offset of a hand relative to the controller grip it follows.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Reflect)]
pub struct HandOffset {
	pub position: Vec3,
	pub rotation: Quat,
}

impl Default for HandOffset {
	fn default() -> Self {
		Self {
			position: Vec3::new(0.0, 0.0, 0.06),
			rotation: Quat::IDENTITY,
		}
	}
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Reflect)]
#[serde(default)]
pub struct ArmSettings {
	/// Shoulder to elbow, in meters.
	pub upper_arm_length: f32,
	/// Elbow to hand, in meters.
	pub forearm_length: f32,
	/// Shoulder anchors, in the yaw-only frame of the head.
	pub left_shoulder_offset: Vec3,
	pub right_shoulder_offset: Vec3,
	pub left_hand_offset: HandOffset,
	pub right_hand_offset: HandOffset,
	/// Direction the elbows prefer to bend towards.
	pub bend_hint: Vec3,
	pub arm_radius: f32,
	pub hand_radius: f32,
	pub base_color: Color,
	pub ready_color: Color,
}

impl ArmSettings {
	pub fn shoulder_offset(&self, side: ArmSide) -> Vec3 {
		match side {
			ArmSide::Left => self.left_shoulder_offset,
			ArmSide::Right => self.right_shoulder_offset,
		}
	}

	pub fn hand_offset(&self, side: ArmSide) -> HandOffset {
		match side {
			ArmSide::Left => self.left_hand_offset,
			ArmSide::Right => self.right_hand_offset,
		}
	}
}

impl Default for ArmSettings {
	fn default() -> Self {
		Self {
			upper_arm_length: 0.30,
			forearm_length: 0.28,
			left_shoulder_offset: Vec3::new(-0.18, -0.24, 0.06),
			right_shoulder_offset: Vec3::new(0.18, -0.24, 0.06),
			left_hand_offset: HandOffset::default(),
			right_hand_offset: HandOffset::default(),
			bend_hint: Vec3::NEG_Y,
			arm_radius: 0.04,
			hand_radius: 0.05,
			base_color: Color::rgb(0.85, 0.68, 0.55),
			ready_color: Color::rgb(0.2, 0.8, 0.35),
		}
	}
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Reflect)]
#[serde(default)]
pub struct VelocitySettings {
	/// Weight of the newest frame-delta velocity in the smoothed estimate.
	pub smoothing: f32,
}

impl Default for VelocitySettings {
	fn default() -> Self {
		Self { smoothing: 0.7 }
	}
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Reflect)]
#[serde(default)]
pub struct GrabSettings {
	/// How long arm/ball contacts stay suppressed after a ball is released.
	pub release_cooldown_secs: f32,
}

impl GrabSettings {
	pub fn release_cooldown(&self) -> Duration {
		Duration::from_secs_f32(self.release_cooldown_secs)
	}
}

impl Default for GrabSettings {
	fn default() -> Self {
		Self {
			release_cooldown_secs: 0.2,
		}
	}
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Reflect)]
#[serde(default)]
pub struct ContactSettings {
	/// Minimum time between two responses for the same ball.
	pub cooldown_secs: f32,
	/// Approach speed below which no impulse is applied.
	pub min_force_speed: f32,
	/// Approach speed below which no sound is emitted.
	pub min_sound_speed: f32,
	/// Speed above which another body counts as moving.
	pub moving_speed_threshold: f32,
	/// Kinematic bodies slower than this count as static.
	pub resting_speed_threshold: f32,
	pub moving_object_force_multiplier: f32,
	pub static_object_force_multiplier: f32,
	/// Makes the impulse grow faster than linearly with approach speed.
	pub speed_multiplier: f32,
	pub max_force: f32,
	/// Share of the striking arm part's velocity added straight onto the ball.
	/// This is a feel parameter, it is not momentum conserving.
	pub arm_push_factor: f32,
	/// Upper bound on the length of that push.
	pub max_push_speed: f32,
	/// Approach speed at which impact sounds reach full volume.
	pub full_volume_speed: f32,
	/// Relative pitch randomization, 0.1 means +/-10%.
	pub pitch_jitter: f32,
}

impl ContactSettings {
	pub fn cooldown(&self) -> Duration {
		Duration::from_secs_f32(self.cooldown_secs)
	}
}

impl Default for ContactSettings {
	fn default() -> Self {
		Self {
			cooldown_secs: 0.1,
			min_force_speed: 0.5,
			min_sound_speed: 0.2,
			moving_speed_threshold: 0.3,
			resting_speed_threshold: 0.05,
			moving_object_force_multiplier: 0.15,
			static_object_force_multiplier: 0.08,
			speed_multiplier: 0.1,
			max_force: 3.0,
			arm_push_factor: 0.5,
			max_push_speed: 4.0,
			full_volume_speed: 8.0,
			pitch_jitter: 0.1,
		}
	}
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Reflect)]
#[serde(default)]
pub struct ReceiveSettings {
	pub max_hand_distance: f32,
	/// Lower bound of the average hand height relative to the shoulders.
	pub min_height_below_shoulders: f32,
	/// Upper bound of the average hand height relative to the shoulders.
	pub max_height_below_shoulders: f32,
	/// Thickness of the collision slab built under the platform quad.
	pub platform_thickness: f32,
}

impl Default for ReceiveSettings {
	fn default() -> Self {
		Self {
			max_hand_distance: 0.25,
			min_height_below_shoulders: -0.75,
			max_height_below_shoulders: -0.15,
			platform_thickness: 0.03,
		}
	}
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Reflect)]
#[serde(default)]
pub struct BallSettings {
	pub radius: f32,
	pub mass: f32,
	pub linear_damping: f32,
	pub angular_damping: f32,
	pub restitution: f32,
	pub friction: f32,
	/// Balls falling below this height are despawned.
	pub despawn_height: f32,
	pub spawn_interval_secs: f32,
	/// Balls that are not held expire after this long.
	pub lifetime_secs: f32,
	/// Spawning pauses while this many balls are alive.
	pub max_balls: u32,
	/// Where passed balls are launched from in receive training.
	pub pass_origin: Vec3,
	pub pass_velocity: Vec3,
	/// Where balls are dropped in front of the player otherwise.
	pub drop_origin: Vec3,
}

impl BallSettings {
	pub fn lifetime(&self) -> Duration {
		Duration::from_secs_f32(self.lifetime_secs)
	}
}

impl Default for BallSettings {
	fn default() -> Self {
		Self {
			radius: 0.105,
			mass: 0.27,
			linear_damping: 0.1,
			angular_damping: 0.2,
			restitution: 0.7,
			friction: 0.5,
			despawn_height: -5.0,
			spawn_interval_secs: 3.0,
			lifetime_secs: 15.0,
			max_balls: 6,
			pass_origin: Vec3::new(0.0, 2.0, -5.0),
			pass_velocity: Vec3::new(0.0, 4.0, 4.5),
			drop_origin: Vec3::new(0.0, 1.8, -0.5),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_defaults_are_valid() {
		TrainerSettings::default().validate().unwrap();
	}

	#[test]
	fn test_zero_bone_length_rejected() {
		let mut settings = TrainerSettings::default();
		settings.arms.forearm_length = 0.0;
		assert!(matches!(
			settings.validate(),
			Err(SettingsError::NotPositive {
				field: "arms.forearm_length",
				..
			})
		));

		settings.arms.forearm_length = f32::NAN;
		assert!(settings.validate().is_err());
	}

	#[test]
	fn test_smoothing_range() {
		let mut settings = TrainerSettings::default();
		settings.velocity.smoothing = 1.0;
		assert!(settings.validate().is_ok());
		settings.velocity.smoothing = 0.0;
		assert!(matches!(settings.validate(), Err(SettingsError::Smoothing(_))));
		settings.velocity.smoothing = 1.5;
		assert!(matches!(settings.validate(), Err(SettingsError::Smoothing(_))));
	}

	#[test]
	fn test_inverted_height_window_rejected() {
		let mut settings = TrainerSettings::default();
		settings.receive.min_height_below_shoulders = 0.1;
		settings.receive.max_height_below_shoulders = -0.1;
		assert!(matches!(
			settings.validate(),
			Err(SettingsError::InvertedHeightWindow { .. })
		));
	}

	#[test]
	fn test_non_finite_spawn_rejected() {
		let mut settings = TrainerSettings::default();
		settings.ball.pass_velocity.y = f32::INFINITY;
		assert!(matches!(
			settings.validate(),
			Err(SettingsError::NotFinite {
				field: "ball.pass_velocity",
				..
			})
		));
	}

	#[test]
	fn test_ball_lifetime_must_be_positive() {
		let mut settings = TrainerSettings::default();
		settings.ball.lifetime_secs = 0.0;
		assert!(matches!(
			settings.validate(),
			Err(SettingsError::NotPositive {
				field: "ball.lifetime_secs",
				..
			})
		));
	}

	#[test]
	fn test_partial_json_uses_defaults() {
		let json = r#"{ "arms": { "upper_arm_length": 0.32 }, "grab": {} }"#;
		let settings: TrainerSettings = serde_json::from_str(json).unwrap();
		assert_eq!(settings.arms.upper_arm_length, 0.32);
		assert_eq!(settings.arms.forearm_length, ArmSettings::default().forearm_length);
		assert_eq!(settings.contact, ContactSettings::default());
		settings.validate().unwrap();
	}

	#[test]
	fn test_durations() {
		let settings = TrainerSettings::default();
		let close = |d: Duration, secs: f32| (d.as_secs_f32() - secs).abs() < 1e-6;
		assert!(close(settings.contact.cooldown(), 0.1));
		assert!(close(settings.grab.release_cooldown(), 0.2));
		assert!(close(settings.ball.lifetime(), 15.0));
	}
}
