//! Entities for the arm rig: one kinematic body per arm part, placed from the
//! solved [`IkArmRig`] every frame.

use bevy::{
	app::{App, Plugin, Startup, Update},
	asset::{Assets, Handle},
	core::Name,
	ecs::{
		schedule::IntoSystemConfigs,
		system::{Commands, Local, Query, Res, ResMut, Resource},
	},
	math::{
		primitives::{Capsule3d, Sphere},
		Vec3,
	},
	pbr::{PbrBundle, StandardMaterial},
	prelude::default,
	render::{color::Color, mesh::Mesh},
	time::Time,
	transform::components::Transform,
};
use bevy_rapier3d::{dynamics::RigidBody, geometry::Collider};
use volley_common::settings::ArmSettings;
use volley_common::{
	ArmPart, ArmPartId, ColliderKind, IkArmRig, TrackedPoses, TrainerSettings,
};

use crate::{AppExt, CorePlugin, VolleySet};

/// Segments are never squashed below this fraction of their rest length.
const MIN_SEGMENT_SCALE: f32 = 0.05;

#[derive(Debug, Default)]
pub struct ArmsPlugin;

impl Plugin for ArmsPlugin {
	fn build(&self, app: &mut App) {
		app.add_if_not_added(CorePlugin)
			.init_resource::<TrackedPoses>()
			.add_systems(Startup, spawn_arms)
			.add_systems(Update, solve_arms.in_set(VolleySet::Solve))
			.add_systems(
				Update,
				(place_arm_parts, apply_arm_color).in_set(VolleySet::Apply),
			);
	}
}

/// Material shared by every arm part. Its base color follows the rig's arm
/// color.
#[derive(Resource, Debug, Clone)]
pub struct ArmMaterial(pub Handle<StandardMaterial>);

/// Rest length of the bone a part spans, `None` for joints.
fn rest_length(part: ArmPart, arms: &ArmSettings) -> Option<f32> {
	match part {
		ArmPart::UpperArm => Some(arms.upper_arm_length),
		ArmPart::Forearm => Some(arms.forearm_length),
		ArmPart::Elbow | ArmPart::Hand => None,
	}
}

fn part_shape(part: ArmPart, arms: &ArmSettings) -> (Mesh, Collider) {
	match (part, rest_length(part, arms)) {
		(_, Some(length)) => (
			Mesh::from(Capsule3d::new(arms.arm_radius, length)),
			Collider::capsule_y(length * 0.5, arms.arm_radius),
		),
		(ArmPart::Hand, None) => (
			Mesh::from(Sphere::new(arms.hand_radius)),
			Collider::ball(arms.hand_radius),
		),
		(_, None) => (
			Mesh::from(Sphere::new(arms.arm_radius)),
			Collider::ball(arms.arm_radius),
		),
	}
}

fn spawn_arms(
	mut commands: Commands,
	mut meshes: ResMut<Assets<Mesh>>,
	mut materials: ResMut<Assets<StandardMaterial>>,
	settings: Res<TrainerSettings>,
) {
	let rig = IkArmRig::new(&settings);
	let material = materials.add(StandardMaterial {
		base_color: rig.arm_color(),
		perceptual_roughness: 0.7,
		..default()
	});
	for id in ArmPartId::all() {
		let (mesh, collider) = part_shape(id.part, &settings.arms);
		let pose = rig.arm(id.side).part_pose(id.part);
		commands.spawn((
			PbrBundle {
				mesh: meshes.add(mesh),
				material: material.clone(),
				transform: Transform::from_translation(pose.trans)
					.with_rotation(pose.rot),
				..default()
			},
			id,
			ColliderKind::Arm,
			RigidBody::KinematicPositionBased,
			collider,
			Name::new(id.to_string()),
		));
	}
	commands.insert_resource(ArmMaterial(material));
	commands.insert_resource(rig);
}

fn solve_arms(
	mut rig: ResMut<IkArmRig>,
	poses: Res<TrackedPoses>,
	settings: Res<TrainerSettings>,
	time: Res<Time>,
) {
	if settings.is_changed() {
		rig.set_smoothing(settings.velocity.smoothing);
	}
	rig.update(&poses, time.delta_seconds());
}

fn place_arm_parts(
	rig: Res<IkArmRig>,
	settings: Res<TrainerSettings>,
	mut parts: Query<(&ArmPartId, &mut Transform)>,
) {
	for (id, mut transform) in parts.iter_mut() {
		let arm = rig.arm(id.side);
		let pose = arm.part_pose(id.part);
		transform.translation = pose.trans;
		transform.rotation = pose.rot;

		let length = match id.part {
			ArmPart::UpperArm => arm.upper_arm.length,
			ArmPart::Forearm => arm.forearm.length,
			ArmPart::Elbow | ArmPart::Hand => continue,
		};
		if let Some(rest) = rest_length(id.part, &settings.arms) {
			let stretch = (length / rest).max(MIN_SEGMENT_SCALE);
			transform.scale = Vec3::new(1.0, stretch, 1.0);
		}
	}
}

fn apply_arm_color(
	rig: Res<IkArmRig>,
	material: Res<ArmMaterial>,
	mut materials: ResMut<Assets<StandardMaterial>>,
	mut applied: Local<Option<Color>>,
) {
	let color = rig.arm_color();
	if *applied == Some(color) {
		return;
	}
	if let Some(material) = materials.get_mut(&material.0) {
		material.base_color = color;
		*applied = Some(color);
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use volley_common::{ArmSide, Pose};

	use crate::test::headless_app;
	use crate::TrainingMode;

	fn poses(hand_z: f32) -> TrackedPoses {
		TrackedPoses {
			head: Some(Pose::from_translation(Vec3::new(0.0, 1.64, 0.0))),
			left: Some(Pose::from_translation(Vec3::new(-0.2, 1.3, hand_z))),
			right: Some(Pose::from_translation(Vec3::new(0.2, 1.3, hand_z))),
		}
	}

	fn app() -> App {
		let mut app = headless_app(TrainingMode::Free);
		app.add_plugins(ArmsPlugin);
		app
	}

	#[test]
	fn test_spawns_kinematic_parts() {
		let mut app = app();
		app.update();
		let mut parts = app
			.world
			.query::<(&ArmPartId, &ColliderKind, &RigidBody, &Collider)>();
		let parts: Vec<_> = parts.iter(&app.world).collect();
		assert_eq!(parts.len(), 8);
		for (_, kind, body, _) in parts {
			assert_eq!(*kind, ColliderKind::Arm);
			assert_eq!(*body, RigidBody::KinematicPositionBased);
		}
	}

	#[test]
	fn test_parts_follow_rig() {
		let mut app = app();
		app.insert_resource(poses(-0.35));
		app.update();
		app.update();

		let rig = app.world.resource::<IkArmRig>().clone();
		assert!(rig.left.is_anchored());
		let mut parts = app.world.query::<(&ArmPartId, &Transform)>();
		for (id, transform) in parts.iter(&app.world) {
			let pose = rig.arm(id.side).part_pose(id.part);
			assert!(transform.translation.abs_diff_eq(pose.trans, 1e-5), "{id}");
			assert!(transform.rotation.abs_diff_eq(pose.rot, 1e-5), "{id}");
			if id.part == ArmPart::Forearm {
				assert!((transform.scale.y - 1.0).abs() < 1e-3, "{id}");
			}
		}
	}

	#[test]
	fn test_forearm_stretches_when_out_of_reach() {
		let mut app = app();
		app.insert_resource(poses(-1.5));
		app.update();

		let mut parts = app.world.query::<(&ArmPartId, &Transform)>();
		let forearm = ArmPartId::new(ArmSide::Right, ArmPart::Forearm);
		let (_, transform) = parts
			.iter(&app.world)
			.find(|(id, _)| **id == forearm)
			.unwrap();
		assert!(transform.scale.y > 1.5, "{}", transform.scale);
	}

	#[test]
	fn test_material_follows_arm_color() {
		let mut app = app();
		app.update();
		let settings = app.world.resource::<TrainerSettings>().clone();
		let handle = app.world.resource::<ArmMaterial>().0.clone();
		let color = |app: &App| {
			app.world
				.resource::<Assets<StandardMaterial>>()
				.get(&handle)
				.unwrap()
				.base_color
		};
		assert_eq!(color(&app), settings.arms.base_color);

		app.world
			.resource_mut::<IkArmRig>()
			.set_arm_color(settings.arms.ready_color);
		app.update();
		assert_eq!(color(&app), settings.arms.ready_color);

		app.world.resource_mut::<IkArmRig>().reset_arm_color();
		app.update();
		assert_eq!(color(&app), settings.arms.base_color);
	}
}
