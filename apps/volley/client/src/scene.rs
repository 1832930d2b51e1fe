//! Static scenery: the floor, lights and the flat screen camera.

use bevy::{
	app::{App, Plugin, Startup},
	asset::Assets,
	core::Name,
	core_pipeline::core_3d::Camera3dBundle,
	ecs::{
		component::Component,
		system::{Commands, ResMut},
	},
	log::warn,
	math::{primitives::Plane3d, Vec3},
	pbr::{
		light_consts, AmbientLight, DirectionalLight, DirectionalLightBundle,
		PbrBundle, StandardMaterial,
	},
	prelude::default,
	render::{
		color::Color,
		mesh::{Mesh, Meshable},
	},
	transform::components::Transform,
};
use bevy_rapier3d::geometry::{Collider, Friction, Restitution};
use volley_common::ColliderKind;

use crate::{AppExt, CorePlugin};

/// Eye height of the flat screen camera.
const FLAT_EYE_HEIGHT: f32 = 1.65;
const FLOOR_SIZE: f32 = 18.0;

/// The camera used when running without a headset.
#[derive(Component, Debug, Default)]
pub struct SceneCamera;

#[derive(Debug, Default)]
pub struct ScenePlugin;

impl Plugin for ScenePlugin {
	fn build(&self, app: &mut App) {
		app.add_if_not_added(CorePlugin)
			.add_systems(Startup, setup);
	}
}

fn setup(
	mut commands: Commands,
	mut meshes: ResMut<Assets<Mesh>>,
	mut materials: ResMut<Assets<StandardMaterial>>,
) {
	commands.insert_resource(AmbientLight {
		color: Color::WHITE,
		brightness: 400.0,
	});

	// floor
	let mut floor = commands.spawn((
		PbrBundle {
			mesh: meshes.add(
				Plane3d::new(Vec3::Y).mesh().size(FLOOR_SIZE, FLOOR_SIZE).build(),
			),
			material: materials.add(StandardMaterial::from(Color::rgb(0.76, 0.6, 0.42))),
			..default()
		},
		ColliderKind::Ground,
		Restitution::coefficient(0.6),
		Friction::coefficient(0.8),
		Name::new("Floor"),
	));
	match Collider::halfspace(Vec3::Y) {
		Some(collider) => {
			floor.insert(collider);
		}
		None => warn!("failed to create floor collider, balls will fall through"),
	}

	// sunlight
	commands.spawn(DirectionalLightBundle {
		directional_light: DirectionalLight {
			illuminance: light_consts::lux::OVERCAST_DAY,
			shadows_enabled: true,
			..default()
		},
		transform: Transform::from_xyz(0.3, 1.0, 0.2).looking_at(Vec3::ZERO, Vec3::Y),
		..default()
	});

	// camera
	commands.spawn((
		Camera3dBundle {
			transform: Transform::from_xyz(0.0, FLAT_EYE_HEIGHT, 0.0)
				.looking_at(Vec3::new(0.0, 1.0, -3.0), Vec3::Y),
			..default()
		},
		SceneCamera,
		Name::new("Flat Camera"),
	));
}

#[cfg(test)]
mod test {
	use super::*;
	use bevy::ecs::query::With;

	use crate::test::headless_app;
	use crate::TrainingMode;

	#[test]
	fn test_scene_has_floor_and_camera() {
		let mut app = headless_app(TrainingMode::Free);
		app.add_plugins(ScenePlugin);
		app.update();

		let kinds: Vec<ColliderKind> = app
			.world
			.query::<&ColliderKind>()
			.iter(&app.world)
			.copied()
			.collect();
		assert_eq!(kinds, vec![ColliderKind::Ground]);
		let mut floor = app
			.world
			.query_filtered::<&Collider, With<ColliderKind>>();
		assert_eq!(floor.iter(&app.world).count(), 1);
		let mut camera = app.world.query_filtered::<&Transform, With<SceneCamera>>();
		let camera = camera.single(&app.world);
		assert!((camera.translation.y - FLAT_EYE_HEIGHT).abs() < 1e-5);
	}
}
