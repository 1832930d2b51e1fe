//! The forearm platform as an entity: a visible quad with a thin collider,
//! shown while the player holds a receiving pose.

use bevy::{
	app::{App, Plugin, Startup, Update},
	asset::{Assets, Handle},
	core::Name,
	ecs::{
		component::Component,
		entity::Entity,
		query::With,
		schedule::IntoSystemConfigs,
		system::{Commands, Query, Res, ResMut, Resource},
	},
	log::{info, warn},
	math::Vec3,
	pbr::{AlphaMode, PbrBundle, StandardMaterial},
	prelude::{default, Deref, DerefMut},
	render::{
		color::Color,
		mesh::{Indices, Mesh, PrimitiveTopology},
		render_asset::RenderAssetUsages,
		view::{NoFrustumCulling, Visibility},
	},
	transform::components::Transform,
};
use bevy_rapier3d::{
	dynamics::RigidBody,
	geometry::{Collider, ColliderDisabled},
};
use volley_common::{
	ColliderKind, IkArmRig, PlatformQuad, PlatformTransition, ReceivePlatform,
	TrainerSettings,
};

use crate::{AppExt, ArmsPlugin, CorePlugin, TrainingContext, VolleySet};

#[derive(Debug, Default)]
pub struct ReceivePlugin;

impl Plugin for ReceivePlugin {
	fn build(&self, app: &mut App) {
		app.add_if_not_added(CorePlugin)
			.add_if_not_added(ArmsPlugin)
			.init_resource::<ReceivePlatformState>()
			.add_systems(Startup, spawn_receive_surface)
			.add_systems(Update, update_receive_platform.in_set(VolleySet::Derive))
			.add_systems(Update, place_receive_surface.in_set(VolleySet::Apply));
	}
}

#[derive(Resource, Debug, Default, Deref, DerefMut)]
pub struct ReceivePlatformState(pub ReceivePlatform);

/// Marks the platform entity. Its collider counts as an arm.
#[derive(Component, Debug, Default)]
pub struct ReceiveSurface;

fn empty_mesh() -> Mesh {
	Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
}

fn write_quad(mesh: &mut Mesh, quad: &PlatformQuad) {
	let normal = quad.normal().to_array();
	let positions: Vec<[f32; 3]> =
		quad.local_corners().iter().map(|c| c.to_array()).collect();
	mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
	mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, vec![normal; 4]);
	mesh.insert_indices(Indices::U32(PlatformQuad::INDICES.to_vec()));
}

fn spawn_receive_surface(
	mut commands: Commands,
	mut meshes: ResMut<Assets<Mesh>>,
	mut materials: ResMut<Assets<StandardMaterial>>,
	settings: Res<TrainerSettings>,
) {
	let color = settings.arms.ready_color;
	commands.spawn((
		PbrBundle {
			mesh: meshes.add(empty_mesh()),
			material: materials.add(StandardMaterial {
				base_color: Color::rgba(color.r(), color.g(), color.b(), 0.6),
				alpha_mode: AlphaMode::Blend,
				double_sided: true,
				cull_mode: None,
				..default()
			}),
			visibility: Visibility::Hidden,
			..default()
		},
		NoFrustumCulling,
		ReceiveSurface,
		ColliderKind::Arm,
		RigidBody::KinematicPositionBased,
		Collider::ball(settings.arms.hand_radius),
		ColliderDisabled,
		Name::new("Receive Platform"),
	));
}

fn update_receive_platform(
	mut platform: ResMut<ReceivePlatformState>,
	mut rig: ResMut<IkArmRig>,
	context: Res<TrainingContext>,
	settings: Res<TrainerSettings>,
) {
	let transition =
		platform.update(&mut rig, context.receive_platform_enabled, &settings);
	match transition {
		Some(PlatformTransition::Activated) => info!("receive platform activated"),
		Some(PlatformTransition::Deactivated) => info!("receive platform deactivated"),
		None => (),
	}
}

fn place_receive_surface(
	mut commands: Commands,
	platform: Res<ReceivePlatformState>,
	settings: Res<TrainerSettings>,
	mut meshes: ResMut<Assets<Mesh>>,
	mut surfaces: Query<
		(Entity, &Handle<Mesh>, &mut Transform, &mut Visibility),
		With<ReceiveSurface>,
	>,
) {
	for (entity, mesh, mut transform, mut visibility) in surfaces.iter_mut() {
		let Some(quad) = platform.quad() else {
			if *visibility != Visibility::Hidden {
				*visibility = Visibility::Hidden;
				commands.entity(entity).insert(ColliderDisabled);
			}
			continue;
		};

		*transform = Transform::from_translation(quad.center());
		if let Some(mesh) = meshes.get_mut(mesh) {
			write_quad(mesh, quad);
		}
		let points = quad.collision_points(settings.receive.platform_thickness);
		match Collider::convex_hull(&points) {
			Some(collider) => {
				commands.entity(entity).insert(collider).remove::<ColliderDisabled>();
			}
			None => {
				warn!("degenerate receive platform, disabling its collider");
				commands.entity(entity).insert(ColliderDisabled);
			}
		}
		*visibility = Visibility::Visible;
	}
}
