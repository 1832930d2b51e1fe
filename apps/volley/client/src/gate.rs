//! Keeps held and just released balls from colliding with the arms.

use bevy::{
	app::{App, Plugin, Update},
	ecs::{
		entity::Entity,
		schedule::IntoSystemConfigs,
		system::{Query, Res, ResMut, Resource, SystemParam},
	},
	log::debug,
	prelude::{Deref, DerefMut},
	time::Time,
};
use bevy_rapier3d::prelude::{BevyPhysicsHooks, PairFilterContextView, SolverFlags};
use volley_common::{ColliderKind, CollisionGate, TrainerSettings};

use crate::balls::{BallCollisionRegistry, GrabStates};
use crate::{AppExt, CorePlugin, VolleySet};

#[derive(Debug, Default)]
pub struct GatePlugin;

impl Plugin for GatePlugin {
	fn build(&self, app: &mut App) {
		app.add_if_not_added(CorePlugin)
			.init_resource::<ArmCollisionGate>()
			.init_resource::<BallCollisionRegistry>()
			.init_resource::<GrabStates>()
			.add_systems(Update, refresh_collision_gate.in_set(VolleySet::Derive));
	}
}

/// Balls that must not generate contacts with arm colliders this frame.
#[derive(Resource, Debug, Default, Deref, DerefMut)]
pub struct ArmCollisionGate(pub CollisionGate<Entity>);

fn refresh_collision_gate(
	time: Res<Time>,
	settings: Res<TrainerSettings>,
	registry: Res<BallCollisionRegistry>,
	grabs: Res<GrabStates>,
	mut gate: ResMut<ArmCollisionGate>,
) {
	let before = gate.suppressed().count();
	gate.refresh(
		&registry,
		&grabs,
		time.elapsed(),
		settings.grab.release_cooldown(),
	);
	let after = gate.suppressed().count();
	if before != after {
		debug!(suppressed = after, "arm collisions gated");
	}
}

/// The ball of an arm/ball pair, `None` for any other pair.
fn arm_ball_pair(
	first: (Entity, Option<ColliderKind>),
	second: (Entity, Option<ColliderKind>),
) -> Option<Entity> {
	match (first.1, second.1) {
		(Some(ColliderKind::Arm), Some(ColliderKind::Ball)) => Some(second.0),
		(Some(ColliderKind::Ball), Some(ColliderKind::Arm)) => Some(first.0),
		_ => None,
	}
}

/// Contact pair filter installed into the physics pipeline.
///
/// Only pairs where one collider opts in with `ActiveHooks::FILTER_CONTACT_PAIRS`
/// reach this, which balls do.
#[derive(SystemParam)]
pub struct ArmBallFilter<'w, 's> {
	kinds: Query<'w, 's, &'static ColliderKind>,
	gate: Option<Res<'w, ArmCollisionGate>>,
}

impl ArmBallFilter<'_, '_> {
	pub fn allows(&self, collider1: Entity, collider2: Entity) -> bool {
		let Some(gate) = self.gate.as_ref() else {
			return true;
		};
		let kind = |e: Entity| self.kinds.get(e).ok().copied();
		match arm_ball_pair((collider1, kind(collider1)), (collider2, kind(collider2))) {
			Some(ball) => gate.should_collide(&ball),
			None => true,
		}
	}
}

impl BevyPhysicsHooks for ArmBallFilter<'_, '_> {
	fn filter_contact_pair(&self, context: PairFilterContextView) -> Option<SolverFlags> {
		self.allows(context.collider1(), context.collider2())
			.then_some(SolverFlags::COMPUTE_IMPULSES)
	}
}
