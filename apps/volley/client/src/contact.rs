//! Feeds physics contacts involving balls to the [`CollisionResponder`] and
//! applies what it decides.
//!
//! Contact events are read in `Update`, one frame after the physics step that
//! produced them. By then the engine has already resolved the bounce, so the
//! ball's velocity from before that step is kept in [`LastVelocity`].

use bevy::{
	app::{App, Plugin, PostUpdate, Update},
	ecs::{
		component::Component,
		entity::Entity,
		event::{Event, EventReader, EventWriter},
		query::With,
		schedule::IntoSystemConfigs,
		system::{Local, ParamSet, Query, Res, ResMut, Resource},
	},
	log::trace,
	math::Vec3,
	prelude::{Deref, DerefMut},
	time::Time,
};
use bevy_rapier3d::{
	dynamics::{ExternalImpulse, RigidBody, Velocity},
	pipeline::CollisionEvent,
	plugin::{PhysicsSet, RapierContext},
};
use volley_common::contact::{BodyMotion, OtherBody};
use volley_common::{
	platform_velocity, ArmPartId, ColliderKind, CollisionResponder, ContactInput,
	IkArmRig, ImpactSound, TrainerSettings,
};

use crate::balls::Ball;
use crate::gate::ArmCollisionGate;
use crate::receive::ReceiveSurface;
use crate::rng::seed_rng;
use crate::{AppExt, CorePlugin, VolleySet};

#[derive(Debug, Default)]
pub struct ContactPlugin;

impl Plugin for ContactPlugin {
	fn build(&self, app: &mut App) {
		app.add_if_not_added(CorePlugin)
			.init_resource::<BallResponder>()
			.add_event::<BallContact>()
			.add_event::<BallImpact>()
			.add_systems(
				Update,
				(collect_ball_contacts, respond_to_ball_contacts)
					.chain()
					.in_set(VolleySet::Respond),
			)
			.add_systems(
				PostUpdate,
				record_last_velocity.before(PhysicsSet::SyncBackend),
			);
	}
}

/// Linear velocity of a body right before the latest physics step.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Deref)]
pub struct LastVelocity(pub Vec3);

#[derive(Resource, Debug, Default, Deref, DerefMut)]
pub struct BallResponder(pub CollisionResponder<Entity>);

/// A ball started touching `other`.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct BallContact {
	pub ball: Entity,
	pub other: Entity,
	/// Points away from `other`, towards the ball.
	pub normal: Vec3,
	pub point_count: usize,
}

/// A ball hit something hard enough to be heard.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct BallImpact {
	pub ball: Entity,
	pub sound: ImpactSound,
}

fn record_last_velocity(mut bodies: Query<(&Velocity, &mut LastVelocity)>) {
	for (velocity, mut last) in bodies.iter_mut() {
		last.0 = velocity.linvel;
	}
}

/// Turns new collisions into [`BallContact`]s, one per ball involved.
fn collect_ball_contacts(
	context: Option<Res<RapierContext>>,
	balls: Query<(), With<Ball>>,
	mut collision_evr: EventReader<CollisionEvent>,
	mut contact_evw: EventWriter<BallContact>,
) {
	let Some(context) = context else {
		collision_evr.clear();
		return;
	};
	for evt in collision_evr.read() {
		let CollisionEvent::Started(e1, e2, _flags) = *evt else {
			continue;
		};
		let Some(pair) = context.contact_pair(e1, e2) else {
			continue;
		};
		let mut normal = None;
		let mut point_count = 0;
		for manifold in pair.manifolds() {
			if manifold.num_points() > 0 && normal.is_none() {
				normal = Some(manifold.normal());
			}
			point_count += manifold.num_points();
		}
		let Some(normal) = normal else {
			continue;
		};
		// the manifold normal points from collider1 towards collider2
		let collider1 = pair.collider1();
		for (ball, other) in [(e1, e2), (e2, e1)] {
			if !balls.contains(ball) {
				continue;
			}
			let normal = if collider1 == ball { -normal } else { normal };
			contact_evw.send(BallContact {
				ball,
				other,
				normal,
				point_count,
			});
		}
	}
}

seed_rng!(ImpactRng, ImpactSeed);

fn respond_to_ball_contacts(
	mut rng: Local<ImpactRng>,
	time: Res<Time>,
	settings: Res<TrainerSettings>,
	rig: Option<Res<IkArmRig>>,
	gate: Option<Res<ArmCollisionGate>>,
	mut responder: ResMut<BallResponder>,
	kinds: Query<&ColliderKind>,
	arm_parts: Query<&ArmPartId>,
	platforms: Query<(), With<ReceiveSurface>>,
	mut bodies: ParamSet<(
		Query<(Option<&RigidBody>, Option<&Velocity>, Option<&LastVelocity>)>,
		Query<(&mut ExternalImpulse, &mut Velocity), With<Ball>>,
	)>,
	mut contact_evr: EventReader<BallContact>,
	mut impact_evw: EventWriter<BallImpact>,
) {
	let now = time.elapsed();
	for contact in contact_evr.read() {
		let kind = kinds
			.get(contact.other)
			.copied()
			.unwrap_or(ColliderKind::Generic);
		let other = match (kind, rig.as_deref()) {
			(ColliderKind::Arm, Some(rig)) => {
				let velocity = if let Ok(id) = arm_parts.get(contact.other) {
					rig.arm_velocity(*id)
				} else if platforms.contains(contact.other) {
					platform_velocity(rig)
				} else {
					Vec3::ZERO
				};
				OtherBody::arm(velocity)
			}
			(ColliderKind::Arm, None) => OtherBody::arm(Vec3::ZERO),
			_ => other_body(kind, bodies.p0().get(contact.other).ok()),
		};

		let ball_velocity = match bodies.p0().get(contact.ball) {
			Ok((_, velocity, last_velocity)) => body_velocity(velocity, last_velocity),
			Err(_) => continue,
		};
		let input = ContactInput {
			ball_velocity,
			normal: contact.normal,
			point_count: contact.point_count,
			other,
			arm_contact_allowed: gate
				.as_ref()
				.map(|gate| gate.should_collide(&contact.ball))
				.unwrap_or(true),
		};
		let Some(response) = responder.handle(
			contact.ball,
			now,
			&input,
			&settings.contact,
			rng.jitter(),
		) else {
			continue;
		};

		if let Ok((mut impulse, mut velocity)) = bodies.p1().get_mut(contact.ball) {
			impulse.impulse += response.impulse;
			velocity.linvel += response.velocity_boost;
			trace!(
				ball = ?contact.ball,
				impulse = ?response.impulse,
				boost = ?response.velocity_boost,
				"applied contact response"
			);
		}
		if let Some(sound) = response.sound {
			impact_evw.send(BallImpact {
				ball: contact.ball,
				sound,
			});
		}
	}
}

/// Prefers the velocity from before the physics step that reported the contact.
fn body_velocity(velocity: Option<&Velocity>, last_velocity: Option<&LastVelocity>) -> Vec3 {
	last_velocity
		.map(|v| v.0)
		.or(velocity.map(|v| v.linvel))
		.unwrap_or(Vec3::ZERO)
}

fn other_body(
	kind: ColliderKind,
	body: Option<(Option<&RigidBody>, Option<&Velocity>, Option<&LastVelocity>)>,
) -> OtherBody {
	let Some((Some(body), velocity, last_velocity)) = body else {
		return OtherBody::fixed(kind);
	};
	let velocity = body_velocity(velocity, last_velocity);
	let motion = match body {
		RigidBody::Fixed => None,
		RigidBody::Dynamic => Some(BodyMotion {
			velocity,
			kinematic: false,
		}),
		RigidBody::KinematicPositionBased | RigidBody::KinematicVelocityBased => {
			Some(BodyMotion {
				velocity,
				kinematic: true,
			})
		}
	};
	OtherBody { kind, motion }
}
