//! Ball lifecycle: spawning, grabbing, carrying and despawning.
//!
//! Every live ball is in the [`BallCollisionRegistry`], which is what the grab
//! gate iterates over. Grabbing goes through [`GrabBegin`] and [`GrabEnd`],
//! sent by whatever interaction layer is attached.

use std::collections::HashMap;
use std::time::Duration;

use bevy::{
	app::{App, Plugin, PostUpdate, Startup, Update},
	asset::{Assets, Handle},
	core::Name,
	ecs::{
		component::Component,
		entity::Entity,
		event::{Event, EventReader, EventWriter},
		query::With,
		removal_detection::RemovedComponents,
		schedule::IntoSystemConfigs,
		system::{Commands, Local, Query, Res, ResMut, Resource},
	},
	hierarchy::DespawnRecursiveExt,
	log::{debug, info},
	math::{primitives::Sphere, Vec3},
	pbr::{PbrBundle, StandardMaterial},
	prelude::{default, Deref, DerefMut},
	render::{color::Color, mesh::Mesh},
	time::{Time, Timer, TimerMode},
	transform::components::Transform,
};
use bevy_rapier3d::{
	dynamics::{Ccd, Damping, ExternalImpulse, RigidBody, Velocity},
	geometry::{
		ActiveEvents, ActiveHooks, Collider, ColliderMassProperties, Friction,
		Restitution,
	},
};
use volley_common::{
	ArmPart, ArmPartId, ArmSide, BallRegistry, ColliderKind, GrabStateTracker,
	IkArmRig, TrainerSettings,
};

use crate::contact::{BallResponder, LastVelocity};
use crate::rng::seed_rng;
use crate::{AppExt, CorePlugin, TrainingContext, TrainingMode, VolleySet};

/// Largest random offset applied to a spawn position, per axis.
const SPAWN_JITTER: f32 = 0.1;

#[derive(Debug, Default)]
pub struct BallsPlugin;

impl Plugin for BallsPlugin {
	fn build(&self, app: &mut App) {
		app.add_if_not_added(CorePlugin)
			.init_resource::<BallCollisionRegistry>()
			.init_resource::<GrabStates>()
			.init_resource::<BallResponder>()
			.add_event::<SpawnBall>()
			.add_event::<GrabBegin>()
			.add_event::<GrabEnd>()
			.add_systems(Startup, setup_spawner)
			.add_systems(
				Update,
				(
					spawn_ball_timer,
					handle_spawn_ball,
					handle_grabs,
					carry_held_balls,
					despawn_spent_balls,
				)
					.chain()
					.in_set(VolleySet::Balls),
			)
			.add_systems(PostUpdate, forget_removed_balls);
	}
}

/// Marks a volleyball.
#[derive(Component, Debug, Default)]
pub struct Ball;

/// When the ball was spawned, in [`Time::elapsed`].
#[derive(Component, Debug, Clone, Copy, PartialEq, Deref)]
pub struct SpawnedAt(pub Duration);

/// A ball currently held in a hand.
#[derive(Component, Debug, Clone, Copy)]
pub struct Held {
	pub hand: ArmSide,
}

/// Every live ball, shared between the spawner and the grab gate.
#[derive(Resource, Debug, Default, Deref, DerefMut)]
pub struct BallCollisionRegistry(pub BallRegistry<Entity>);

#[derive(Resource, Debug, Default, Deref, DerefMut)]
pub struct GrabStates(pub GrabStateTracker<Entity>);

/// Where balls come from, and how fast they leave.
#[derive(Component, Debug)]
pub struct BallSpawner {
	mesh: Handle<Mesh>,
	material: Handle<StandardMaterial>,
	pub launch_velocity: Vec3,
}

/// Spawns a ball at every [`BallSpawner`].
#[derive(Event, Debug, Default)]
pub struct SpawnBall {
	pub name: Option<String>,
}

/// The interaction layer picked up `ball` with `hand`.
#[derive(Event, Debug, Clone, Copy)]
pub struct GrabBegin {
	pub ball: Entity,
	pub hand: ArmSide,
}

/// The interaction layer let go of `ball`.
#[derive(Event, Debug, Clone, Copy)]
pub struct GrabEnd {
	pub ball: Entity,
}

fn setup_spawner(
	mut commands: Commands,
	mut meshes: ResMut<Assets<Mesh>>,
	mut materials: ResMut<Assets<StandardMaterial>>,
	settings: Res<TrainerSettings>,
	context: Res<TrainingContext>,
) {
	let ball = &settings.ball;
	let (origin, launch_velocity) = match context.mode {
		TrainingMode::Receive => (ball.pass_origin, ball.pass_velocity),
		TrainingMode::Free | TrainingMode::Serve => (ball.drop_origin, Vec3::ZERO),
	};
	info!(mode = %context.mode, ?origin, "placing ball spawner");
	commands.spawn((
		BallSpawner {
			mesh: meshes.add(Mesh::from(Sphere::new(ball.radius))),
			material: materials.add(StandardMaterial::from(Color::rgb(0.95, 0.85, 0.2))),
			launch_velocity,
		},
		Transform::from_translation(origin),
		Name::new("Ball Spawner"),
	));
}

/// Sends [`SpawnBall`] on a timer, unless enough balls are alive already.
fn spawn_ball_timer(
	mut timer: Local<Option<Timer>>,
	time: Res<Time>,
	settings: Res<TrainerSettings>,
	registry: Res<BallCollisionRegistry>,
	mut spawn_ball_evw: EventWriter<SpawnBall>,
) {
	let interval = Duration::from_secs_f32(settings.ball.spawn_interval_secs);
	let timer = timer.get_or_insert_with(|| Timer::new(interval, TimerMode::Repeating));
	if timer.duration() != interval {
		timer.set_duration(interval);
	}
	if timer.tick(time.delta()).just_finished()
		&& registry.len() < settings.ball.max_balls as usize
	{
		spawn_ball_evw.send_default();
	}
}

seed_rng!(SpawnBallRng, SpawnBallSeed);

/// Listens to [`SpawnBall`] and spawns a ball at all [`BallSpawner`]s.
fn handle_spawn_ball(
	mut rng: Local<SpawnBallRng>,
	mut ball_num: Local<u64>,
	mut commands: Commands,
	time: Res<Time>,
	settings: Res<TrainerSettings>,
	mut registry: ResMut<BallCollisionRegistry>,
	spawners: Query<(&BallSpawner, &Transform)>,
	mut spawn_ball_evr: EventReader<SpawnBall>,
) {
	let ball = &settings.ball;
	for spawn_ball_evt in spawn_ball_evr.read() {
		for (spawner, spawn_at) in spawners.iter() {
			let offset = rng.offset(SPAWN_JITTER);
			let name = match &spawn_ball_evt.name {
				Some(name) => name.clone(),
				None => format!("Ball {}", *ball_num),
			};
			*ball_num += 1;

			let entity = commands
				.spawn((
					PbrBundle {
						mesh: spawner.mesh.clone(),
						material: spawner.material.clone(),
						transform: Transform::from_translation(
							spawn_at.translation + offset,
						),
						..default()
					},
					Ball,
					SpawnedAt(time.elapsed()),
					ColliderKind::Ball,
					RigidBody::Dynamic,
					Collider::ball(ball.radius),
					ColliderMassProperties::Mass(ball.mass),
					Restitution::coefficient(ball.restitution),
					Friction::coefficient(ball.friction),
					Damping {
						linear_damping: ball.linear_damping,
						angular_damping: ball.angular_damping,
					},
				))
				.insert((
					Velocity::linear(spawner.launch_velocity),
					LastVelocity(spawner.launch_velocity),
					ExternalImpulse::default(),
					ActiveEvents::COLLISION_EVENTS,
					ActiveHooks::FILTER_CONTACT_PAIRS,
					Ccd::enabled(),
					Name::new(name),
				))
				.id();
			registry.register(entity);
		}
	}
}

fn hand_part(hand: ArmSide) -> ArmPartId {
	ArmPartId::new(hand, ArmPart::Hand)
}

/// Held balls become kinematic and follow the hand. On release they become
/// dynamic again and keep the hand's velocity, so they can be tossed.
///
/// The holding hand is tracked here rather than read back from [`Held`], which
/// only shows up once commands are applied.
fn handle_grabs(
	mut hands: Local<HashMap<Entity, ArmSide>>,
	mut commands: Commands,
	time: Res<Time>,
	rig: Res<IkArmRig>,
	registry: Res<BallCollisionRegistry>,
	mut grabs: ResMut<GrabStates>,
	mut grab_begin_evr: EventReader<GrabBegin>,
	mut grab_end_evr: EventReader<GrabEnd>,
) {
	hands.retain(|ball, _| grabs.is_held(ball));
	for evt in grab_begin_evr.read() {
		if !registry.contains(&evt.ball) {
			debug!(ball = ?evt.ball, "ignoring grab of unknown ball");
			continue;
		}
		grabs.on_grab_begin(evt.ball);
		hands.insert(evt.ball, evt.hand);
		commands
			.entity(evt.ball)
			.insert((Held { hand: evt.hand }, RigidBody::KinematicPositionBased));
	}
	for evt in grab_end_evr.read() {
		let Some(hand) = hands.remove(&evt.ball) else {
			debug!(ball = ?evt.ball, "ignoring release of a ball that is not held");
			continue;
		};
		grabs.on_grab_end(evt.ball, time.elapsed());
		let throw = rig.arm_velocity(hand_part(hand));
		commands
			.entity(evt.ball)
			.remove::<Held>()
			.insert((RigidBody::Dynamic, Velocity::linear(throw)));
	}
}

fn carry_held_balls(
	rig: Res<IkArmRig>,
	settings: Res<TrainerSettings>,
	mut balls: Query<(&Held, &mut Transform), With<Ball>>,
) {
	// the ball rests in front of the palm
	let reach = settings.arms.hand_radius + settings.ball.radius;
	for (held, mut transform) in balls.iter_mut() {
		let hand = rig.arm(held.hand).hand;
		transform.translation = hand.trans + hand.rot * Vec3::new(0.0, 0.0, -reach);
	}
}

/// Despawns balls that fell out of the world, and free balls past their
/// lifetime so that the spawner never stalls at `max_balls`.
fn despawn_spent_balls(
	mut commands: Commands,
	time: Res<Time>,
	settings: Res<TrainerSettings>,
	grabs: Res<GrabStates>,
	balls: Query<(Entity, &Transform, &SpawnedAt), With<Ball>>,
) {
	let lifetime = settings.ball.lifetime();
	for (entity, transform, spawned_at) in balls.iter() {
		if transform.translation.y < settings.ball.despawn_height {
			debug!(ball = ?entity, "despawning fallen ball");
			commands.entity(entity).despawn_recursive();
		} else if time.elapsed().saturating_sub(**spawned_at) >= lifetime
			&& !grabs.is_held(&entity)
		{
			debug!(ball = ?entity, "despawning expired ball");
			commands.entity(entity).despawn_recursive();
		}
	}
}

/// Drops all per ball state of balls that were despawned, by us or anyone else.
fn forget_removed_balls(
	mut removed: RemovedComponents<Ball>,
	mut registry: ResMut<BallCollisionRegistry>,
	mut grabs: ResMut<GrabStates>,
	mut responder: ResMut<BallResponder>,
) {
	for ball in removed.read() {
		registry.unregister(&ball);
		grabs.remove(&ball);
		responder.forget(&ball);
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use volley_common::{Pose, TrackedPoses};

	use crate::test::{headless_app, FRAME};
	use crate::ArmsPlugin;

	fn app(mode: TrainingMode) -> App {
		let mut app = headless_app(mode);
		app.add_plugins(ArmsPlugin).add_plugins(BallsPlugin);
		app.update();
		app
	}

	fn balls(app: &mut App) -> Vec<Entity> {
		app.world
			.query_filtered::<Entity, With<Ball>>()
			.iter(&app.world)
			.collect()
	}

	#[test]
	fn test_spawn_event_registers_ball() {
		let mut app = app(TrainingMode::Free);
		app.world.send_event(SpawnBall {
			name: Some("Test Ball".to_string()),
		});
		app.update();

		let spawned = balls(&mut app);
		assert_eq!(spawned.len(), 1);
		let ball = spawned[0];
		assert!(app.world.resource::<BallCollisionRegistry>().contains(&ball));
		let entity = app.world.entity(ball);
		assert_eq!(entity.get::<Name>().unwrap().as_str(), "Test Ball");
		assert_eq!(*entity.get::<ColliderKind>().unwrap(), ColliderKind::Ball);
		let drop = app.world.resource::<TrainerSettings>().ball.drop_origin;
		let at = entity.get::<Transform>().unwrap().translation;
		assert!((at - drop).abs().max_element() <= SPAWN_JITTER + 1e-5);
		assert_eq!(entity.get::<Velocity>().unwrap().linvel, Vec3::ZERO);
	}

	#[test]
	fn test_receive_mode_passes_balls() {
		let mut app = app(TrainingMode::Receive);
		app.world.send_event(SpawnBall::default());
		app.update();
		let ball = balls(&mut app)[0];
		let pass = app.world.resource::<TrainerSettings>().ball.pass_velocity;
		let velocity = app.world.entity(ball).get::<Velocity>().unwrap().linvel;
		assert_eq!(velocity, pass);
	}

	#[test]
	fn test_timer_spawns_up_to_max() {
		let mut settings = TrainerSettings::default();
		settings.ball.spawn_interval_secs = FRAME.as_secs_f32() * 2.0;
		settings.ball.max_balls = 3;
		let mut app = headless_app(TrainingMode::Free);
		app.insert_resource(settings)
			.add_plugins(ArmsPlugin)
			.add_plugins(BallsPlugin);
		for _ in 0..30 {
			app.update();
		}
		assert_eq!(balls(&mut app).len(), 3);
		assert_eq!(app.world.resource::<BallCollisionRegistry>().len(), 3);
	}

	#[test]
	fn test_fallen_balls_are_despawned_and_forgotten() {
		let mut app = app(TrainingMode::Free);
		app.world.send_event(SpawnBall::default());
		app.update();
		let ball = balls(&mut app)[0];
		app.world.send_event(GrabBegin {
			ball,
			hand: ArmSide::Left,
		});
		app.update();
		app.world.send_event(GrabEnd { ball });
		app.update();

		app.world.entity_mut(ball).get_mut::<Transform>().unwrap().translation.y = -10.0;
		app.update();
		app.update();
		assert!(app.world.get_entity(ball).is_none());
		assert!(!app.world.resource::<BallCollisionRegistry>().contains(&ball));
		assert_eq!(
			app.world.resource::<GrabStates>().state(&ball),
			Default::default()
		);
	}

	#[test]
	fn test_grab_carries_and_throws() {
		let mut app = app(TrainingMode::Serve);
		let mut hand = Vec3::new(0.2, 1.2, -0.3);
		let poses = |hand: Vec3| TrackedPoses {
			head: Some(Pose::from_translation(Vec3::new(0.0, 1.64, 0.0))),
			left: Some(Pose::from_translation(Vec3::new(-0.2, 1.2, -0.3))),
			right: Some(Pose::from_translation(hand)),
		};
		app.insert_resource(poses(hand));
		app.world.send_event(SpawnBall::default());
		app.update();
		let ball = balls(&mut app)[0];

		app.world.send_event(GrabBegin {
			ball,
			hand: ArmSide::Right,
		});
		app.update();
		assert!(app.world.resource::<GrabStates>().is_held(&ball));
		assert_eq!(
			*app.world.entity(ball).get::<RigidBody>().unwrap(),
			RigidBody::KinematicPositionBased
		);

		// toss upwards
		let toss = Vec3::new(0.0, 3.0, 0.0);
		for _ in 0..20 {
			hand += toss * FRAME.as_secs_f32();
			app.insert_resource(poses(hand));
			app.update();
		}
		let rig_hand = app.world.resource::<IkArmRig>().right.hand.trans;
		let carried = app.world.entity(ball).get::<Transform>().unwrap().translation;
		assert!(carried.distance(rig_hand) < 0.2);

		// release mid swing
		hand += toss * FRAME.as_secs_f32();
		app.insert_resource(poses(hand));
		app.world.send_event(GrabEnd { ball });
		app.update();
		let grabs = app.world.resource::<GrabStates>();
		assert!(!grabs.is_held(&ball));
		assert!(grabs.state(&ball).last_release.is_some());
		let entity = app.world.entity(ball);
		assert!(entity.get::<Held>().is_none());
		assert_eq!(*entity.get::<RigidBody>().unwrap(), RigidBody::Dynamic);
		let thrown = entity.get::<Velocity>().unwrap().linvel;
		assert!(thrown.abs_diff_eq(toss, 0.1), "{thrown}");
	}

	#[test]
	fn test_release_of_free_ball_keeps_its_velocity() {
		let mut app = app(TrainingMode::Receive);
		app.world.send_event(SpawnBall::default());
		app.update();
		let ball = balls(&mut app)[0];
		let pass = app.world.resource::<TrainerSettings>().ball.pass_velocity;

		app.world.send_event(GrabEnd { ball });
		app.update();
		let entity = app.world.entity(ball);
		assert_eq!(entity.get::<Velocity>().unwrap().linvel, pass);
		assert_eq!(*entity.get::<RigidBody>().unwrap(), RigidBody::Dynamic);
		let grabs = app.world.resource::<GrabStates>();
		assert_eq!(grabs.state(&ball).last_release, None);
	}

	#[test]
	fn test_grab_and_release_in_one_frame() {
		let mut app = app(TrainingMode::Free);
		app.world.send_event(SpawnBall::default());
		app.update();
		let ball = balls(&mut app)[0];

		app.world.send_event(GrabBegin {
			ball,
			hand: ArmSide::Left,
		});
		app.world.send_event(GrabEnd { ball });
		app.update();
		let grabs = app.world.resource::<GrabStates>();
		assert!(!grabs.is_held(&ball));
		assert!(grabs.state(&ball).last_release.is_some());
		let entity = app.world.entity(ball);
		assert!(entity.get::<Held>().is_none());
		assert_eq!(*entity.get::<RigidBody>().unwrap(), RigidBody::Dynamic);
	}

	#[test]
	fn test_expired_balls_make_room_for_new_ones() {
		let mut settings = TrainerSettings::default();
		settings.ball.spawn_interval_secs = FRAME.as_secs_f32() * 2.0;
		settings.ball.lifetime_secs = FRAME.as_secs_f32() * 5.0;
		settings.ball.max_balls = 1;
		let mut app = headless_app(TrainingMode::Free);
		app.insert_resource(settings)
			.add_plugins(ArmsPlugin)
			.add_plugins(BallsPlugin);

		let mut seen = Vec::new();
		for _ in 0..40 {
			app.update();
			let alive = balls(&mut app);
			assert!(alive.len() <= 1);
			for ball in alive {
				if !seen.contains(&ball) {
					seen.push(ball);
				}
			}
		}
		assert!(seen.len() >= 3, "{seen:?}");
	}

	#[test]
	fn test_held_ball_does_not_expire() {
		let mut settings = TrainerSettings::default();
		settings.ball.lifetime_secs = FRAME.as_secs_f32() * 3.0;
		let mut app = headless_app(TrainingMode::Free);
		app.insert_resource(settings)
			.add_plugins(ArmsPlugin)
			.add_plugins(BallsPlugin);
		app.update();
		app.world.send_event(SpawnBall::default());
		app.update();
		let ball = balls(&mut app)[0];
		app.world.send_event(GrabBegin {
			ball,
			hand: ArmSide::Right,
		});
		for _ in 0..10 {
			app.update();
		}
		assert!(app.world.get_entity(ball).is_some());

		app.world.send_event(GrabEnd { ball });
		app.update();
		app.update();
		assert!(app.world.get_entity(ball).is_none());
		assert!(!app.world.resource::<BallCollisionRegistry>().contains(&ball));
	}

	#[test]
	fn test_grabbing_unknown_entity_is_ignored() {
		let mut app = app(TrainingMode::Free);
		let stranger = app.world.spawn_empty().id();
		app.world.send_event(GrabBegin {
			ball: stranger,
			hand: ArmSide::Left,
		});
		app.update();
		assert!(!app.world.resource::<GrabStates>().is_held(&stranger));
		assert!(app.world.entity(stranger).get::<Held>().is_none());
	}
}
