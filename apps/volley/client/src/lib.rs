#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]

mod arms;
mod balls;
mod contact;
mod debug;
mod gate;
mod receive;
mod rng;
mod scene;
mod tracking;

use std::path::PathBuf;
use std::time::Duration;

use bevy::app::{App, Plugin, PluginGroup, ScheduleRunnerPlugin, Update};
use bevy::ecs::schedule::{IntoSystemSetConfigs, SystemSet};
use bevy::ecs::system::Resource;
use bevy::log::info;
use bevy::prelude::{bevy_main, default};
use bevy::reflect::Reflect;
use bevy::winit::WinitPlugin;
use bevy_oxr::DefaultXrPlugins;
use bevy_rapier3d::plugin::RapierPhysicsPlugin;
use clap::{Parser, ValueEnum};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use derive_more::Display;
use volley_common::TrainerSettings;

pub use crate::arms::{ArmMaterial, ArmsPlugin};
pub use crate::balls::{
	Ball, BallCollisionRegistry, BallSpawner, BallsPlugin, GrabBegin, GrabEnd,
	GrabStates, Held, SpawnBall, SpawnedAt,
};
pub use crate::contact::{BallContact, BallImpact, BallResponder, ContactPlugin};
pub use crate::debug::DebugPlugin;
pub use crate::gate::{ArmBallFilter, ArmCollisionGate, GatePlugin};
pub use crate::receive::{ReceivePlatformState, ReceivePlugin, ReceiveSurface};
pub use crate::scene::{SceneCamera, ScenePlugin};
pub use crate::tracking::TrackingPlugin;

#[bevy_main]
pub fn main() -> Result<()> {
	color_eyre::install()?;

	let cli = Cli::parse();
	let settings = match &cli.settings {
		Some(path) => TrainerSettings::load(path).wrap_err_with(|| {
			format!("failed to load trainer settings from {}", path.display())
		})?,
		None => TrainerSettings::default(),
	};

	App::new()
		.add_plugins(MainPlugin {
			exec_mode: ExecutionMode::Normal,
			settings,
			mode: cli.mode,
			debug: cli.debug,
		})
		.run();
	Ok(())
}

#[derive(Parser, Debug)]
struct Cli {
	/// Json file with trainer settings. Missing fields use their defaults.
	#[clap(long)]
	settings: Option<PathBuf>,
	#[clap(long, value_enum, default_value = "free")]
	mode: TrainingMode,
	/// Enables the world inspector and physics debug rendering.
	#[clap(long)]
	debug: bool,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ExecutionMode {
	Normal,
	Testing,
}

#[derive(ValueEnum, Display, Debug, Clone, Copy, Eq, PartialEq, Default, Reflect)]
pub enum TrainingMode {
	/// Balls drop in front of the player, everything enabled.
	#[default]
	Free,
	/// Balls drop in front of the player to be tossed and served.
	Serve,
	/// Balls are passed towards the player to be received on the forearms.
	Receive,
}

/// Current training mode, passed to whatever needs to behave differently per
/// mode.
#[derive(Resource, Debug, Clone, PartialEq, Reflect)]
pub struct TrainingContext {
	pub mode: TrainingMode,
	pub receive_platform_enabled: bool,
}

impl TrainingContext {
	pub fn new(mode: TrainingMode) -> Self {
		Self {
			mode,
			receive_platform_enabled: mode != TrainingMode::Serve,
		}
	}
}

impl Default for TrainingContext {
	fn default() -> Self {
		Self::new(TrainingMode::default())
	}
}

/// Ordering of the trainer's systems within `Update`. Physics runs later, in
/// `PostUpdate`, and always sees the poses solved this frame.
#[derive(SystemSet, Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum VolleySet {
	/// Arm IK and part velocities.
	Solve,
	/// Spawning, grabbing and carrying balls.
	Balls,
	/// Receive platform and grab gate, both derived from the solved rig.
	Derive,
	/// Ball contact responses.
	Respond,
	/// Writing solved poses and colors back to entities.
	Apply,
}

/// Resources and set ordering shared by all of the trainer's plugins.
#[derive(Debug, Default)]
struct CorePlugin;

impl Plugin for CorePlugin {
	fn build(&self, app: &mut App) {
		app.register_type::<TrainerSettings>()
			.register_type::<TrainingContext>()
			.init_resource::<TrainerSettings>()
			.init_resource::<TrainingContext>()
			.configure_sets(
				Update,
				(
					VolleySet::Solve,
					VolleySet::Balls,
					VolleySet::Derive,
					VolleySet::Respond,
					VolleySet::Apply,
				)
					.chain(),
			);
	}
}

/// Add this to an `App` to get the trainer.
#[derive(Debug)]
pub struct MainPlugin {
	pub exec_mode: ExecutionMode,
	pub settings: TrainerSettings,
	pub mode: TrainingMode,
	pub debug: bool,
}

impl Plugin for MainPlugin {
	fn build(&self, app: &mut App) {
		let xr_plugins = DefaultXrPlugins {
			app_info: bevy_oxr::graphics::XrAppInfo {
				name: "Volley Trainer".to_string(),
			},
			..default()
		}
		.build();
		let xr_plugins = match &self.exec_mode {
			ExecutionMode::Normal => xr_plugins,
			ExecutionMode::Testing => xr_plugins
				.disable::<WinitPlugin>()
				.add(ScheduleRunnerPlugin::run_loop(Duration::from_secs(1) / 60)),
		};
		app.add_plugins(xr_plugins)
			.insert_resource(self.settings.clone())
			.insert_resource(TrainingContext::new(self.mode))
			.add_plugins(RapierPhysicsPlugin::<ArmBallFilter>::default())
			.add_plugins(TrackingPlugin)
			.add_plugins(ArmsPlugin)
			.add_plugins(BallsPlugin)
			.add_plugins(GatePlugin)
			.add_plugins(ReceivePlugin)
			.add_plugins(ContactPlugin)
			.add_plugins(ScenePlugin);
		if self.debug {
			app.add_plugins(DebugPlugin);
		}
		info!("built main app with config: {self:#?}");
	}
}

trait AppExt {
	fn add_if_not_added<T: Plugin>(&mut self, plugin: T) -> &mut Self;
}

impl AppExt for App {
	fn add_if_not_added<T: Plugin>(&mut self, plugin: T) -> &mut Self {
		if !self.is_plugin_added::<T>() {
			self.add_plugins(plugin);
		}
		self
	}
}
