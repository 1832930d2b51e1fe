//! Developer tooling, enabled with `--debug`.

use bevy::{
	app::{App, Plugin},
	diagnostic::{FrameTimeDiagnosticsPlugin, LogDiagnosticsPlugin},
};
use bevy_inspector_egui::quick::{ResourceInspectorPlugin, WorldInspectorPlugin};
use bevy_rapier3d::render::RapierDebugRenderPlugin;
use volley_common::TrainerSettings;

use crate::AppExt;

/// Frame times in the log, an entity inspector, a live settings editor and
/// collider wireframes.
#[derive(Debug, Default)]
pub struct DebugPlugin;

impl Plugin for DebugPlugin {
	fn build(&self, app: &mut App) {
		app.add_if_not_added(LogDiagnosticsPlugin::default())
			.add_if_not_added(FrameTimeDiagnosticsPlugin)
			.add_if_not_added(WorldInspectorPlugin::new())
			.add_if_not_added(ResourceInspectorPlugin::<TrainerSettings>::default())
			.add_if_not_added(RapierDebugRenderPlugin::default());
	}
}
