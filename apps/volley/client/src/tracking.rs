//! Fills [`TrackedPoses`] from OpenXR, or from the flat camera when there is
//! no headset.

use bevy::{
	app::{App, Plugin, PreUpdate},
	ecs::{
		query::With,
		schedule::{common_conditions::not, IntoSystemConfigs},
		system::{Query, Res, ResMut},
	},
	math::Vec3,
	transform::components::{GlobalTransform, Transform},
};
use bevy_oxr::input::XrInput;
use bevy_oxr::resources::{XrFrameState, XrSession};
use bevy_oxr::xr_init::xr_only;
use bevy_oxr::xr_input::oculus_touch::OculusController;
use bevy_oxr::xr_input::trackers::OpenXRTrackingRoot;
use bevy_oxr::xr_input::{QuatConv, Vec3Conv};
use openxr as xr;
use volley_common::{Pose, TrackedPoses};

use crate::scene::SceneCamera;

#[derive(Debug, Default)]
pub struct TrackingPlugin;

impl Plugin for TrackingPlugin {
	fn build(&self, app: &mut App) {
		app.register_type::<TrackedPoses>()
			.init_resource::<TrackedPoses>()
			.add_systems(
				PreUpdate,
				(
					track_xr.run_if(xr_only()),
					track_flat_camera.run_if(not(xr_only())),
				),
			);
	}
}

/// World pose of a located space, `None` unless both position and orientation
/// are valid.
fn located_pose(location: &xr::SpaceLocation, root: &Transform) -> Option<Pose> {
	let valid = xr::SpaceLocationFlags::POSITION_VALID
		| xr::SpaceLocationFlags::ORIENTATION_VALID;
	if !location.location_flags.contains(valid) {
		return None;
	}
	let pose = Pose {
		trans: root.transform_point(location.pose.position.to_vec3()),
		rot: root.rotation * location.pose.orientation.to_quat(),
	};
	pose.is_finite().then_some(pose)
}

fn track_xr(
	mut poses: ResMut<TrackedPoses>,
	oculus_controller: Option<Res<OculusController>>,
	frame_state: Option<Res<XrFrameState>>,
	xr_input: Option<Res<XrInput>>,
	xr_session: Option<Res<XrSession>>,
	tracking_root: Query<&GlobalTransform, With<OpenXRTrackingRoot>>,
) {
	*poses = TrackedPoses::default();
	let (Some(oculus_controller), Some(frame_state), Some(xr_input), Some(session)) =
		(oculus_controller, frame_state, xr_input, xr_session)
	else {
		return;
	};
	let Ok(tracking_root) = tracking_root.get_single() else {
		return;
	};
	let Ok(frame_state) = frame_state.lock().map(|state| *state) else {
		return;
	};
	let time = frame_state.predicted_display_time;
	let root = tracking_root.compute_transform().with_scale(Vec3::ONE);

	if let Some(grip_space) = oculus_controller.grip_space.as_ref() {
		poses.left = grip_space
			.left
			.relate(&xr_input.stage, time)
			.ok()
			.and_then(|(location, _)| located_pose(&location, &root));
		poses.right = grip_space
			.right
			.relate(&xr_input.stage, time)
			.ok()
			.and_then(|(location, _)| located_pose(&location, &root));
	}
	poses.head = session
		.create_reference_space(xr::ReferenceSpaceType::VIEW, xr::Posef::IDENTITY)
		.and_then(|view| view.relate(&xr_input.stage, time))
		.ok()
		.and_then(|(location, _)| located_pose(&location, &root));
}

/// Without a headset the camera stands in for the head and the hands hang at
/// rest.
fn track_flat_camera(
	mut poses: ResMut<TrackedPoses>,
	camera: Query<&GlobalTransform, With<SceneCamera>>,
) {
	*poses = TrackedPoses {
		head: camera.get_single().ok().map(|camera| {
			let (_, rot, trans) = camera.to_scale_rotation_translation();
			Pose::new(trans, rot)
		}),
		left: None,
		right: None,
	};
}

#[cfg(test)]
mod test {
	use super::*;
	use bevy::math::Quat;

	use crate::test::headless_app;
	use crate::TrainingMode;

	fn location(flags: xr::SpaceLocationFlags, x: f32) -> xr::SpaceLocation {
		xr::SpaceLocation {
			location_flags: flags,
			pose: xr::Posef {
				position: xr::Vector3f { x, y: 1.0, z: 0.0 },
				..xr::Posef::IDENTITY
			},
		}
	}

	#[test]
	fn test_located_pose_applies_root() {
		let root = Transform::from_xyz(0.0, 0.0, 2.0)
			.with_rotation(Quat::from_rotation_y(std::f32::consts::PI));
		let valid = xr::SpaceLocationFlags::POSITION_VALID
			| xr::SpaceLocationFlags::ORIENTATION_VALID;
		let pose = located_pose(&location(valid, 0.5), &root).unwrap();
		assert!(pose.trans.abs_diff_eq(Vec3::new(-0.5, 1.0, 2.0), 1e-5));
		assert!(pose.rot.abs_diff_eq(root.rotation, 1e-5));
	}

	#[test]
	fn test_located_pose_requires_valid_flags() {
		let root = Transform::IDENTITY;
		let position_only = xr::SpaceLocationFlags::POSITION_VALID;
		assert!(located_pose(&location(position_only, 0.0), &root).is_none());
		assert!(located_pose(&location(xr::SpaceLocationFlags::from_raw(0), 0.0), &root).is_none());
	}

	#[test]
	fn test_flat_camera_is_the_head() {
		let mut app = headless_app(TrainingMode::Free);
		app.init_resource::<TrackedPoses>()
			.add_systems(PreUpdate, track_flat_camera);
		app.update();
		assert_eq!(*app.world.resource::<TrackedPoses>(), TrackedPoses::default());

		app.world.spawn((
			GlobalTransform::from(Transform::from_xyz(0.0, 1.6, 0.0)),
			SceneCamera,
		));
		app.update();
		let poses = *app.world.resource::<TrackedPoses>();
		let head = poses.head.unwrap();
		assert!(head.trans.abs_diff_eq(Vec3::new(0.0, 1.6, 0.0), 1e-5));
		assert!(poses.left.is_none() && poses.right.is_none());
	}
}
