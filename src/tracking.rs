use crate::config::AppConfig;
use crate::gestures::ManipulationState;
use bevy::input::mouse::{AccumulatedMouseMotion, AccumulatedMouseScroll};
use bevy::prelude::*;
use bevy::window::{CursorGrabMode, CursorOptions, PrimaryWindow, Window};
use bevy_rapier3d::prelude::Collider;

pub const ROOM_HALF_EXTENT: f32 = 4.0;
pub const WALL_HALF_HEIGHT: f32 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneOrientation {
    Horizontal,
    Vertical,
}

/// A flat surface the tracking layer has recognized as a placement
/// target. The entity's local +Y axis is the plane normal; content is
/// anchored within `half_extents` of its origin.
#[derive(Component, Debug, Clone, Copy)]
pub struct DetectedPlane {
    pub orientation: PlaneOrientation,
    pub half_extents: Vec2,
}

#[derive(Component)]
pub struct MainCamera;

#[derive(Resource)]
pub struct OrbitCameraState {
    pub target: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub min_distance: f32,
    pub max_distance: f32,
}

impl Default for OrbitCameraState {
    fn default() -> Self {
        Self {
            target: Vec3::new(0.0, 0.6, 0.0),
            distance: 5.0,
            yaw: std::f32::consts::FRAC_PI_2,
            pitch: -0.35,
            min_distance: 0.5,
            max_distance: 18.0,
        }
    }
}

#[derive(Resource, Default)]
pub struct UiInteractionState {
    pub wants_pointer_input: bool,
    pub wants_keyboard_input: bool,
}

#[derive(Resource, Default)]
pub struct MouseCaptureState {
    pub active: bool,
    pub restore_position: Option<Vec2>,
}

/// Build the tracked room the camera looks into: a floor and two walls,
/// tagged as detected planes according to the configured detection
/// mode. With scene reconstruction enabled the surfaces also carry
/// collision volumes.
pub fn setup_tracked_room(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    config: Res<AppConfig>,
) {
    commands.spawn((Camera3d::default(), Transform::default(), MainCamera));

    commands.spawn((
        DirectionalLight {
            shadows_enabled: true,
            illuminance: 18_000.0,
            ..default()
        },
        Transform::from_xyz(6.0, 10.0, 4.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    let floor_mat = materials.add(StandardMaterial {
        base_color: Color::srgb(0.42, 0.4, 0.37),
        perceptual_roughness: 0.95,
        ..default()
    });
    let wall_mat = materials.add(StandardMaterial {
        base_color: Color::srgb(0.62, 0.6, 0.56),
        perceptual_roughness: 0.9,
        ..default()
    });

    let detect = config.plane_detection;
    spawn_surface(
        &mut commands,
        &mut meshes,
        floor_mat,
        Transform::IDENTITY,
        Vec2::splat(ROOM_HALF_EXTENT),
        PlaneOrientation::Horizontal,
        detect.horizontal(),
        config.scene_reconstruction,
    );

    // Back wall, normal facing into the room (+Z).
    spawn_surface(
        &mut commands,
        &mut meshes,
        wall_mat.clone(),
        Transform::from_xyz(0.0, WALL_HALF_HEIGHT, -ROOM_HALF_EXTENT)
            .with_rotation(Quat::from_rotation_x(std::f32::consts::FRAC_PI_2)),
        Vec2::new(ROOM_HALF_EXTENT, WALL_HALF_HEIGHT),
        PlaneOrientation::Vertical,
        detect.vertical(),
        config.scene_reconstruction,
    );

    // Left wall, normal facing into the room (+X).
    spawn_surface(
        &mut commands,
        &mut meshes,
        wall_mat,
        Transform::from_xyz(-ROOM_HALF_EXTENT, WALL_HALF_HEIGHT, 0.0)
            .with_rotation(Quat::from_rotation_z(-std::f32::consts::FRAC_PI_2)),
        Vec2::new(WALL_HALF_HEIGHT, ROOM_HALF_EXTENT),
        PlaneOrientation::Vertical,
        detect.vertical(),
        config.scene_reconstruction,
    );
}

#[allow(clippy::too_many_arguments)]
fn spawn_surface(
    commands: &mut Commands,
    meshes: &mut ResMut<Assets<Mesh>>,
    material: Handle<StandardMaterial>,
    transform: Transform,
    half_extents: Vec2,
    orientation: PlaneOrientation,
    detected: bool,
    reconstruct: bool,
) {
    const SLAB_HALF_THICKNESS: f32 = 0.03;

    let surface = commands
        .spawn((transform, Visibility::default()))
        .with_children(|parent| {
            let mut slab = parent.spawn((
                Mesh3d(meshes.add(Cuboid::new(
                    half_extents.x * 2.0,
                    SLAB_HALF_THICKNESS * 2.0,
                    half_extents.y * 2.0,
                ))),
                MeshMaterial3d(material),
                Transform::from_xyz(0.0, -SLAB_HALF_THICKNESS, 0.0),
            ));
            if reconstruct {
                slab.insert(Collider::cuboid(
                    half_extents.x,
                    SLAB_HALF_THICKNESS,
                    half_extents.y,
                ));
            }
        })
        .id();

    if detected {
        commands.entity(surface).insert(DetectedPlane {
            orientation,
            half_extents,
        });
    }
}

pub fn orbit_camera_system(
    mouse_motion: Res<AccumulatedMouseMotion>,
    mouse_scroll: Res<AccumulatedMouseScroll>,
    mouse_buttons: Res<ButtonInput<MouseButton>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    ui_state: Res<UiInteractionState>,
    manipulation: Res<ManipulationState>,
    mut orbit: ResMut<OrbitCameraState>,
    mut camera_query: Query<&mut Transform, With<MainCamera>>,
) {
    let mouse_delta = Vec2::new(mouse_motion.delta.x, -mouse_motion.delta.y);
    let scroll_delta = zoom_delta(mouse_scroll.delta.y, manipulation.wheel_captured);

    let pointer_in_window = windows
        .single()
        .ok()
        .and_then(|w| w.cursor_position())
        .is_some();
    let can_capture_mouse =
        pointer_in_window && !ui_state.wants_pointer_input && !manipulation.is_active();

    if can_capture_mouse {
        if mouse_buttons.pressed(MouseButton::Right) && mouse_delta.length_squared() > 0.0 {
            orbit.yaw -= mouse_delta.x * 0.006;
            orbit.pitch = (orbit.pitch + mouse_delta.y * 0.006).clamp(-1.45, 1.45);
        }

        if mouse_buttons.pressed(MouseButton::Middle) && mouse_delta.length_squared() > 0.0 {
            let forward = camera_forward(orbit.yaw, orbit.pitch);
            let mut right = forward.cross(Vec3::Y);
            if right.length_squared() < 1e-6 {
                right = Vec3::X;
            }
            right = right.normalize();
            let up = right.cross(forward).normalize_or_zero();

            let pan_scale = orbit.distance * 0.0018;
            orbit.target += (-mouse_delta.x * right + mouse_delta.y * up) * pan_scale;
        }

        if scroll_delta.abs() > f32::EPSILON {
            let zoom_factor = (1.0 - scroll_delta * 0.10).clamp(0.2, 5.0);
            orbit.distance =
                (orbit.distance * zoom_factor).clamp(orbit.min_distance, orbit.max_distance);
        }
    }

    let forward = camera_forward(orbit.yaw, orbit.pitch);
    let camera_position = orbit.target - forward * orbit.distance;

    for mut transform in &mut camera_query {
        *transform = Transform::from_translation(camera_position).looking_at(orbit.target, Vec3::Y);
    }
}

pub fn sync_mouse_capture(
    mouse_buttons: Res<ButtonInput<MouseButton>>,
    ui_state: Res<UiInteractionState>,
    manipulation: Res<ManipulationState>,
    mut capture_state: ResMut<MouseCaptureState>,
    mut window_query: Query<(&mut Window, &mut CursorOptions), With<PrimaryWindow>>,
) {
    let Ok((mut window, mut cursor_options)) = window_query.single_mut() else {
        return;
    };

    let orbiting =
        mouse_buttons.pressed(MouseButton::Right) || mouse_buttons.pressed(MouseButton::Middle);
    let pointer_in_window = window.cursor_position().is_some();
    let should_capture = window.focused
        && orbiting
        && pointer_in_window
        && !ui_state.wants_pointer_input
        && !manipulation.is_active();

    if should_capture {
        if !capture_state.active {
            capture_state.restore_position = window.cursor_position();
            capture_state.active = true;
        }
        cursor_options.visible = false;
        cursor_options.grab_mode = CursorGrabMode::Locked;
    } else {
        if capture_state.active
            && let Some(pos) = capture_state.restore_position.take()
        {
            window.set_cursor_position(Some(pos));
        }
        capture_state.active = false;
        cursor_options.visible = true;
        cursor_options.grab_mode = CursorGrabMode::None;
    }
}

/// The wheel drives one thing per frame: a scroll the gesture layer
/// already spent scaling a model never also zooms the camera.
fn zoom_delta(scroll_delta: f32, wheel_captured: bool) -> f32 {
    if wheel_captured { 0.0 } else { scroll_delta }
}

fn camera_forward(yaw: f32, pitch: f32) -> Vec3 {
    Vec3::new(
        yaw.cos() * pitch.cos(),
        pitch.sin(),
        yaw.sin() * pitch.cos(),
    )
    .normalize_or_zero()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn camera_forward_is_unit_length() {
        let forward = camera_forward(1.2, -0.4);
        assert_relative_eq!(forward.length(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn level_camera_looks_along_the_yaw_direction() {
        let forward = camera_forward(0.0, 0.0);
        assert_relative_eq!(forward.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(forward.y, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn wheel_spent_on_a_model_does_not_zoom() {
        assert_relative_eq!(zoom_delta(1.5, true), 0.0);
        assert_relative_eq!(zoom_delta(1.5, false), 1.5);
        assert_relative_eq!(zoom_delta(-0.5, true), 0.0);
    }
}
