use crate::bridge::ray_plane_intersection;
use crate::tracking::{MainCamera, UiInteractionState};
use bevy::input::mouse::{AccumulatedMouseMotion, AccumulatedMouseScroll};
use bevy::prelude::*;
use bevy::window::{PrimaryWindow, Window};

pub const MIN_SCALE: f32 = 0.25;
pub const MAX_SCALE: f32 = 4.0;

/// Installed on an anchor once its model is measured; the gesture
/// systems only ever touch entities carrying this.
#[derive(Component, Debug, Clone, Copy)]
pub struct Manipulable {
    pub bounds_center: Vec3,
    pub bounds_half_extents: Vec3,
    /// World-space normal of the plane the model is anchored to; drags
    /// slide the model across this plane.
    pub plane_normal: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragMode {
    Translate,
    Rotate,
}

#[derive(Debug, Clone, Copy)]
pub struct ActiveDrag {
    pub target: Entity,
    pub mode: DragMode,
    /// Offset from the grab point to the anchor origin, kept constant
    /// while dragging so the model does not jump under the cursor.
    pub grab_offset: Vec3,
}

#[derive(Resource, Default)]
pub struct ManipulationState {
    pub drag: Option<ActiveDrag>,
    /// Set on frames where the scroll wheel scaled a hovered model, so
    /// the camera does not also zoom on the same wheel motion.
    pub wheel_captured: bool,
}

impl ManipulationState {
    pub fn is_active(&self) -> bool {
        self.drag.is_some()
    }
}

pub fn begin_manipulation(
    mouse_buttons: Res<ButtonInput<MouseButton>>,
    ui_state: Res<UiInteractionState>,
    windows: Query<&Window, With<PrimaryWindow>>,
    camera_query: Query<(&Camera, &GlobalTransform), With<MainCamera>>,
    models: Query<(Entity, &GlobalTransform, &Manipulable)>,
    mut manipulation: ResMut<ManipulationState>,
) {
    if ui_state.wants_pointer_input || manipulation.is_active() {
        return;
    }
    let mode = if mouse_buttons.just_pressed(MouseButton::Left) {
        DragMode::Translate
    } else if mouse_buttons.just_pressed(MouseButton::Right) {
        DragMode::Rotate
    } else {
        return;
    };

    let Some((origin, dir)) = cursor_ray(&windows, &camera_query) else {
        return;
    };
    let Some((target, global, manipulable)) = pick_model(origin, dir, models.iter()) else {
        return;
    };

    let anchor_pos = global.translation();
    let grab_offset = match ray_plane_intersection(origin, dir, anchor_pos, manipulable.plane_normal)
    {
        Some(t) => anchor_pos - (origin + dir * t),
        None => Vec3::ZERO,
    };

    manipulation.drag = Some(ActiveDrag {
        target,
        mode,
        grab_offset,
    });
}

pub fn update_manipulation(
    mouse_buttons: Res<ButtonInput<MouseButton>>,
    mouse_motion: Res<AccumulatedMouseMotion>,
    windows: Query<&Window, With<PrimaryWindow>>,
    camera_query: Query<(&Camera, &GlobalTransform), With<MainCamera>>,
    mut models: Query<(&mut Transform, &Manipulable)>,
    mut manipulation: ResMut<ManipulationState>,
) {
    let Some(drag) = manipulation.drag else {
        return;
    };

    let held = match drag.mode {
        DragMode::Translate => mouse_buttons.pressed(MouseButton::Left),
        DragMode::Rotate => mouse_buttons.pressed(MouseButton::Right),
    };
    if !held {
        manipulation.drag = None;
        return;
    }

    let Ok((mut transform, manipulable)) = models.get_mut(drag.target) else {
        manipulation.drag = None;
        return;
    };

    match drag.mode {
        DragMode::Translate => {
            let Some((origin, dir)) = cursor_ray(&windows, &camera_query) else {
                return;
            };
            if let Some(t) = ray_plane_intersection(
                origin,
                dir,
                transform.translation,
                manipulable.plane_normal,
            ) {
                transform.translation = origin + dir * t + drag.grab_offset;
            }
        }
        DragMode::Rotate => {
            let angle = -mouse_motion.delta.x * 0.01;
            if angle.abs() > 0.0 {
                transform.rotation =
                    Quat::from_axis_angle(manipulable.plane_normal, angle) * transform.rotation;
            }
        }
    }
}

pub fn scale_hovered_model(
    mouse_scroll: Res<AccumulatedMouseScroll>,
    ui_state: Res<UiInteractionState>,
    mut manipulation: ResMut<ManipulationState>,
    windows: Query<&Window, With<PrimaryWindow>>,
    camera_query: Query<(&Camera, &GlobalTransform), With<MainCamera>>,
    targets: Query<(Entity, &GlobalTransform, &Manipulable)>,
    mut transforms: Query<&mut Transform, With<Manipulable>>,
) {
    manipulation.wheel_captured = false;
    let scroll = mouse_scroll.delta.y;
    if scroll.abs() < f32::EPSILON || ui_state.wants_pointer_input || manipulation.is_active() {
        return;
    }
    let Some((origin, dir)) = cursor_ray(&windows, &camera_query) else {
        return;
    };
    let Some((target, _, _)) = pick_model(origin, dir, targets.iter()) else {
        return;
    };
    manipulation.wheel_captured = true;
    let Ok(mut transform) = transforms.get_mut(target) else {
        return;
    };

    let scaled = clamp_scale(transform.scale.x, 1.0 + scroll * 0.1);
    transform.scale = Vec3::splat(scaled);
}

fn cursor_ray(
    windows: &Query<&Window, With<PrimaryWindow>>,
    camera_query: &Query<(&Camera, &GlobalTransform), With<MainCamera>>,
) -> Option<(Vec3, Vec3)> {
    let window = windows.single().ok()?;
    let cursor = window.cursor_position()?;
    let (camera, camera_transform) = camera_query.single().ok()?;
    let ray = camera.viewport_to_world(camera_transform, cursor).ok()?;
    Some((ray.origin, *ray.direction))
}

fn pick_model<'a>(
    origin: Vec3,
    dir: Vec3,
    models: impl Iterator<Item = (Entity, &'a GlobalTransform, &'a Manipulable)>,
) -> Option<(Entity, &'a GlobalTransform, &'a Manipulable)> {
    let mut nearest: Option<(f32, (Entity, &GlobalTransform, &Manipulable))> = None;
    for (entity, global, manipulable) in models {
        let inverse = global.affine().inverse();
        let local_origin = inverse.transform_point3(origin);
        let local_dir = inverse.transform_vector3(dir);
        let Some(t) = ray_aabb_intersection(
            local_origin,
            local_dir,
            manipulable.bounds_center,
            manipulable.bounds_half_extents,
        ) else {
            continue;
        };
        if nearest.as_ref().map(|(best, _)| t < *best).unwrap_or(true) {
            nearest = Some((t, (entity, global, manipulable)));
        }
    }
    nearest.map(|(_, hit)| hit)
}

/// Slab test against a local-space box. Returns the entry distance
/// along the ray, zero when the origin is already inside the box.
pub(crate) fn ray_aabb_intersection(
    origin: Vec3,
    dir: Vec3,
    center: Vec3,
    half_extents: Vec3,
) -> Option<f32> {
    let min = center - half_extents;
    let max = center + half_extents;
    let mut t_near = f32::NEG_INFINITY;
    let mut t_far = f32::INFINITY;

    for axis in 0..3 {
        let (o, d, lo, hi) = (origin[axis], dir[axis], min[axis], max[axis]);
        if d.abs() < 1e-8 {
            if o < lo || o > hi {
                return None;
            }
            continue;
        }
        let (t0, t1) = ((lo - o) / d, (hi - o) / d);
        let (t0, t1) = if t0 <= t1 { (t0, t1) } else { (t1, t0) };
        t_near = t_near.max(t0);
        t_far = t_far.min(t1);
        if t_near > t_far {
            return None;
        }
    }

    if t_far < 0.0 {
        return None;
    }
    Some(t_near.max(0.0))
}

pub(crate) fn clamp_scale(current: f32, factor: f32) -> f32 {
    (current * factor).clamp(MIN_SCALE, MAX_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ray_hits_box_straight_on() {
        let t = ray_aabb_intersection(
            Vec3::new(0.0, 0.5, 5.0),
            Vec3::NEG_Z,
            Vec3::new(0.0, 0.5, 0.0),
            Vec3::splat(0.5),
        )
        .unwrap();
        assert_relative_eq!(t, 4.5);
    }

    #[test]
    fn ray_beside_box_misses() {
        assert_eq!(
            ray_aabb_intersection(
                Vec3::new(2.0, 0.0, 5.0),
                Vec3::NEG_Z,
                Vec3::ZERO,
                Vec3::splat(0.5),
            ),
            None
        );
    }

    #[test]
    fn box_behind_ray_misses() {
        assert_eq!(
            ray_aabb_intersection(Vec3::new(0.0, 0.0, 5.0), Vec3::Z, Vec3::ZERO, Vec3::splat(0.5)),
            None
        );
    }

    #[test]
    fn origin_inside_box_hits_at_zero() {
        let t = ray_aabb_intersection(Vec3::ZERO, Vec3::X, Vec3::ZERO, Vec3::splat(1.0)).unwrap();
        assert_relative_eq!(t, 0.0);
    }

    #[test]
    fn axis_parallel_ray_inside_slab_still_hits() {
        let t = ray_aabb_intersection(
            Vec3::new(0.2, 0.0, 5.0),
            Vec3::NEG_Z,
            Vec3::ZERO,
            Vec3::splat(0.5),
        )
        .unwrap();
        assert_relative_eq!(t, 4.5);
    }

    #[test]
    fn scale_clamps_at_both_ends() {
        assert_relative_eq!(clamp_scale(1.0, 1.1), 1.1);
        assert_relative_eq!(clamp_scale(3.9, 1.5), MAX_SCALE);
        assert_relative_eq!(clamp_scale(0.3, 0.5), MIN_SCALE);
    }
}
