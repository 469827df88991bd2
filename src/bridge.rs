use crate::catalog::MODEL_EXTENSION;
use crate::config::AppConfig;
use crate::gestures::Manipulable;
use crate::session::PlacementSession;
use crate::tracking::{DetectedPlane, MainCamera};
use bevy::asset::LoadState;
use bevy::camera::primitives::Aabb;
use bevy::gltf::Gltf;
use bevy::math::Affine3A;
use bevy::prelude::*;
use bevy::scene::{SceneInstance, SceneSpawner};
use bevy::window::{PrimaryWindow, Window};
use bevy_rapier3d::prelude::Collider;

/// Anchor whose model asset is still loading.
#[derive(Component)]
pub struct PlacementInFlight {
    pub name: String,
    pub gltf: Handle<Gltf>,
}

/// Anchor whose scene has been spawned but whose meshes have not been
/// measured yet. Bounds become available a frame or two after the
/// scene instance spawns.
#[derive(Component)]
pub struct AwaitingBounds {
    pub name: String,
}

/// The model root under an anchor, as handed to the engine.
#[derive(Component)]
pub struct PlacedModel {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalBounds {
    pub center: Vec3,
    pub half_extents: Vec3,
}

/// Consume a confirmed placement request: resolve the asset path, start
/// the load, and spawn an anchor at a detected plane. The request slot
/// is cleared through a queued command so the mutation lands after the
/// current update pass, and a repeated tick never consumes the same
/// request twice.
pub fn begin_requested_placement(
    mut commands: Commands,
    mut session: ResMut<PlacementSession>,
    config: Res<AppConfig>,
    asset_server: Res<AssetServer>,
    windows: Query<&Window, With<PrimaryWindow>>,
    camera_query: Query<(&Camera, &GlobalTransform), With<MainCamera>>,
    planes: Query<(&DetectedPlane, &GlobalTransform)>,
) {
    let Some(name) = session.requested_model().map(str::to_string) else {
        return;
    };
    commands.queue(|world: &mut World| {
        world.resource_mut::<PlacementSession>().clear_request();
    });

    let Some((point, normal)) = choose_anchor(
        view_center_ray(&windows, &camera_query),
        planes.iter().map(plane_params),
    ) else {
        tracing::warn!("no detected plane to anchor '{name}' to");
        session.status = "No surface detected".to_string();
        return;
    };

    let path = format!("{}/{name}.{MODEL_EXTENSION}", config.models_dir);
    tracing::info!("placing model '{name}' from {path}");
    let gltf: Handle<Gltf> = asset_server.load(path);

    commands.spawn((
        Transform::from_translation(point).with_rotation(Quat::from_rotation_arc(Vec3::Y, normal)),
        Visibility::default(),
        PlacementInFlight { name, gltf },
    ));

    session.status = "Placing...".to_string();
}

/// Poll in-flight loads. A loaded glTF gets its scene spawned under the
/// anchor; a failed load tears the anchor down again and reports on the
/// status line instead of aborting.
pub fn watch_in_flight_placements(
    mut commands: Commands,
    mut session: ResMut<PlacementSession>,
    asset_server: Res<AssetServer>,
    gltf_assets: Res<Assets<Gltf>>,
    in_flight: Query<(Entity, &PlacementInFlight)>,
) {
    for (anchor, placement) in in_flight.iter() {
        match asset_server.get_load_state(placement.gltf.id()) {
            Some(LoadState::Loaded) => {
                let scene = gltf_assets.get(&placement.gltf).and_then(|gltf| {
                    gltf.default_scene
                        .clone()
                        .or_else(|| gltf.scenes.first().cloned())
                });
                let Some(scene) = scene else {
                    tracing::warn!("model '{}' contains no scene", placement.name);
                    session.status = format!("Model '{}' has no scene", placement.name);
                    commands.entity(anchor).despawn();
                    continue;
                };

                let model = commands
                    .spawn((
                        SceneRoot(scene),
                        Transform::IDENTITY,
                        PlacedModel {
                            name: placement.name.clone(),
                        },
                    ))
                    .id();
                commands
                    .entity(anchor)
                    .add_child(model)
                    .remove::<PlacementInFlight>()
                    .insert(AwaitingBounds {
                        name: placement.name.clone(),
                    });
            }
            Some(LoadState::Failed(err)) => {
                tracing::warn!("failed to load model '{}': {err}", placement.name);
                session.status = format!("Could not load model '{}'", placement.name);
                commands.entity(anchor).despawn();
            }
            _ => {}
        }
    }
}

/// Once the spawned scene's meshes carry bounding boxes, merge them
/// into one anchor-local box, attach a matching collision volume at the
/// box center, and make the anchor manipulable. A scene that finishes
/// spawning without any meshes gets torn down and reported instead of
/// waiting forever.
pub fn finalize_placed_models(
    mut commands: Commands,
    mut session: ResMut<PlacementSession>,
    scene_spawner: Res<SceneSpawner>,
    anchors: Query<(Entity, &GlobalTransform, &AwaitingBounds)>,
    children_query: Query<&Children>,
    scene_instances: Query<&SceneInstance>,
    mesh_bounds: Query<(&Aabb, &GlobalTransform), With<Mesh3d>>,
    mesh_markers: Query<(), With<Mesh3d>>,
) {
    for (anchor, anchor_global, awaiting) in anchors.iter() {
        let mut meshes = Vec::new();
        collect_descendant_bounds(anchor, &children_query, &mesh_bounds, &mut meshes);
        let bounds = merge_mesh_bounds(
            anchor_global.affine().inverse(),
            meshes.iter().map(|(aabb, global)| (*aabb, *global)),
        );
        let scene_ready =
            descendant_scene_ready(anchor, &children_query, &scene_instances, &scene_spawner);
        let has_meshes = descendant_has_mesh(anchor, &children_query, &mesh_markers);

        match bounds_progress(scene_ready, has_meshes, bounds) {
            BoundsProgress::Wait => {}
            BoundsProgress::Abandon => {
                tracing::warn!("model '{}' contains no meshes", awaiting.name);
                session.status = format!("Model '{}' has no meshes", awaiting.name);
                commands.entity(anchor).despawn();
            }
            BoundsProgress::Finalize(bounds) => {
                let collider = commands
                    .spawn((
                        Collider::cuboid(
                            bounds.half_extents.x,
                            bounds.half_extents.y,
                            bounds.half_extents.z,
                        ),
                        Transform::from_translation(bounds.center),
                        Visibility::default(),
                    ))
                    .id();
                let normal = anchor_global.rotation() * Vec3::Y;
                commands
                    .entity(anchor)
                    .add_child(collider)
                    .remove::<AwaitingBounds>()
                    .insert(Manipulable {
                        bounds_center: bounds.center,
                        bounds_half_extents: bounds.half_extents,
                        plane_normal: normal,
                    });

                tracing::info!("placed model '{}'", awaiting.name);
                session.status = format!("Placed '{}'", awaiting.name);
            }
        }
    }
}

/// What to do with an anchor still waiting on bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum BoundsProgress {
    /// Scene still spawning, or meshes present but not measured yet.
    Wait,
    /// The scene finished spawning with nothing measurable in it.
    Abandon,
    Finalize(LocalBounds),
}

pub(crate) fn bounds_progress(
    scene_ready: bool,
    has_meshes: bool,
    bounds: Option<LocalBounds>,
) -> BoundsProgress {
    match bounds {
        Some(bounds) => BoundsProgress::Finalize(bounds),
        None if scene_ready && !has_meshes => BoundsProgress::Abandon,
        None => BoundsProgress::Wait,
    }
}

fn descendant_scene_ready(
    entity: Entity,
    children_query: &Query<&Children>,
    scene_instances: &Query<&SceneInstance>,
    scene_spawner: &SceneSpawner,
) -> bool {
    if let Ok(children) = children_query.get(entity) {
        for child in children.iter() {
            if let Ok(instance) = scene_instances.get(child)
                && scene_spawner.instance_is_ready(**instance)
            {
                return true;
            }
            if descendant_scene_ready(child, children_query, scene_instances, scene_spawner) {
                return true;
            }
        }
    }
    false
}

fn descendant_has_mesh(
    entity: Entity,
    children_query: &Query<&Children>,
    mesh_markers: &Query<(), With<Mesh3d>>,
) -> bool {
    if let Ok(children) = children_query.get(entity) {
        for child in children.iter() {
            if mesh_markers.get(child).is_ok()
                || descendant_has_mesh(child, children_query, mesh_markers)
            {
                return true;
            }
        }
    }
    false
}

/// While a selection is pending, draw a ring at the spot a confirm
/// would anchor to.
pub fn preview_anchor_reticle(
    mut gizmos: Gizmos,
    session: Res<PlacementSession>,
    windows: Query<&Window, With<PrimaryWindow>>,
    camera_query: Query<(&Camera, &GlobalTransform), With<MainCamera>>,
    planes: Query<(&DetectedPlane, &GlobalTransform)>,
) {
    if session.pending_model().is_none() {
        return;
    }
    let Some((point, normal)) = choose_anchor(
        view_center_ray(&windows, &camera_query),
        planes.iter().map(plane_params),
    ) else {
        return;
    };

    let isometry = Isometry3d::new(
        point + normal * 0.005,
        Quat::from_rotation_arc(Vec3::Z, normal),
    );
    gizmos.circle(isometry, 0.15, Color::srgb(0.95, 0.95, 0.85));
    gizmos.circle(isometry, 0.05, Color::srgb(0.95, 0.95, 0.85));
}

fn view_center_ray(
    windows: &Query<&Window, With<PrimaryWindow>>,
    camera_query: &Query<(&Camera, &GlobalTransform), With<MainCamera>>,
) -> Option<(Vec3, Vec3)> {
    let window = windows.single().ok()?;
    let (camera, camera_transform) = camera_query.single().ok()?;
    let center = Vec2::new(window.width(), window.height()) * 0.5;
    let ray = camera.viewport_to_world(camera_transform, center).ok()?;
    Some((ray.origin, *ray.direction))
}

fn plane_params(
    (plane, global): (&DetectedPlane, &GlobalTransform),
) -> (Vec3, Quat, Vec2) {
    let (_, rotation, translation) = global.to_scale_rotation_translation();
    (translation, rotation, plane.half_extents)
}

/// Pick the anchor pose for a placement: the nearest in-bounds hit of
/// the ray against the detected planes, or the first plane's origin
/// when the ray misses everything. Returns the anchor point and the
/// plane normal, or `None` when no plane is detected at all.
pub(crate) fn choose_anchor(
    ray: Option<(Vec3, Vec3)>,
    planes: impl Iterator<Item = (Vec3, Quat, Vec2)>,
) -> Option<(Vec3, Vec3)> {
    let mut fallback: Option<(Vec3, Vec3)> = None;
    let mut nearest: Option<(f32, Vec3, Vec3)> = None;

    for (origin, rotation, half_extents) in planes {
        let normal = rotation * Vec3::Y;
        if fallback.is_none() {
            fallback = Some((origin, normal));
        }
        let Some((ray_origin, ray_dir)) = ray else {
            continue;
        };
        let Some(t) = ray_plane_intersection(ray_origin, ray_dir, origin, normal) else {
            continue;
        };
        let hit = ray_origin + ray_dir * t;
        let local = rotation.inverse() * (hit - origin);
        if local.x.abs() > half_extents.x || local.z.abs() > half_extents.y {
            continue;
        }
        if nearest.map(|(best, _, _)| t < best).unwrap_or(true) {
            nearest = Some((t, hit, normal));
        }
    }

    nearest.map(|(_, hit, normal)| (hit, normal)).or(fallback)
}

/// Distance along the ray to the plane, front side only.
pub(crate) fn ray_plane_intersection(
    origin: Vec3,
    dir: Vec3,
    plane_point: Vec3,
    normal: Vec3,
) -> Option<f32> {
    let denom = dir.dot(normal);
    if denom.abs() < 1e-6 {
        return None;
    }
    let t = (plane_point - origin).dot(normal) / denom;
    (t > 0.0).then_some(t)
}

fn collect_descendant_bounds(
    entity: Entity,
    children_query: &Query<&Children>,
    mesh_bounds: &Query<(&Aabb, &GlobalTransform), With<Mesh3d>>,
    out: &mut Vec<(Aabb, GlobalTransform)>,
) {
    if let Ok(children) = children_query.get(entity) {
        for child in children.iter() {
            if let Ok((aabb, global)) = mesh_bounds.get(child) {
                out.push((*aabb, *global));
            }
            collect_descendant_bounds(child, children_query, mesh_bounds, out);
        }
    }
}

/// Merge world-space mesh boxes into a single box expressed in anchor
/// space, so the collision volume moves and rotates with the anchor.
pub(crate) fn merge_mesh_bounds(
    anchor_inverse: Affine3A,
    meshes: impl Iterator<Item = (Aabb, GlobalTransform)>,
) -> Option<LocalBounds> {
    let mut min = Vec3::splat(f32::INFINITY);
    let mut max = Vec3::splat(f32::NEG_INFINITY);
    let mut any = false;

    for (aabb, global) in meshes {
        let center = Vec3::from(aabb.center);
        let half = Vec3::from(aabb.half_extents);
        for corner in 0..8 {
            let sign = Vec3::new(
                if corner & 1 == 0 { -1.0 } else { 1.0 },
                if corner & 2 == 0 { -1.0 } else { 1.0 },
                if corner & 4 == 0 { -1.0 } else { 1.0 },
            );
            let world = global.transform_point(center + half * sign);
            let local = anchor_inverse.transform_point3(world);
            min = min.min(local);
            max = max.max(local);
            any = true;
        }
    }

    any.then(|| LocalBounds {
        center: (min + max) * 0.5,
        half_extents: (max - min) * 0.5,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn floor(half: f32) -> (Vec3, Quat, Vec2) {
        (Vec3::ZERO, Quat::IDENTITY, Vec2::splat(half))
    }

    #[test]
    fn ray_hits_the_floor_below_the_camera() {
        let t = ray_plane_intersection(Vec3::new(0.0, 2.0, 0.0), Vec3::NEG_Y, Vec3::ZERO, Vec3::Y)
            .unwrap();
        assert_relative_eq!(t, 2.0);
    }

    #[test]
    fn ray_parallel_to_plane_misses() {
        assert_eq!(
            ray_plane_intersection(Vec3::new(0.0, 1.0, 0.0), Vec3::X, Vec3::ZERO, Vec3::Y),
            None
        );
    }

    #[test]
    fn ray_pointing_away_from_plane_misses() {
        assert_eq!(
            ray_plane_intersection(Vec3::new(0.0, 1.0, 0.0), Vec3::Y, Vec3::ZERO, Vec3::Y),
            None
        );
    }

    #[test]
    fn anchor_lands_at_the_ray_hit() {
        let ray = Some((Vec3::new(1.0, 2.0, 1.0), Vec3::NEG_Y));
        let (point, normal) = choose_anchor(ray, [floor(4.0)].into_iter()).unwrap();
        assert_relative_eq!(point.x, 1.0);
        assert_relative_eq!(point.y, 0.0);
        assert_relative_eq!(point.z, 1.0);
        assert_relative_eq!(normal.y, 1.0);
    }

    #[test]
    fn hit_outside_plane_bounds_falls_back_to_plane_origin() {
        let ray = Some((Vec3::new(10.0, 2.0, 0.0), Vec3::NEG_Y));
        let (point, _) = choose_anchor(ray, [floor(4.0)].into_iter()).unwrap();
        assert_eq!(point, Vec3::ZERO);
    }

    #[test]
    fn missing_ray_falls_back_to_first_plane() {
        let wall = (
            Vec3::new(0.0, 1.5, -4.0),
            Quat::from_rotation_x(std::f32::consts::FRAC_PI_2),
            Vec2::new(4.0, 1.5),
        );
        let (point, normal) = choose_anchor(None, [wall].into_iter()).unwrap();
        assert_eq!(point, Vec3::new(0.0, 1.5, -4.0));
        assert_relative_eq!(normal.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn no_planes_means_no_anchor() {
        let ray = Some((Vec3::new(0.0, 2.0, 0.0), Vec3::NEG_Y));
        assert_eq!(choose_anchor(ray, std::iter::empty()), None);
    }

    #[test]
    fn nearest_of_two_hit_planes_wins() {
        let near = (Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY, Vec2::splat(4.0));
        let far = floor(4.0);
        let ray = Some((Vec3::new(0.0, 3.0, 0.0), Vec3::NEG_Y));
        let (point, _) = choose_anchor(ray, [far, near].into_iter()).unwrap();
        assert_relative_eq!(point.y, 1.0);
    }

    #[test]
    fn single_mesh_bounds_pass_through() {
        let aabb = Aabb {
            center: Vec3::new(0.0, 0.5, 0.0).into(),
            half_extents: Vec3::new(0.5, 0.5, 0.5).into(),
        };
        let bounds = merge_mesh_bounds(
            Affine3A::IDENTITY,
            [(aabb, GlobalTransform::IDENTITY)].into_iter(),
        )
        .unwrap();
        assert_relative_eq!(bounds.center.y, 0.5);
        assert_relative_eq!(bounds.half_extents.x, 0.5);
    }

    #[test]
    fn bounds_are_expressed_in_anchor_space() {
        let anchor = GlobalTransform::from(Transform::from_xyz(2.0, 0.0, 0.0));
        let aabb = Aabb {
            center: Vec3::splat(0.0).into(),
            half_extents: Vec3::splat(0.5).into(),
        };
        // Mesh sits at the anchor origin in world space.
        let mesh_global = GlobalTransform::from(Transform::from_xyz(2.0, 0.0, 0.0));
        let bounds = merge_mesh_bounds(
            anchor.affine().inverse(),
            [(aabb, mesh_global)].into_iter(),
        )
        .unwrap();
        assert_relative_eq!(bounds.center.x, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn merged_box_covers_all_meshes() {
        let unit = |x: f32| {
            (
                Aabb {
                    center: Vec3::ZERO.into(),
                    half_extents: Vec3::splat(0.5).into(),
                },
                GlobalTransform::from(Transform::from_xyz(x, 0.0, 0.0)),
            )
        };
        let bounds = merge_mesh_bounds(
            Affine3A::IDENTITY,
            [unit(-1.0), unit(1.0)].into_iter(),
        )
        .unwrap();
        assert_relative_eq!(bounds.half_extents.x, 1.5);
        assert_relative_eq!(bounds.center.x, 0.0);
    }

    #[test]
    fn no_meshes_yield_no_bounds() {
        assert_eq!(
            merge_mesh_bounds(Affine3A::IDENTITY, std::iter::empty()),
            None
        );
    }

    #[test]
    fn empty_scene_is_abandoned_once_spawned() {
        assert_eq!(bounds_progress(true, false, None), BoundsProgress::Abandon);
    }

    #[test]
    fn scene_still_spawning_keeps_waiting() {
        assert_eq!(bounds_progress(false, false, None), BoundsProgress::Wait);
    }

    #[test]
    fn unmeasured_meshes_keep_waiting() {
        // Aabbs land a frame after the meshes spawn; do not give up.
        assert_eq!(bounds_progress(true, true, None), BoundsProgress::Wait);
    }

    #[test]
    fn measured_bounds_finalize_the_anchor() {
        let bounds = LocalBounds {
            center: Vec3::new(0.0, 0.5, 0.0),
            half_extents: Vec3::splat(0.5),
        };
        assert_eq!(
            bounds_progress(true, true, Some(bounds)),
            BoundsProgress::Finalize(bounds)
        );
    }
}
