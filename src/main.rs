use bevy::prelude::*;
use bevy::window::{PresentMode, WindowResolution};
use bevy_egui::{EguiPlugin, EguiPrimaryContextPass};
use bevy_rapier3d::prelude::{NoUserData, RapierPhysicsPlugin};
use std::env;
use std::path::Path;

mod bridge;
mod catalog;
mod config;
mod gestures;
mod session;
mod tracking;
mod ui;

use bridge::{
    begin_requested_placement, finalize_placed_models, preview_anchor_reticle,
    watch_in_flight_placements,
};
use catalog::load_model_catalog;
use config::AppConfig;
use gestures::{ManipulationState, begin_manipulation, scale_hovered_model, update_manipulation};
use session::PlacementSession;
use tracking::{
    MouseCaptureState, OrbitCameraState, UiInteractionState, orbit_camera_system,
    setup_tracked_room, sync_mouse_capture,
};
use ui::{ThumbnailCache, ui_system};

pub const ASSET_ROOT: &str = "assets";
const CONFIG_PATH: &str = "config/setdress.ron";

#[derive(Debug, Clone)]
struct CliOptions {
    config_path: String,
    models_dir: Option<String>,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            config_path: CONFIG_PATH.to_string(),
            models_dir: None,
        }
    }
}

fn parse_cli_options() -> CliOptions {
    let mut options = CliOptions::default();
    let mut args = env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let Some(value) = args.next() else {
                    eprintln!("--config expects a path");
                    print_cli_help_and_exit(2);
                };
                options.config_path = value;
            }
            "--models-dir" => {
                let Some(value) = args.next() else {
                    eprintln!("--models-dir expects a directory");
                    print_cli_help_and_exit(2);
                };
                options.models_dir = Some(value);
            }
            "--help" | "-h" => {
                print_cli_help_and_exit(0);
            }
            _ => {
                eprintln!("Unknown option: {arg}");
                print_cli_help_and_exit(2);
            }
        }
    }

    options
}

fn print_cli_help_and_exit(code: i32) -> ! {
    println!(
        "Usage:\n  setdress [options]\n\nOptions:\n  -c, --config <path>      Config file (default: {CONFIG_PATH})\n      --models-dir <dir>   Models directory relative to {ASSET_ROOT}/\n  -h, --help               Show this help"
    );
    std::process::exit(code);
}

fn main() {
    let cli = parse_cli_options();
    let mut config = AppConfig::load_or_default(Path::new(&cli.config_path));
    if let Some(models_dir) = cli.models_dir {
        config.models_dir = models_dir;
    }

    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "setdress".into(),
                resolution: WindowResolution::new(config.window_width, config.window_height),
                present_mode: PresentMode::AutoVsync,
                ..default()
            }),
            ..default()
        }))
        .add_plugins(EguiPlugin::default())
        .add_plugins(RapierPhysicsPlugin::<NoUserData>::default())
        .insert_resource(config)
        .insert_resource(PlacementSession::default())
        .insert_resource(OrbitCameraState::default())
        .insert_resource(UiInteractionState::default())
        .insert_resource(MouseCaptureState::default())
        .insert_resource(ManipulationState::default())
        .insert_resource(ThumbnailCache::default())
        .insert_resource(GlobalAmbientLight {
            color: Color::srgb(0.6, 0.63, 0.68),
            brightness: 220.0,
            affects_lightmapped_meshes: true,
        })
        .add_systems(Startup, (load_model_catalog, setup_tracked_room))
        .add_systems(
            Update,
            (
                begin_manipulation,
                update_manipulation,
                scale_hovered_model,
                orbit_camera_system,
            )
                .chain(),
        )
        .add_systems(Update, sync_mouse_capture)
        .add_systems(
            Update,
            (
                begin_requested_placement,
                watch_in_flight_placements,
                finalize_placed_models,
            )
                .chain(),
        )
        .add_systems(Update, preview_anchor_reticle)
        .add_systems(EguiPrimaryContextPass, ui_system)
        .run();
}
