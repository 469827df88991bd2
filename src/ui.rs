use crate::ASSET_ROOT;
use crate::catalog::ModelCatalog;
use crate::config::AppConfig;
use crate::session::{PlacementSession, SelectionState};
use crate::tracking::UiInteractionState;
use bevy::prelude::{Res, ResMut, Resource};
use bevy_egui::{EguiContexts, egui};
use std::collections::HashMap;
use std::path::Path;

const THUMBNAIL_SIZE: f32 = 72.0;

/// Lazily loaded picker thumbnails. A model without a thumbnail image
/// keeps a `None` entry so the lookup is not retried every frame.
#[derive(Resource, Default)]
pub struct ThumbnailCache {
    textures: HashMap<String, Option<egui::TextureHandle>>,
}

impl ThumbnailCache {
    fn texture_for(
        &mut self,
        ctx: &egui::Context,
        thumbnails_dir: &str,
        name: &str,
    ) -> Option<egui::TextureHandle> {
        self.textures
            .entry(name.to_string())
            .or_insert_with(|| {
                let path = Path::new(ASSET_ROOT)
                    .join(thumbnails_dir)
                    .join(format!("{name}.png"));
                match load_thumbnail(&path) {
                    Ok(image) => Some(ctx.load_texture(
                        format!("thumbnail-{name}"),
                        image,
                        egui::TextureOptions::LINEAR,
                    )),
                    Err(err) => {
                        tracing::debug!("no thumbnail for '{name}': {err}");
                        None
                    }
                }
            })
            .clone()
    }
}

fn load_thumbnail(path: &Path) -> anyhow::Result<egui::ColorImage> {
    let image = image::open(path)?.into_rgba8();
    let size = [image.width() as usize, image.height() as usize];
    Ok(egui::ColorImage::from_rgba_unmultiplied(size, image.as_raw()))
}

/// The picker / confirm bar. Idle shows the catalog, a pending
/// selection shows confirm and cancel; nothing else. Purely a view
/// over [`PlacementSession`].
pub fn ui_system(
    mut contexts: EguiContexts,
    mut session: ResMut<PlacementSession>,
    catalog: Res<ModelCatalog>,
    config: Res<AppConfig>,
    mut thumbnails: ResMut<ThumbnailCache>,
    mut ui_state: ResMut<UiInteractionState>,
) {
    let Ok(ctx) = contexts.ctx_mut() else {
        return;
    };

    egui::TopBottomPanel::top("setdress_status_bar").show(ctx, |ui| {
        ui.horizontal_wrapped(|ui| {
            ui.heading("setdress");
            ui.separator();
            ui.label(format!("Status: {}", session.status));
            ui.separator();
            ui.small("LMB drag: move, RMB drag on model: rotate, wheel: scale / zoom.");
        });
    });

    egui::TopBottomPanel::bottom("setdress_placement_bar").show(ctx, |ui| {
        ui.add_space(6.0);
        match session.selection.clone() {
            SelectionState::Idle => {
                if catalog.is_empty() {
                    ui.label(format!(
                        "No models found in {ASSET_ROOT}/{}",
                        config.models_dir
                    ));
                } else {
                    egui::ScrollArea::horizontal().show(ui, |ui| {
                        ui.horizontal(|ui| {
                            for name in catalog.models() {
                                let clicked = match thumbnails.texture_for(
                                    ui.ctx(),
                                    &config.thumbnails_dir,
                                    name,
                                ) {
                                    Some(texture) => {
                                        let image =
                                            egui::Image::new(egui::load::SizedTexture::new(
                                                texture.id(),
                                                egui::vec2(THUMBNAIL_SIZE, THUMBNAIL_SIZE),
                                            ));
                                        ui.vertical(|ui| {
                                            let clicked =
                                                ui.add(egui::ImageButton::new(image)).clicked();
                                            ui.small(name);
                                            clicked
                                        })
                                        .inner
                                    }
                                    None => ui.button(name).clicked(),
                                };
                                if clicked {
                                    session.select_model(name.clone());
                                }
                            }
                        });
                    });
                }
            }
            SelectionState::Pending(name) => {
                ui.horizontal(|ui| {
                    ui.label(egui::RichText::new(&name).strong());
                    ui.separator();
                    if ui.button("Cancel").clicked() {
                        session.cancel();
                        session.status = "Ready".to_string();
                    }
                    if ui.button("Place").clicked() {
                        session.confirm();
                    }
                });
            }
        }
        ui.add_space(6.0);
    });

    ui_state.wants_pointer_input = ctx.wants_pointer_input();
    ui_state.wants_keyboard_input = ctx.wants_keyboard_input();
}
