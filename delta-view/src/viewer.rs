//! Interactive river delta viewer built with eframe/egui.
//!
//! This module defines [`Viewer`], which owns a [`Simulation`] together
//! with the configuration being edited and a [`RandomSeries`] standing in
//! for the field solver, and implements [`eframe::App`] to render and
//! drive it.

use delta_core::{
    boundary::SimpleBoundary,
    config::Config,
    error::DeltaResult,
    geometry::Point,
    model::{BifurcationMode, GrowthLaw},
    phases::Simulation,
    types::{BranchId, Tag},
};
use eframe::App;

use crate::random_series::RandomSeries;

const SEED: u64 = 2024;

/// Which [`Simulation`] step a "Step" press (or a running frame) performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StepKind {
    Linear,
    NonLinear,
    Shrink,
}

impl StepKind {
    const ALL: [StepKind; 3] = [Self::Linear, Self::NonLinear, Self::Shrink];

    fn label(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::NonLinear => "non-linear",
            Self::Shrink => "shrink",
        }
    }
}

/// Main application state for the interactive viewer.
///
/// The typical per-frame update is:
/// 1. Handle UI interactions / input.
/// 2. If `running` is `true` and enough time has passed, call [`Viewer::step_once`].
/// 3. Render the spliced boundary and the branches.
///
/// ### Fields
/// - `sim` - Simulation being grown.
/// - `cfg` - Configuration edited in the side panel; applied on reset.
/// - `solver` - Random coefficient source.
/// - `boundary` - Boundary generated after the last change, if it succeeded.
/// - `last_error` - Message of the last failed operation.
///
/// - `running` - Whether the simulation is currently auto-advancing.
/// - `zoom` - Screen pixels per world unit.
/// - `pan` - Screen-space pan offset in pixels.
///
/// - `step_interval` - Target time between automatic steps (seconds).
/// - `last_step_time` - Time stamp of the last step (egui time).
/// - `steps` - Steps taken since the last reset.
pub struct Viewer {
    sim: Simulation,
    cfg: Config,
    solver: RandomSeries,
    step_kind: StepKind,
    boundary: Option<SimpleBoundary>,
    last_error: Option<String>,

    running: bool,
    zoom: f32,
    pan: egui::Vec2,

    step_interval: f64,
    last_step_time: f64,
    steps: usize,
}

impl Viewer {
    /// Creates a viewer over the default rectangular region.
    ///
    /// The starting configuration uses the arctangent growth law, a ribbon
    /// wide enough to see and a stop height just below the top edge.
    pub fn new() -> DeltaResult<Self> {
        let cfg = Config {
            growth_law: GrowthLaw::Arctan,
            river_width: 5e-4,
            maximal_river_height: Some(0.9),
            source_x: 0.5,
            ..Config::default()
        };
        let sim = Simulation::from_config(cfg.clone())?;
        let mut viewer = Self {
            sim,
            cfg,
            solver: RandomSeries::new(SEED),
            step_kind: StepKind::Linear,
            boundary: None,
            last_error: None,
            running: false,
            zoom: 500.0,
            pan: egui::vec2(0.0, 0.0),
            step_interval: 0.1,
            last_step_time: 0.0,
            steps: 0,
        };
        viewer.refresh_boundary();
        Ok(viewer)
    }

    /// Rebuilds the simulation from the edited configuration.
    ///
    /// An invalid configuration leaves the current simulation in place and
    /// reports the error in the status bar.
    fn reset(&mut self) {
        self.running = false;
        match Simulation::from_config(self.cfg.clone()) {
            Ok(sim) => {
                self.sim = sim;
                self.solver = RandomSeries::new(SEED);
                self.steps = 0;
                self.last_error = None;
                self.refresh_boundary();
            }
            Err(e) => self.last_error = Some(e.to_string()),
        }
    }

    /// Replaces the tree with the fork fixture: a straight trunk that
    /// splits once into two straight children.
    fn demo_tree(&mut self) {
        self.reset();
        let tag = self.sim.config.river_tag;
        let grown = self.sim.tree.grow_test_tree(tag, 1, 0.02, 10, 0.0);
        if let Err(e) = grown {
            self.last_error = Some(e.to_string());
        }
        self.refresh_boundary();
    }

    /// Advances the simulation by one step of the selected kind.
    ///
    /// Errors stop auto-running and are shown in the status bar, as is
    /// reaching the stop height.
    fn step_once(&mut self) {
        if self.sim.growth_stop_condition() {
            self.running = false;
            self.last_error = Some("stop height reached".to_string());
            return;
        }
        let result = match self.step_kind {
            StepKind::Linear => self.sim.linear_step(&mut self.solver).map(|_| ()),
            StepKind::NonLinear => self.sim.non_linear_step(&mut self.solver).map(|_| ()),
            StepKind::Shrink => self.sim.shrink_step(&mut self.solver).map(|_| ()),
        };
        match result {
            Ok(()) => {
                self.steps += 1;
                self.last_error = None;
            }
            Err(e) => {
                log::error!("step {} failed: {e}", self.steps);
                self.running = false;
                self.last_error = Some(e.to_string());
            }
        }
        self.refresh_boundary();
    }

    fn refresh_boundary(&mut self) {
        match self.sim.generate_boundary() {
            Ok(b) => self.boundary = Some(b),
            Err(e) => {
                self.boundary = None;
                self.last_error = Some(e.to_string());
            }
        }
    }

    /// Point in the middle of the region, drawn at the center of the view.
    fn world_center(&self) -> Point {
        Point::new(self.sim.config.width, self.sim.config.height) * 0.5
    }

    /// Converts a world-space position to screen-space.
    ///
    /// World coordinates are centered on the region, scaled by `zoom`,
    /// offset by `pan` and placed at the center of `rect`. The y-axis is
    /// flipped so that positive y goes up in world space.
    fn world_to_screen(&self, p: Point, rect: egui::Rect) -> egui::Pos2 {
        let center = rect.center();
        let d = (p - self.world_center()).as_vec2();
        egui::pos2(
            center.x + d.x * self.zoom + self.pan.x,
            center.y - d.y * self.zoom + self.pan.y,
        )
    }

    /// Inverse of [`Viewer::world_to_screen`] up to rounding.
    fn screen_to_world(&self, p: egui::Pos2, rect: egui::Rect) -> Point {
        let center = rect.center();
        let x = (p.x - center.x - self.pan.x) / self.zoom;
        let y = (center.y - p.y + self.pan.y) / self.zoom;
        self.world_center() + Point::new(f64::from(x), f64::from(y))
    }

    fn labeled_drag_f64(
        ui: &mut egui::Ui,
        label: &str,
        value: &mut f64,
        range: std::ops::RangeInclusive<f64>,
        speed: f64,
    ) {
        ui.horizontal(|ui| {
            ui.label(label);
            ui.add(egui::DragValue::new(value).range(range).speed(speed));
        });
    }

    /// Builds the top panel UI (run controls, stepping, zoom).
    fn ui_top_panel(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui
                    .button(if self.running { "⏸ Pause" } else { "▶ Run" })
                    .clicked()
                {
                    self.running = !self.running;
                }

                ui.add(
                    egui::DragValue::new(&mut self.step_interval)
                        .prefix("dt target = ")
                        .range(0.01..=1.0)
                        .speed(0.01),
                );

                egui::ComboBox::from_id_salt("step_kind")
                    .selected_text(self.step_kind.label())
                    .show_ui(ui, |ui| {
                        for kind in StepKind::ALL {
                            ui.selectable_value(&mut self.step_kind, kind, kind.label());
                        }
                    });

                if ui.button("Step").clicked() {
                    self.step_once();
                }
                if ui.button("Revert").clicked() {
                    if let Err(e) = self.sim.revert_last_step() {
                        self.last_error = Some(e.to_string());
                    }
                    self.refresh_boundary();
                }
                if ui.button("Reset").clicked() {
                    self.reset();
                }
                if ui.button("Demo tree").clicked() {
                    self.demo_tree();
                }

                ui.separator();
                ui.add(egui::Slider::new(&mut self.zoom, 50.0..=5000.0).logarithmic(true).text("Zoom"));
            });
        });
    }

    /// Builds the bottom status bar (counts and the last error).
    fn ui_status_bar(&self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if let Some(b) = &self.boundary {
                    ui.label(format!("vertices = {}, edges = {}", b.vertices.len(), b.edges.len()));
                }
                ui.label(format!("tips = {}", self.sim.tree.tip_ids().len()));
                ui.label(format!("branches = {}", self.sim.tree.len()));
                ui.label(format!("steps = {}", self.steps));
                if let Some(err) = &self.last_error {
                    ui.separator();
                    ui.colored_label(egui::Color32::LIGHT_RED, err);
                }
            });
        });
    }

    /// Builds the right-hand configuration panel for simulation parameters.
    fn ui_config_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("config_panel")
            .resizable(true)
            .default_width(240.0)
            .show(ctx, |ui| {
                ui.heading("Config");
                let cfg = &mut self.cfg;

                ui.separator();
                ui.label("Growth");
                Self::labeled_drag_f64(ui, "ds:", &mut cfg.ds, 1e-4..=0.1, 1e-4);
                Self::labeled_drag_f64(ui, "eta:", &mut cfg.eta, 0.0..=5.0, 0.05);
                Self::labeled_drag_f64(ui, "growth_threshold:", &mut cfg.growth_threshold, 0.0..=1.0, 0.01);
                Self::labeled_drag_f64(ui, "growth_min_distance:", &mut cfg.growth_min_distance, 0.0..=1.0, 1e-3);
                egui::ComboBox::from_label("growth law")
                    .selected_text(cfg.growth_law.label())
                    .show_ui(ui, |ui| {
                        for law in GrowthLaw::ALL {
                            ui.selectable_value(&mut cfg.growth_law, law, law.label());
                        }
                    });

                ui.separator();
                ui.label("Bifurcation");
                egui::ComboBox::from_label("mode")
                    .selected_text(cfg.bifurcation_mode.label())
                    .show_ui(ui, |ui| {
                        for mode in BifurcationMode::ALL {
                            ui.selectable_value(&mut cfg.bifurcation_mode, mode, mode.label());
                        }
                    });
                Self::labeled_drag_f64(ui, "threshold:", &mut cfg.bifurcation_threshold, -10.0..=10.0, 0.01);
                Self::labeled_drag_f64(ui, "min_dist:", &mut cfg.bifurcation_min_dist, 0.0..=1.0, 1e-3);
                Self::labeled_drag_f64(ui, "angle:", &mut cfg.bifurcation_angle, 0.0..=1.5, 0.01);

                ui.separator();
                ui.label("River");
                Self::labeled_drag_f64(ui, "width:", &mut cfg.river_width, 0.0..=0.01, 1e-5);
                Self::labeled_drag_f64(ui, "smoothness:", &mut cfg.smoothness_degree, 0.0..=1.0, 0.01);
                Self::labeled_drag_f64(ui, "max_curvature:", &mut cfg.max_curvature_distance, 0.0..=0.1, 1e-4);

                ui.separator();
                ui.label("Region");
                Self::labeled_drag_f64(ui, "width:", &mut cfg.width, 0.1..=10.0, 0.05);
                Self::labeled_drag_f64(ui, "height:", &mut cfg.height, 0.1..=10.0, 0.05);
                Self::labeled_drag_f64(ui, "source_x:", &mut cfg.source_x, 0.0..=10.0, 0.01);
                let mut limited = cfg.maximal_river_height.is_some();
                ui.checkbox(&mut limited, "stop height");
                match (limited, cfg.maximal_river_height) {
                    (true, None) => cfg.maximal_river_height = Some(cfg.height * 0.9),
                    (false, Some(_)) => cfg.maximal_river_height = None,
                    _ => {}
                }
                if let Some(h) = cfg.maximal_river_height.as_mut() {
                    Self::labeled_drag_f64(ui, "height:", h, 0.0..=10.0, 0.01);
                }

                ui.separator();
                ui.label("Random series");
                Self::labeled_drag_f64(ui, "turn:", &mut self.solver.turn, 0.0..=2.0, 0.01);
                Self::labeled_drag_f64(ui, "fork chance:", &mut self.solver.fork_chance, 0.0..=1.0, 0.01);

                ui.separator();
                if ui.button("Apply (resets)").clicked() {
                    self.reset();
                }
                if ui.button("Reset cfg to default").clicked() {
                    self.cfg = Config::default();
                }
            });
    }

    fn tag_color(&self, tag: Tag) -> egui::Color32 {
        if tag == self.sim.config.river_tag {
            egui::Color32::LIGHT_BLUE
        } else {
            egui::Color32::GRAY
        }
    }

    /// Builds the central panel where the boundary and the tree are drawn.
    fn ui_central_panel(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let response = ui.allocate_response(ui.available_size(), egui::Sense::click_and_drag());
            let rect = response.rect;
            let painter = ui.painter_at(rect);

            // Pan with drag.
            if response.dragged() {
                self.pan += response.drag_delta();
            }

            // Zoom around the mouse cursor.
            let scroll = ui.ctx().input(|i| i.raw_scroll_delta.y);
            if scroll != 0.0 {
                let pointer_screen = response.hover_pos().unwrap_or(rect.center());
                let world_before = self.screen_to_world(pointer_screen, rect);

                let factor = (1.0 + scroll * 0.001).clamp(0.5, 2.0);
                self.zoom = (self.zoom * factor).clamp(50.0, 5000.0);

                let screen_after = self.world_to_screen(world_before, rect);
                self.pan += pointer_screen - screen_after;
            }

            // Spliced boundary, coloured by edge tag.
            if let Some(boundary) = &self.boundary {
                for e in &boundary.edges {
                    let (Some(&a), Some(&b)) = (boundary.vertices.get(e.start), boundary.vertices.get(e.end))
                    else {
                        continue;
                    };
                    painter.line_segment(
                        [self.world_to_screen(a, rect), self.world_to_screen(b, rect)],
                        egui::Stroke::new(1.0, self.tag_color(e.tag)),
                    );
                }
            }

            // Branch center lines and tips.
            let tips: Vec<BranchId> = self.sim.tree.tip_ids();
            for (id, branch) in self.sim.tree.iter() {
                let points: Vec<egui::Pos2> = branch
                    .vertices()
                    .iter()
                    .map(|&p| self.world_to_screen(p, rect))
                    .collect();
                painter.add(egui::Shape::line(
                    points,
                    egui::Stroke::new(1.0, egui::Color32::LIGHT_GREEN),
                ));
                if tips.contains(&id) {
                    painter.circle_filled(
                        self.world_to_screen(branch.tip_point(), rect),
                        2.5,
                        egui::Color32::RED,
                    );
                }
            }

            if let Some(p) = response.hover_pos() {
                let w = self.screen_to_world(p, rect);
                painter.text(
                    rect.left_bottom() + egui::vec2(8.0, -8.0),
                    egui::Align2::LEFT_BOTTOM,
                    format!("({:.4}, {:.4})", w.x, w.y),
                    egui::FontId::monospace(12.0),
                    egui::Color32::GRAY,
                );
            }

            // Auto-run simulation if requested.
            if self.running {
                let now = ctx.input(|i| i.time);
                if now - self.last_step_time >= self.step_interval {
                    self.step_once();
                    self.last_step_time = now;
                }
                ctx.request_repaint();
            }
        });
    }
}

impl App for Viewer {
    /// eframe callback that builds all UI panels for each frame.
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.ui_top_panel(ctx);
        self.ui_status_bar(ctx);
        self.ui_config_panel(ctx);
        self.ui_central_panel(ctx);
    }
}
