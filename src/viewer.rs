use eframe::egui::{self, RichText, Ui};
use jsonl_lens::config::ViewerConfig;
use jsonl_lens::export::ExportFormat;
use jsonl_lens::filter::FilterQuery;
use jsonl_lens::record::{Record, truncate_chars};
use jsonl_lens::session::Session;
use std::path::Path;
use std::time::{Duration, Instant};

const ERROR_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Records,
    Table,
    Schema,
    Errors,
    Statistics,
}

impl Tab {
    const ALL: [Tab; 5] = [
        Tab::Records,
        Tab::Table,
        Tab::Schema,
        Tab::Errors,
        Tab::Statistics,
    ];

    fn label(&self) -> &'static str {
        match self {
            Tab::Records => "Records",
            Tab::Table => "Table",
            Tab::Schema => "Schema",
            Tab::Errors => "Errors",
            Tab::Statistics => "Statistics",
        }
    }
}

pub struct JsonlViewer {
    session: Session,

    search_text: String,
    is_regex: bool,
    field_scope: Option<String>,
    max_lines: u64,

    tab: Tab,
    selected: Option<usize>,
    dark_mode: bool,

    table_cache: Option<Vec<Vec<String>>>,
    report_cache: Option<String>,
    was_loading: bool,

    show_message: Option<(String, f32)>,
    message_timer: Option<f64>,
}

impl JsonlViewer {
    pub fn new(config: ViewerConfig) -> Self {
        let max_lines = config.max_lines.unwrap_or(0);
        Self {
            session: Session::new(config),

            search_text: String::new(),
            is_regex: false,
            field_scope: None,
            max_lines,

            tab: Tab::Records,
            selected: None,
            dark_mode: true,

            table_cache: None,
            report_cache: None,
            was_loading: false,

            show_message: None,
            message_timer: None,
        }
    }

    pub fn open_file(&mut self, path: &Path) {
        self.session.set_max_lines(Some(self.max_lines));
        self.selected = None;
        self.invalidate_views();

        match self.session.load(path) {
            Ok(()) => self.message(format!("Loading {}...", file_name(path)), 3.0),
            Err(e) => self.message(e.to_string(), 5.0),
        }
        self.was_loading = self.session.is_loading();
    }

    fn message(&mut self, text: String, seconds: f32) {
        self.show_message = Some((text, seconds));
        self.message_timer = None;
    }

    fn invalidate_views(&mut self) {
        self.table_cache = None;
        self.report_cache = None;
    }

    fn current_query(&self) -> FilterQuery {
        FilterQuery {
            text: self.search_text.clone(),
            is_regex: self.is_regex,
            field_scope: self.field_scope.clone(),
        }
    }

    /// A query queued during loading may have been rejected; show what is actually active.
    fn sync_query_inputs(&mut self) {
        if self.session.has_pending_query() {
            return;
        }
        let query = self.session.query();
        self.search_text = query.text.clone();
        self.is_regex = query.is_regex;
        self.field_scope = query.field_scope.clone();
    }

    fn on_query_edited(&mut self) {
        let query = self.current_query();
        self.session.set_query(query, Instant::now());
    }

    fn filters_applied(&mut self) {
        self.selected = None;
        self.table_cache = None;
        self.message(
            format!(
                "Showing {} of {} records",
                self.session.filtered().len(),
                self.session.records().len()
            ),
            3.0,
        );
    }

    fn clear_filters(&mut self) {
        self.search_text.clear();
        self.is_regex = false;
        self.field_scope = None;
        self.session.clear_filters();
        self.filters_applied();
    }

    fn export(&mut self, format: ExportFormat) {
        if self.session.filtered().is_empty() {
            self.message("No records to export".to_string(), 3.0);
            return;
        }

        let Some(path) = rfd::FileDialog::new()
            .add_filter(format.display_name(), &[format.extension()])
            .set_file_name(format!("export.{}", format.extension()))
            .save_file()
        else {
            return;
        };

        match self.session.export(&path, Some(format)) {
            Ok(_) => self.message(
                format!(
                    "Exported {} records to {}",
                    self.session.filtered().len(),
                    path.display()
                ),
                4.0,
            ),
            Err(e) => self.message(e.to_string(), 5.0),
        }
    }

    fn process_session(&mut self) {
        self.session.poll();

        if self.was_loading && !self.session.is_loading() {
            self.invalidate_views();
            self.sync_query_inputs();
            if let Some(schema) = self.session.schema() {
                let text = format!("Loaded {} records successfully", schema.valid_lines);
                self.message(text, 5.0);
            }
        }
        self.was_loading = self.session.is_loading();

        if let Some(result) = self.session.tick(Instant::now()) {
            if result.is_ok() {
                self.filters_applied();
            }
        }

        // notices carry file and regex errors; show the latest
        if let Some(notice) = self.session.take_notices().pop() {
            self.message(notice, 4.0);
        }
    }

    fn render_toolbar(&mut self, ui: &mut Ui, ctx: &egui::Context) {
        ui.horizontal_wrapped(|ui| {
            if ui.button("📂 Open").clicked() {
                if let Some(path) = rfd::FileDialog::new()
                    .add_filter("JSONL Files", &["jsonl", "jl", "gz"])
                    .add_filter("All Files", &["*"])
                    .pick_file()
                {
                    self.open_file(&path);
                }
            }

            if self.session.is_loading() && ui.button("⏹ Stop").clicked() {
                self.session.stop_loading();
            }

            ui.separator();
            ui.label("Max Lines:");
            ui.add(egui::DragValue::new(&mut self.max_lines).range(0..=10_000_000))
                .on_hover_text("0 loads the whole file");

            ui.separator();
            if ui.button("Export JSONL").clicked() {
                self.export(ExportFormat::Jsonl);
            }
            if ui.button("Export CSV").clicked() {
                self.export(ExportFormat::Csv);
            }

            ui.separator();
            if ui
                .button(if self.dark_mode { "☀️" } else { "🌙" })
                .on_hover_text("Toggle light/dark mode")
                .clicked()
            {
                self.dark_mode = !self.dark_mode;
                ctx.set_visuals(if self.dark_mode {
                    egui::Visuals::dark()
                } else {
                    egui::Visuals::light()
                });
            }
        });
    }

    fn render_search_bar(&mut self, ui: &mut Ui) {
        ui.horizontal_wrapped(|ui| {
            ui.label("Search:");
            let text_edit = ui.add(
                egui::TextEdit::singleline(&mut self.search_text)
                    .desired_width(250.0)
                    .hint_text("Search text or regex..."),
            );
            let mut edited = text_edit.changed();

            edited |= ui.checkbox(&mut self.is_regex, "Regex").changed();

            ui.label("Field:");
            let previous_scope = self.field_scope.clone();
            let names = self.session.field_names();
            egui::ComboBox::from_id_salt("field_scope")
                .selected_text(self.field_scope.as_deref().unwrap_or("All Fields"))
                .show_ui(ui, |ui| {
                    ui.selectable_value(&mut self.field_scope, None, "All Fields");
                    for name in &names {
                        ui.selectable_value(&mut self.field_scope, Some(name.clone()), name);
                    }
                });
            edited |= previous_scope != self.field_scope;

            if ui.button("Clear Filters").clicked() {
                self.clear_filters();
            } else if edited {
                self.on_query_edited();
            }
        });
    }

    fn render_tabs(&mut self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            for tab in Tab::ALL {
                if ui.selectable_label(self.tab == tab, tab.label()).clicked() {
                    self.tab = tab;
                }
            }
        });
    }

    fn render_records(&mut self, ui: &mut Ui) {
        let preview_chars = self.session.config().preview_chars;
        let row_height = ui.text_style_height(&egui::TextStyle::Monospace) + 4.0;
        let total = self.session.filtered().len();
        let mut clicked = None;

        egui::ScrollArea::vertical()
            .auto_shrink([false; 2])
            .id_salt("records_scroll")
            .show_rows(ui, row_height, total, |ui, row_range| {
                for position in row_range {
                    let Some(record) = self.session.filtered_record(position) else {
                        continue;
                    };
                    let text = format!(
                        "[{}] {}",
                        record.line_number,
                        record.preview(preview_chars)
                    );
                    let is_selected = self.selected == Some(position);
                    if ui
                        .selectable_label(is_selected, RichText::new(text).monospace())
                        .clicked()
                    {
                        clicked = Some(position);
                    }
                }
            });

        if clicked.is_some() {
            self.selected = clicked;
        }
    }

    fn render_table(&mut self, ui: &mut Ui) {
        let rows = self
            .table_cache
            .get_or_insert_with(|| self.session.table_rows());
        let names = self.session.field_names();

        egui::ScrollArea::both()
            .auto_shrink([false; 2])
            .id_salt("table_scroll")
            .show(ui, |ui| {
                egui::Grid::new("table_grid")
                    .striped(true)
                    .num_columns(names.len() + 1)
                    .spacing([10.0, 4.0])
                    .show(ui, |ui| {
                        ui.label(RichText::new("Line #").strong());
                        for name in &names {
                            ui.label(RichText::new(name).strong());
                        }
                        ui.end_row();

                        for row in rows.iter() {
                            for cell in row {
                                ui.label(RichText::new(truncate_chars(cell, 80)).monospace());
                            }
                            ui.end_row();
                        }
                    });
            });
    }

    fn render_schema(&self, ui: &mut Ui) {
        let Some(schema) = self.session.schema() else {
            ui.label("Schema is available once loading finishes.");
            return;
        };

        egui::ScrollArea::vertical()
            .auto_shrink([false; 2])
            .id_salt("schema_scroll")
            .show(ui, |ui| {
                egui::Grid::new("schema_grid")
                    .striped(true)
                    .num_columns(4)
                    .spacing([16.0, 4.0])
                    .show(ui, |ui| {
                        for heading in ["Field", "Type", "Count", "Coverage %"] {
                            ui.label(RichText::new(heading).strong());
                        }
                        ui.end_row();

                        for summary in schema.field_summaries() {
                            ui.label(RichText::new(&summary.name).monospace());
                            ui.label(summary.types_label());
                            ui.label(summary.count.to_string());
                            ui.label(format!("{:.1}%", summary.coverage));
                            ui.end_row();
                        }
                    });
            });
    }

    fn render_errors(&self, ui: &mut Ui) {
        let errors = self.session.errors();
        if errors.is_empty() {
            ui.label("No parse errors.");
            return;
        }

        egui::ScrollArea::both()
            .auto_shrink([false; 2])
            .id_salt("errors_scroll")
            .show(ui, |ui| {
                egui::Grid::new("errors_grid")
                    .striped(true)
                    .num_columns(3)
                    .spacing([16.0, 4.0])
                    .show(ui, |ui| {
                        for heading in ["Line #", "Error", "Content"] {
                            ui.label(RichText::new(heading).strong());
                        }
                        ui.end_row();

                        for error in errors {
                            ui.label(error.line_label());
                            ui.label(&error.message);
                            ui.label(
                                RichText::new(truncate_chars(&error.raw_text, ERROR_PREVIEW_CHARS))
                                    .monospace(),
                            );
                            ui.end_row();
                        }
                    });
            });
    }

    fn render_statistics(&mut self, ui: &mut Ui) {
        let Some(schema) = self.session.schema() else {
            ui.label("Statistics are available once loading finishes.");
            return;
        };
        let name = self.session.path().map(file_name).unwrap_or_default();
        let report = self
            .report_cache
            .get_or_insert_with(|| schema.report(&name));

        egui::ScrollArea::vertical()
            .auto_shrink([false; 2])
            .id_salt("stats_scroll")
            .show(ui, |ui| {
                ui.add(
                    egui::TextEdit::multiline(&mut report.as_str())
                        .font(egui::TextStyle::Monospace)
                        .desired_width(f32::INFINITY)
                        .frame(false),
                );
            });
    }

    fn render_detail(&self, ui: &mut Ui) {
        let record: Option<&Record> = self
            .selected
            .and_then(|position| self.session.filtered_record(position));
        let Some(record) = record else {
            ui.label("Select a record to view it.");
            return;
        };

        ui.label(RichText::new(format!("Line {}", record.line_number)).strong());
        ui.separator();
        let pretty = record.pretty();
        egui::ScrollArea::vertical()
            .auto_shrink([false; 2])
            .id_salt("detail_scroll")
            .show(ui, |ui| {
                ui.add(
                    egui::TextEdit::multiline(&mut pretty.as_str())
                        .font(egui::TextStyle::Monospace)
                        .desired_width(f32::INFINITY)
                        .frame(false),
                );
            });
    }

    fn render_status_bar(&mut self, ui: &mut Ui, ctx: &egui::Context) {
        ui.horizontal(|ui| {
            if let Some(path) = self.session.path() {
                ui.label(RichText::new(file_name(path)).strong());
                ui.separator();
            } else {
                ui.label("No file loaded");
            }

            if self.session.is_loading() {
                ui.spinner();
                let loaded = match self.session.progress() {
                    Some((current, Some(total))) => format!("Loaded {} / ~{} lines", current, total),
                    Some((current, None)) => format!("Loaded {} lines...", current),
                    None => format!("Loaded {} records...", self.session.records().len()),
                };
                ui.label(loaded);
            } else if let Some(schema) = self.session.schema() {
                ui.label(format!(
                    "Lines: {} | Valid: {} | Errors: {}",
                    schema.total_lines, schema.valid_lines, schema.error_lines
                ));
                ui.separator();
                ui.label(format!(
                    "Showing {} of {}",
                    self.session.filtered().len(),
                    self.session.records().len()
                ));
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if let Some((message, duration)) = &self.show_message {
                    let now = ctx.input(|i| i.time);
                    let start_time = self.message_timer.get_or_insert(now);

                    if now - *start_time < *duration as f64 {
                        ui.label(message);
                        ctx.request_repaint();
                    } else {
                        self.show_message = None;
                        self.message_timer = None;
                    }
                }
            });
        });
    }
}

impl eframe::App for JsonlViewer {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        for dropped_file in ctx.input(|i| i.raw.dropped_files.clone()) {
            if let Some(path) = dropped_file.path {
                self.open_file(&path);
            }
        }

        self.process_session();

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            self.render_toolbar(ui, ctx);
            ui.separator();
            self.render_search_bar(ui);
            ui.separator();
            self.render_tabs(ui);
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            self.render_status_bar(ui, ctx);
        });

        if self.tab == Tab::Records {
            egui::SidePanel::right("record_detail")
                .resizable(true)
                .default_width(420.0)
                .show(ctx, |ui| {
                    self.render_detail(ui);
                });
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.session.path().is_none() {
                ui.centered_and_justified(|ui| {
                    ui.vertical_centered(|ui| {
                        ui.heading("JSONL Lens");
                        ui.label("Streaming JSONL viewer");
                        ui.add_space(20.0);
                        ui.label("Click 'Open' or drag & drop a file.");
                    });
                });
                return;
            }

            match self.tab {
                Tab::Records => self.render_records(ui),
                Tab::Table => self.render_table(ui),
                Tab::Schema => self.render_schema(ui),
                Tab::Errors => self.render_errors(ui),
                Tab::Statistics => self.render_statistics(ui),
            }
        });

        if self.session.is_loading() {
            ctx.request_repaint();
        } else if self.session.has_pending_query() {
            ctx.request_repaint_after(Duration::from_millis(50));
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_with_query(viewer: &mut JsonlViewer, path: &Path, text: &str, is_regex: bool) {
        viewer.open_file(path);
        viewer.search_text = text.to_string();
        viewer.is_regex = is_regex;
        viewer.on_query_edited();

        let deadline = Instant::now() + Duration::from_secs(10);
        while viewer.session.is_loading() {
            viewer.process_session();
            assert!(Instant::now() < deadline, "load did not finish");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn rejected_query_after_load_resets_search_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.jsonl");
        std::fs::write(&path, "{\"a\":1}\n{\"b\":2}\n").unwrap();

        let mut viewer = JsonlViewer::new(ViewerConfig::default());
        load_with_query(&mut viewer, &path, "(", true);

        assert!(viewer.search_text.is_empty());
        assert!(!viewer.is_regex);
        assert_eq!(viewer.session.filtered(), &[0, 1]);
    }

    #[test]
    fn accepted_query_after_load_keeps_search_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.jsonl");
        std::fs::write(&path, "{\"a\":1}\n{\"b\":2}\n").unwrap();

        let mut viewer = JsonlViewer::new(ViewerConfig::default());
        load_with_query(&mut viewer, &path, "b", false);

        assert_eq!(viewer.search_text, "b");
        assert_eq!(viewer.session.filtered(), &[1]);
    }
}
