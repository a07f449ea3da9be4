//! HTML view of the thermostat.
//!
//! Renders the fragment that replaces the page's live root on every frame.
//! Values are HTML-escaped by the template engine.

use crate::model::ThermoModel;

use handlebars::Handlebars;
use live_runtime::{RenderContext, RenderError, Renderer};
use serde::Serialize;

const TEMPLATE_NAME: &str = "thermostat";
const TEMPLATE: &str = include_str!("../templates/thermostat.hbs");

/// Above this temperature the view shows a warning.
pub const TEMPERATURE_WARNING_LIMIT: f32 = 25.0;

#[derive(Serialize)]
struct ViewModel<'a> {
    name: &'a str,
    temperature: String,
    time: &'a str,
    status: &'a str,
    too_hot: bool,
    limit: String,
    reload_revision: u32,
    revision: u64,
}

/// Handlebars renderer for [`ThermoModel`].
pub struct ThermostatView {
    handlebars: Handlebars<'static>,
}

impl ThermostatView {
    /// Compile the template.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::Template` if the template does not parse.
    pub fn new() -> Result<Self, RenderError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars
            .register_template_string(TEMPLATE_NAME, TEMPLATE)
            .map_err(|e| RenderError::Template(e.to_string()))?;

        Ok(Self { handlebars })
    }
}

impl Renderer<ThermoModel> for ThermostatView {
    fn render(&self, ctx: &RenderContext, model: &ThermoModel) -> Result<String, RenderError> {
        let view = ViewModel {
            name: &model.name,
            temperature: format!("{:.1}", model.temperature),
            time: &model.time,
            status: &model.status,
            too_hot: model.temperature > TEMPERATURE_WARNING_LIMIT,
            limit: format!("{TEMPERATURE_WARNING_LIMIT:.1}"),
            reload_revision: model.live_reload.revision,
            revision: ctx.revision,
        };

        self.handlebars
            .render(TEMPLATE_NAME, &view)
            .map_err(|e| RenderError::Template(e.to_string()))
    }
}
