//! Admin presentation: list columns, read-only breakdowns and form layout.

use crate::config::{self, DisplayMode};
use crate::field::LocalizedColumn;
use crate::forms::LocalizedFormField;
use crate::i18n::LanguageRegistry;
use crate::model::{Instance, Model};
use crate::resolver;
use crate::value::{is_blank, LocalizedValue, Raw};
use serde_json::Value;
use std::fmt::Write;
use std::sync::Arc;

/// Placeholder shown for a value that resolves to nothing.
pub const EMPTY_DISPLAY: &str = "-";

/// Text for one JSON scalar; containers are shown as compact JSON.
pub fn display_json(value: &Value) -> String {
    match value {
        Value::Null => EMPTY_DISPLAY.to_string(),
        Value::String(s) if s.is_empty() => EMPTY_DISPLAY.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Value shown in a list column: the translation for the active language.
pub fn display_value(value: Option<&LocalizedValue<Raw>>) -> String {
    value
        .and_then(|v| resolver::resolve(v, None))
        .map(display_json)
        .unwrap_or_else(|| EMPTY_DISPLAY.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakdownEntry {
    pub code: String,
    pub name: String,
    pub value: String,
    pub active: bool,
}

/// Every configured language with its stored value, marking the active one.
pub fn breakdown(value: &LocalizedValue<Raw>) -> Vec<BreakdownEntry> {
    let registry = LanguageRegistry::get();
    let active = resolver::target_language(registry.settings(), None);
    registry
        .list()
        .iter()
        .map(|lang| BreakdownEntry {
            code: lang.code.clone(),
            name: lang.name.clone(),
            value: value
                .get(&lang.code)
                .filter(|v| !is_blank(v))
                .map(display_json)
                .unwrap_or_else(|| EMPTY_DISPLAY.to_string()),
            active: lang.code == active,
        })
        .collect()
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Read-only HTML for a value in the given display mode.
pub fn render_readonly(value: &LocalizedValue<Raw>, mode: DisplayMode) -> String {
    let entries = breakdown(value);
    let mut html = String::new();
    let mode_class = match mode {
        DisplayMode::Tab => "i18n-tab-mode",
        DisplayMode::Dropdown => "i18n-dropdown-mode",
    };
    let _ = write!(html, "<div class=\"i18n-readonly-widget {}\">", mode_class);

    match mode {
        DisplayMode::Tab => {
            html.push_str("<ul class=\"i18n-readonly-tabs\">");
            for entry in &entries {
                let _ = write!(
                    html,
                    "<li class=\"i18n-readonly-tab{}\" data-lang=\"{}\">{}</li>",
                    if entry.active { " active" } else { "" },
                    escape(&entry.code),
                    escape(&entry.name)
                );
            }
            html.push_str("</ul>");
        }
        DisplayMode::Dropdown => {
            html.push_str("<select class=\"i18n-readonly-select\">");
            for entry in &entries {
                let _ = write!(
                    html,
                    "<option value=\"{}\"{}>{}</option>",
                    escape(&entry.code),
                    if entry.active { " selected" } else { "" },
                    escape(&entry.name)
                );
            }
            html.push_str("</select>");
        }
    }

    for entry in &entries {
        let _ = write!(
            html,
            "<div class=\"i18n-readonly-panel{}\" data-lang=\"{}\">{}</div>",
            if entry.active { " active" } else { "" },
            escape(&entry.code),
            escape(&entry.value)
        );
    }
    html.push_str("</div>");
    html
}

/// Admin configuration for one model.
#[derive(Debug, Clone)]
pub struct LocalizedAdmin {
    model: Arc<Model>,
    display: Option<DisplayMode>,
}

impl LocalizedAdmin {
    pub fn new(model: Arc<Model>) -> Self {
        Self {
            model,
            display: None,
        }
    }

    /// Override the configured display mode for this admin.
    pub fn with_display(mut self, display: DisplayMode) -> Self {
        self.display = Some(display);
        self
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display.unwrap_or_else(|| config::settings().display)
    }

    /// Form field per localized field, in declaration order.
    pub fn form_fields(&self) -> Vec<(String, LocalizedFormField)> {
        let mode = self.display_mode();
        self.model
            .localized_fields()
            .iter()
            .map(|field| {
                (
                    field.name().to_string(),
                    LocalizedFormField::for_column(field.as_ref()).with_display(mode),
                )
            })
            .collect()
    }

    /// Names of the generated list columns.
    pub fn list_display(&self) -> Vec<String> {
        self.model
            .localized_fields()
            .iter()
            .map(|f| format!("_localized_{}_display", f.name()))
            .collect()
    }

    /// Names of the generated read-only fields.
    pub fn readonly_fields(&self) -> Vec<String> {
        self.model
            .localized_fields()
            .iter()
            .map(|f| format!("_readonly_{}_display", f.name()))
            .collect()
    }

    /// List cell for `field` of `instance`; unknown fields show the placeholder.
    pub fn list_value(&self, instance: &Instance, field: &str) -> String {
        display_value(instance.localized(field).ok())
    }

    pub fn readonly_html(&self, instance: &Instance, field: &str) -> Option<String> {
        instance
            .localized(field)
            .ok()
            .map(|value| render_readonly(value, self.display_mode()))
    }
}
