use std::collections::BTreeMap;
use std::sync::OnceLock;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{KontoError, Result};

/// Where a form submits to, and what a browser would send without user input.
#[derive(Debug, Clone, PartialEq)]
pub struct FormData {
    pub action: Url,
    pub fields: BTreeMap<String, String>,
}

impl FormData {
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.fields.insert(name.to_string(), value.into());
    }
}

pub(crate) fn form_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("form").expect("invalid form selector"))
}

fn field_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("input, select").expect("invalid field selector"))
}

fn option_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("option").expect("invalid option selector"))
}

/// Parse an HTML fragment holding a `<form>` and extract the first one.
pub fn extract_form_data(form_html: &str, base_url: &Url) -> Result<FormData> {
    let fragment = Html::parse_fragment(form_html);
    let form = fragment
        .select(form_selector())
        .next()
        .ok_or(KontoError::FormActionNotFound)?;
    extract_form(form, base_url)
}

pub fn extract_form(form: ElementRef<'_>, base_url: &Url) -> Result<FormData> {
    let action = form
        .value()
        .attr("action")
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or(KontoError::FormActionNotFound)?;
    let action = base_url.join(action)?;

    let mut fields = BTreeMap::new();
    for element in form_fields(form) {
        match element.value().name() {
            "input" => read_input(element, &mut fields),
            "select" => read_select(element, &mut fields)?,
            _ => {}
        }
    }

    Ok(FormData { action, fields })
}

/// The inputs and selects that belong to `form`.
///
/// A form opened inside a `<table>` is left empty by the HTML parser and its
/// fields follow it inside the same table. They are collected in document
/// order up to the next form.
fn form_fields(form: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let nested: Vec<_> = form.select(field_selector()).collect();
    if !nested.is_empty() {
        return nested;
    }
    let scope = form
        .ancestors()
        .find(|a| a.value().as_element().is_some_and(|e| e.name() == "table"))
        .or_else(|| form.ancestors().last());
    let Some(scope) = scope else {
        return nested;
    };
    scope
        .descendants()
        .skip_while(|n| n.id() != form.id())
        .skip(1)
        .filter_map(ElementRef::wrap)
        .take_while(|e| e.value().name() != "form")
        .filter(|e| matches!(e.value().name(), "input" | "select"))
        .collect()
}

fn read_input(input: ElementRef<'_>, fields: &mut BTreeMap<String, String>) {
    let attrs = input.value();
    let (Some(name), Some(value)) = (attrs.attr("name"), attrs.attr("value")) else {
        return;
    };
    let kind = attrs.attr("type").unwrap_or("text").trim().to_ascii_lowercase();
    match kind.as_str() {
        "hidden" | "text" => {
            log::debug!("found {kind:>8}: {name} = '{value}'");
            fields.insert(name.to_string(), value.to_string());
        }
        "password" => {
            log::debug!("found password: {name}");
            fields.insert(name.to_string(), value.to_string());
        }
        "radio" => {
            if attrs.attr("checked").is_some() {
                log::debug!("found    radio: {name} = '{value}' (checked)");
                fields.insert(name.to_string(), value.to_string());
            } else if !fields.contains_key(name) {
                log::debug!("found    radio: {name} = '{value}'");
                fields.insert(name.to_string(), value.to_string());
            }
        }
        _ => {}
    }
}

fn read_select(select: ElementRef<'_>, fields: &mut BTreeMap<String, String>) -> Result<()> {
    let Some(name) = select.value().attr("name") else {
        return Ok(());
    };
    let options: Vec<ElementRef<'_>> = select.select(option_selector()).collect();
    let chosen = options
        .iter()
        .find(|o| o.value().attr("selected").is_some())
        .or_else(|| options.first())
        .ok_or_else(|| KontoError::SelectWithoutOptions(name.to_string()))?;

    let value = match chosen.value().attr("value") {
        Some(v) => v.to_string(),
        None => chosen.text().collect::<String>().trim().to_string(),
    };
    log::debug!("found   select: {name} = '{value}'");
    fields.insert(name.to_string(), value);
    Ok(())
}
