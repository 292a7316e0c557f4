// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Form submission emulation shared by the non-browser drivers.
//!
//! Works on the serialized DOM of the current page: resolves what a click on a
//! selector would submit, merging default field values with pending fills.

use crate::errors::{DriverError, DriverResult};
use scraper::{ElementRef, Html, Selector};

/// A request produced by clicking an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub method: String,
    pub url: String,
    pub fields: Vec<(String, String)>,
}

impl Submission {
    /// URL with fields encoded as query for GET submissions
    pub fn get_url(&self) -> String {
        if self.fields.is_empty() {
            return self.url.clone();
        }
        match url::Url::parse(&self.url) {
            Ok(mut parsed) => {
                {
                    let mut pairs = parsed.query_pairs_mut();
                    for (name, value) in &self.fields {
                        pairs.append_pair(name, value);
                    }
                }
                parsed.to_string()
            }
            Err(_) => self.url.clone(),
        }
    }
}

fn parse_selector(selector: &str) -> DriverResult<Selector> {
    Selector::parse(selector).map_err(|_| DriverError::InvalidSelector {
        selector: selector.to_string(),
    })
}

/// Fail with `ElementNotFound` unless the selector matches in `html`
pub fn ensure_selector(html: &str, selector: &str) -> DriverResult<()> {
    let sel = parse_selector(selector)?;
    let document = Html::parse_document(html);
    if document.select(&sel).next().is_some() {
        Ok(())
    } else {
        Err(DriverError::ElementNotFound {
            selector: selector.to_string(),
        })
    }
}

/// Work out what clicking `selector` submits, `None` when the click does not navigate
pub fn resolve_click(
    html: &str,
    page_url: &str,
    selector: &str,
    fills: &[(String, String)],
) -> DriverResult<Option<Submission>> {
    let sel = parse_selector(selector)?;
    let document = Html::parse_document(html);
    let clicked = document
        .select(&sel)
        .next()
        .ok_or_else(|| DriverError::ElementNotFound {
            selector: selector.to_string(),
        })?;

    if clicked.value().name() == "a" {
        return Ok(clicked.value().attr("href").map(|href| Submission {
            method: "GET".to_string(),
            url: resolve(page_url, href),
            fields: Vec::new(),
        }));
    }

    let form = if clicked.value().name() == "form" {
        Some(clicked)
    } else {
        clicked
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "form")
    };

    let Some(form) = form else {
        return Ok(None);
    };

    let action = form
        .value()
        .attr("action")
        .filter(|a| !a.trim().is_empty())
        .map(|a| resolve(page_url, a))
        .unwrap_or_else(|| page_url.to_string());
    let method = form
        .value()
        .attr("method")
        .unwrap_or("GET")
        .to_uppercase();

    let mut fields = default_fields(form, clicked);

    for (fill_selector, value) in fills {
        let fill_sel = parse_selector(fill_selector)?;
        for target in document.select(&fill_sel) {
            let inside = target.ancestors().any(|a| a.id() == form.id());
            let Some(name) = target.value().attr("name") else {
                continue;
            };
            if !inside {
                continue;
            }
            match fields.iter_mut().find(|(n, _)| n == name) {
                Some(existing) => existing.1 = value.clone(),
                None => fields.push((name.to_string(), value.clone())),
            }
        }
    }

    Ok(Some(Submission {
        method,
        url: action,
        fields,
    }))
}

fn default_fields(form: ElementRef<'_>, clicked: ElementRef<'_>) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    let Ok(controls) = Selector::parse("input, textarea, select") else {
        return fields;
    };

    for control in form.select(&controls) {
        let el = control.value();
        let Some(name) = el.attr("name") else {
            continue;
        };
        let input_type = el.attr("type").unwrap_or("text").to_lowercase();

        let value = match el.name() {
            "textarea" => control.text().collect::<String>(),
            "select" => select_value(control),
            _ => match input_type.as_str() {
                "submit" | "button" | "image" | "reset" => {
                    if control.id() != clicked.id() {
                        continue;
                    }
                    el.attr("value").unwrap_or_default().to_string()
                }
                "checkbox" | "radio" => {
                    if el.attr("checked").is_none() {
                        continue;
                    }
                    el.attr("value").unwrap_or("on").to_string()
                }
                _ => el.attr("value").unwrap_or_default().to_string(),
            },
        };

        fields.push((name.to_string(), value));
    }

    fields
}

fn select_value(select: ElementRef<'_>) -> String {
    let Ok(options) = Selector::parse("option") else {
        return String::new();
    };
    let mut first = None;
    for option in select.select(&options) {
        let value = option
            .value()
            .attr("value")
            .map(str::to_string)
            .unwrap_or_else(|| option.text().collect::<String>());
        if option.value().attr("selected").is_some() {
            return value;
        }
        first.get_or_insert(value);
    }
    first.unwrap_or_default()
}

fn resolve(page_url: &str, target: &str) -> String {
    super::resolve_url(page_url, target)
}
