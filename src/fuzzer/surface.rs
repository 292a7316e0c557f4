// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Input-surface discovery: HTML forms on crawled pages and API endpoints
//! seen in captured network traffic.

use crate::driver::{resolve_url, url_path, NetworkExchange};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use url::Url;

/// Input types that never carry free text
const NON_INJECTABLE_TYPES: &[&str] = &[
    "hidden", "submit", "button", "image", "reset", "checkbox", "radio", "file", "color", "range",
];

/// Benign value for required fields that are not under test
pub const FILLER_VALUE: &str = "test";

/// Form input field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FormInput {
    pub name: String,
    pub input_type: String,
    pub required: bool,
    pub max_length: Option<usize>,
    /// Default value rendered by the page
    pub value: Option<String>,
    /// Selector addressing this control inside its form
    pub selector: String,
}

impl FormInput {
    /// Free-text controls worth injecting into
    pub fn is_injectable(&self) -> bool {
        !NON_INJECTABLE_TYPES.contains(&self.input_type.as_str()) && self.input_type != "select"
    }
}

/// Discovered form on a page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredForm {
    /// Path of the page that renders the form
    pub page_path: String,
    pub action: String,
    pub method: String,
    /// Selector of the control that submits the form
    pub submit_selector: String,
    pub inputs: Vec<FormInput>,
}

impl DiscoveredForm {
    /// Hash signature for deduplication across pages
    pub fn signature(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.action.hash(&mut hasher);
        self.method.hash(&mut hasher);

        let mut names: Vec<_> = self.inputs.iter().map(|i| &i.name).collect();
        names.sort();
        for name in names {
            name.hash(&mut hasher);
        }

        hasher.finish()
    }

    pub fn injectable_inputs(&self) -> impl Iterator<Item = &FormInput> {
        self.inputs.iter().filter(|i| i.is_injectable())
    }
}

fn attr_selector(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Extract forms and their inputs from a page
pub fn extract_forms(html: &str, page_url: &str) -> Vec<DiscoveredForm> {
    let document = Html::parse_document(html);
    let (Ok(form_selector), Ok(input_selector), Ok(submit_selector), Ok(button_selector)) = (
        Selector::parse("form"),
        Selector::parse("input, textarea, select"),
        Selector::parse("input[type=submit], button[type=submit], input[type=image]"),
        Selector::parse("button"),
    ) else {
        return Vec::new();
    };

    let mut forms = Vec::new();
    let mut action_counts: BTreeMap<String, usize> = BTreeMap::new();

    for (index, form) in document.select(&form_selector).enumerate() {
        let raw_action = form.value().attr("action").unwrap_or("").trim().to_string();
        let action = if raw_action.is_empty() {
            page_url.to_string()
        } else {
            resolve_url(page_url, &raw_action)
        };
        let method = form.value().attr("method").unwrap_or("GET").to_uppercase();

        let form_selector = match form.value().attr("id") {
            Some(id) if !id.is_empty() => format!("form[id=\"{}\"]", attr_selector(id)),
            _ if !raw_action.is_empty() => {
                let seen = action_counts.entry(raw_action.clone()).or_insert(0);
                *seen += 1;
                if *seen > 1 {
                    // ambiguous selector; later duplicates are unreachable
                    continue;
                }
                format!("form[action=\"{}\"]", attr_selector(&raw_action))
            }
            _ if index == 0 => "form".to_string(),
            _ => continue,
        };

        let submit = if form.select(&submit_selector).next().is_some() {
            format!("{} [type=\"submit\"]", form_selector)
        } else if form.select(&button_selector).next().is_some() {
            format!("{} button", form_selector)
        } else {
            form_selector.clone()
        };

        let inputs = form
            .select(&input_selector)
            .filter_map(|control| form_input(control, &form_selector))
            .collect();

        forms.push(DiscoveredForm {
            page_path: url_path(page_url),
            action,
            method,
            submit_selector: submit,
            inputs,
        });
    }

    forms
}

fn form_input(control: ElementRef<'_>, form_selector: &str) -> Option<FormInput> {
    let el = control.value();
    let name = el.attr("name").filter(|n| !n.is_empty())?;
    let input_type = match el.name() {
        "textarea" => "textarea".to_string(),
        "select" => "select".to_string(),
        _ => el.attr("type").unwrap_or("text").to_lowercase(),
    };
    Some(FormInput {
        name: name.to_string(),
        input_type,
        required: el.attr("required").is_some(),
        max_length: el.attr("maxlength").and_then(|m| m.trim().parse().ok()),
        value: el.attr("value").map(str::to_string),
        selector: format!("{} [name=\"{}\"]", form_selector, attr_selector(name)),
    })
}

/// API endpoint reconstructed from captured traffic
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpoint {
    pub method: String,
    /// Absolute URL without query string
    pub url: String,
    pub path: String,
    /// Query and body parameter names seen for this endpoint
    pub parameters: Vec<String>,
    pub content_type: Option<String>,
    /// Request body was JSON
    pub json_body: bool,
    pub observed: usize,
}

/// `/api/` path, non-GET method or JSON response
pub fn is_api_candidate(exchange: &NetworkExchange) -> bool {
    let path = url_path(&exchange.url);
    path.contains("/api/")
        || !exchange.method.eq_ignore_ascii_case("GET")
        || exchange
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.to_lowercase().contains("json"))
}

/// Group same-origin API traffic into endpoints, ordered by path then method
pub fn enumerate_api_endpoints(exchanges: &[NetworkExchange], base_url: &str) -> Vec<ApiEndpoint> {
    let origin = Url::parse(base_url).ok().map(|u| u.origin());
    let mut grouped: BTreeMap<(String, String), ApiEndpoint> = BTreeMap::new();
    let mut params: BTreeMap<(String, String), BTreeSet<String>> = BTreeMap::new();

    for exchange in exchanges.iter().filter(|e| is_api_candidate(e)) {
        let Ok(parsed) = Url::parse(&exchange.url) else {
            continue;
        };
        if origin.as_ref().is_some_and(|o| *o != parsed.origin()) {
            continue;
        }

        let method = exchange.method.to_uppercase();
        let path = parsed.path().to_string();
        let key = (path.clone(), method.clone());

        let mut base = parsed.clone();
        base.set_query(None);
        base.set_fragment(None);

        let json_body = exchange
            .request_body
            .as_deref()
            .is_some_and(|b| b.trim_start().starts_with('{'));

        let entry = grouped.entry(key.clone()).or_insert_with(|| ApiEndpoint {
            method,
            url: base.to_string(),
            path,
            parameters: Vec::new(),
            content_type: exchange.content_type.clone(),
            json_body,
            observed: 0,
        });
        entry.observed += 1;
        entry.json_body |= json_body;

        let names = params.entry(key).or_default();
        names.extend(parsed.query_pairs().map(|(k, _)| k.to_string()));
        if let Some(body) = exchange.request_body.as_deref() {
            names.extend(body_parameters(body));
        }
    }

    grouped
        .into_iter()
        .map(|(key, mut endpoint)| {
            endpoint.parameters = params.remove(&key).unwrap_or_default().into_iter().collect();
            endpoint
        })
        .collect()
}

/// Top-level keys of a JSON object body, or names of a urlencoded body
pub fn body_parameters(body: &str) -> Vec<String> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') {
        return match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        };
    }
    url::form_urlencoded::parse(trimmed.as_bytes())
        .map(|(k, _)| k.to_string())
        .filter(|k| !k.is_empty())
        .collect()
}
