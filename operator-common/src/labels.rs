//! Label and annotation helpers, for marking resources with their provenance.

use kube::Resource;
use serde::Serialize;
use std::collections::BTreeMap;

/// Annotation storing the canonical form of the resource, as it was desired when created.
pub const ANNOTATION_CREATION_STRING: &str = "edgeplane.io/creation-string";

const MAX_LABEL_LEN: usize = 63;
const MAX_DNS_DOMAIN_LEN: usize = 253;

/// Make a value usable as label value: `[a-z0-9-_.]`, starting and ending alphanumeric.
pub fn sanitize_label_value(value: &str) -> String {
    sanitize(value, MAX_LABEL_LEN, |c| {
        c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'
    })
}

/// Make a value usable as DNS label: `[a-z0-9-]`, starting and ending alphanumeric.
pub fn sanitize_dns_value(value: &str) -> String {
    sanitize(value, MAX_LABEL_LEN, |c| c.is_ascii_alphanumeric() || c == '-')
}

/// Make a value usable as DNS subdomain: like [`sanitize_dns_value`], but allowing dots.
pub fn sanitize_dns_domain(value: &str) -> String {
    sanitize(value, MAX_DNS_DOMAIN_LEN, |c| {
        c.is_ascii_alphanumeric() || c == '-' || c == '.'
    })
}

fn sanitize<F>(value: &str, max: usize, allowed: F) -> String
where
    F: Fn(char) -> bool,
{
    let value: String = value
        .to_lowercase()
        .chars()
        .filter(|c| allowed(*c))
        .collect();

    let value = trim_non_alphanumeric(&value);
    // everything is ascii at this point
    let value = &value[..value.len().min(max)];
    trim_non_alphanumeric(value).to_string()
}

fn trim_non_alphanumeric(value: &str) -> &str {
    value.trim_matches(|c: char| !c.is_ascii_alphanumeric())
}

/// Render a label selector matching all the labels.
pub fn selector<'a, I>(labels: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    labels
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Check if the resource carries all the provided labels, with the same values.
pub fn has_labels<R: Resource>(resource: &R, labels: &BTreeMap<String, String>) -> bool {
    let actual = resource.meta().labels.as_ref();
    labels
        .iter()
        .all(|(k, v)| actual.and_then(|actual| actual.get(k)) == Some(v))
}

/// The creation string stored on the resource.
pub fn creation_string<R: Resource>(resource: &R) -> Option<&str> {
    resource
        .meta()
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(ANNOTATION_CREATION_STRING))
        .map(String::as_str)
}

/// Store the canonical JSON form of the resource in its creation string annotation.
///
/// Any previous creation string is not part of the stored form.
pub fn with_creation_string<R>(mut resource: R) -> Result<R, serde_json::Error>
where
    R: Resource + Serialize,
{
    let meta = resource.meta_mut();
    if let Some(annotations) = meta.annotations.as_mut() {
        annotations.remove(ANNOTATION_CREATION_STRING);
        if annotations.is_empty() {
            meta.annotations = None;
        }
    }

    let value = serde_json::to_string(&resource)?;

    resource
        .meta_mut()
        .annotations
        .get_or_insert_with(Default::default)
        .insert(ANNOTATION_CREATION_STRING.into(), value);

    Ok(resource)
}

/// Compare two resources by name and creation string.
///
/// A resource without a creation string is never equal to anything.
pub fn creation_string_equals<R: Resource>(a: &R, b: &R) -> bool {
    if a.meta().name != b.meta().name {
        return false;
    }
    match (creation_string(a), creation_string(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
