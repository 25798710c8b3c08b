//! Package manifest (`AppxManifest.xml`) reading.
//!
//! Only the handful of fields needed to describe a packaged program are
//! extracted, with a plain text scan rather than a full XML parser.
//! Indirect `ms-resource:` strings are handed to a [`ResourceLoader`] as a
//! `@{<install dir>\resources.pri?ms-resource://<identity>/Resources/<key>}`
//! source and read as empty when it cannot resolve them.

use std::fs;
use std::path::Path;
use wintrack_core::PackageMetadata;

/// File name of the manifest inside a package install directory.
pub const MANIFEST_FILE_NAME: &str = "AppxManifest.xml";

const RESOURCE_PREFIX: &str = "ms-resource:";

/// Resolves an indirect resource source to its string.
pub type ResourceLoader<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Read the package metadata of an install directory.
///
/// Returns `None` when the directory holds no readable manifest.
pub fn read_package_metadata(install_dir: &Path, load: ResourceLoader<'_>) -> Option<PackageMetadata> {
    let content = fs::read_to_string(install_dir.join(MANIFEST_FILE_NAME)).ok()?;
    parse_manifest(&content, install_dir, load)
}

/// Extract display name, executable and logo from manifest text.
///
/// The executable comes from the first `<Application>` element. The logo
/// prefers the application's `Square44x44Logo` over the package `<Logo>`.
pub fn parse_manifest(content: &str, install_dir: &Path, load: ResourceLoader<'_>) -> Option<PackageMetadata> {
    start_tag(content, "Package")?;

    let identity = start_tag(content, "Identity")
        .and_then(|(start, end)| attribute(&content[start..end], "Name"))
        .map(str::trim)
        .unwrap_or_default();
    let value = |raw: &str| resolve(&unescape(raw), identity, install_dir, load);

    let properties = element_body(content, "Properties").unwrap_or_default();
    let display_name = element_body(properties, "DisplayName").map(value).unwrap_or_default();
    let package_logo = element_body(properties, "Logo").map(value);

    let (executable, app_logo) = match start_tag(content, "Application") {
        Some((start, end)) => {
            let tag = &content[start..end];
            let body = element_body(content, "Application").unwrap_or_default();
            (
                attribute(tag, "Executable").map(value).unwrap_or_default(),
                attribute(body, "Square44x44Logo").map(value),
            )
        }
        None => (String::new(), None),
    };

    let logo = app_logo
        .filter(|logo| !logo.is_empty())
        .or(package_logo)
        .filter(|logo| !logo.is_empty());

    Some(PackageMetadata {
        display_name,
        executable,
        logo,
    })
}

/// Source string for an indirect resource of a package.
pub fn indirect_source(install_dir: &Path, identity: &str, resource: &str) -> String {
    format!(
        "@{{{}\\resources.pri?ms-resource://{}/Resources/{}}}",
        install_dir.display(),
        identity,
        resource
    )
}

/// Replace a resource reference with its loaded string.
fn resolve(value: &str, identity: &str, install_dir: &Path, load: ResourceLoader<'_>) -> String {
    match value.strip_prefix(RESOURCE_PREFIX) {
        Some(resource) if !identity.is_empty() => {
            load(&indirect_source(install_dir, identity, resource)).unwrap_or_default()
        }
        Some(_) => String::new(),
        None => value.to_string(),
    }
}

fn unescape(value: &str) -> String {
    value
        .trim()
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Byte span of the first start tag `<name ...>`, brackets included.
///
/// Longer names sharing the prefix (`<Applications>`) are skipped.
fn start_tag(content: &str, name: &str) -> Option<(usize, usize)> {
    let open = format!("<{}", name);
    let mut offset = 0;
    while let Some(found) = content[offset..].find(&open) {
        let start = offset + found;
        let after = start + open.len();
        match content[after..].chars().next() {
            Some(c) if c == '>' || c == '/' || c.is_whitespace() => {
                let end = content[after..].find('>')? + after + 1;
                return Some((start, end));
            }
            _ => offset = after,
        }
    }
    None
}

/// Content of the first `name` element. Empty for self-closing tags.
fn element_body<'a>(content: &'a str, name: &str) -> Option<&'a str> {
    let (start, end) = start_tag(content, name)?;
    if content[start..end].ends_with("/>") {
        return Some("");
    }
    let close = format!("</{}>", name);
    let len = content[end..].find(&close)?;
    Some(&content[end..end + len])
}

/// Value of the first `name="..."` attribute in `content`.
fn attribute<'a>(content: &'a str, name: &str) -> Option<&'a str> {
    let mut offset = 0;
    while let Some(found) = content[offset..].find(name) {
        let start = offset + found;
        let after_space = content[..start].chars().next_back().is_some_and(char::is_whitespace);
        let rest = content[start + name.len()..].trim_start();
        if let (true, Some(rest)) = (after_space, rest.strip_prefix('=')) {
            let rest = rest.trim_start();
            let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
            let value = &rest[1..];
            let end = value.find(quote)?;
            return Some(&value[..end]);
        }
        offset = start + name.len();
    }
    None
}
