//! Language-specific analyzer implementations.

mod ecmascript;
mod go;
mod java;
mod javascript;
mod python;
mod typescript;

pub use go::GoAnalyzer;
pub use java::JavaAnalyzer;
pub use javascript::JavaScriptAnalyzer;
pub use python::PythonAnalyzer;
pub use typescript::TypeScriptAnalyzer;

use std::path::{Component, Path};

use super::traits::ModuleLookup;
use crate::scanner::Language;

/// Render a relative path with `/` separators on every platform.
pub(crate) fn display_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Strip a recognised source extension from the last path segment.
pub(super) fn strip_extension(path: &str) -> &str {
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let split = name_start + dot;
            if Language::from_extension(&path[split + 1..]).is_some() {
                &path[..split]
            } else {
                path
            }
        }
        _ => path,
    }
}

/// The single module whose name ends with `specifier` at a `sep` boundary.
///
/// Returns `None` when no module or more than one module matches.
pub(super) fn unique_suffix_match(
    modules: &dyn ModuleLookup,
    specifier: &str,
    sep: char,
) -> Option<String> {
    if specifier.is_empty() {
        return None;
    }
    let mut found = modules.module_names().into_iter().filter(|m| {
        m.strip_suffix(specifier)
            .is_some_and(|prefix| prefix.ends_with(sep))
    });
    let first = found.next()?;
    match found.next() {
        Some(_) => None,
        None => Some(first.to_string()),
    }
}
