//! Page templates with `{{slot}}` placeholders.
//!
//! Slot values are inserted verbatim; callers escape what they pass in.

use crate::domain::{ExplorerConfig, GatewayError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Template names, each backed by `<name>.html`.
pub const TEMPLATE_NAMES: [&str; 9] = [
    "base", "error", "index", "tx", "address", "block", "blocks", "mempool", "sendtx",
];

fn embedded(name: &str) -> Option<&'static str> {
    Some(match name {
        "base" => include_str!("../../templates/base.html"),
        "error" => include_str!("../../templates/error.html"),
        "index" => include_str!("../../templates/index.html"),
        "tx" => include_str!("../../templates/tx.html"),
        "address" => include_str!("../../templates/address.html"),
        "block" => include_str!("../../templates/block.html"),
        "blocks" => include_str!("../../templates/blocks.html"),
        "mempool" => include_str!("../../templates/mempool.html"),
        "sendtx" => include_str!("../../templates/sendtx.html"),
        _ => return None,
    })
}

/// Drop leading indentation and line breaks.
pub fn minify(source: &str) -> String {
    source.lines().map(str::trim_start).collect()
}

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Text(String),
    Slot(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Template {
    pieces: Vec<Piece>,
}

impl Template {
    fn parse(name: &str, source: &str) -> Result<Self, GatewayError> {
        let mut pieces = Vec::new();
        let mut rest = source;
        while let Some(start) = rest.find("{{") {
            if start > 0 {
                pieces.push(Piece::Text(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| {
                GatewayError::Template(format!("{}: unterminated placeholder", name))
            })?;
            let slot = after[..end].trim();
            if slot.is_empty() || !slot.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(GatewayError::Template(format!(
                    "{}: bad placeholder '{}'",
                    name, slot
                )));
            }
            pieces.push(Piece::Slot(slot.to_string()));
            rest = &after[end + 2..];
        }
        if !rest.is_empty() {
            pieces.push(Piece::Text(rest.to_string()));
        }
        Ok(Self { pieces })
    }

    fn render(&self, slots: &[(&str, String)]) -> String {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Text(t) => out.push_str(t),
                Piece::Slot(s) => {
                    if let Some((_, v)) = slots.iter().find(|(k, _)| k == s) {
                        out.push_str(v);
                    }
                }
            }
        }
        out
    }
}

/// One loaded generation of every template.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    templates: HashMap<&'static str, Template>,
}

impl TemplateSet {
    /// Load every template from `dir` when given, falling back to the
    /// embedded copy for files the directory lacks.
    pub fn load(dir: Option<&Path>, minified: bool) -> Result<Self, GatewayError> {
        let mut templates = HashMap::with_capacity(TEMPLATE_NAMES.len());
        for name in TEMPLATE_NAMES {
            let source = match dir.map(|d| d.join(format!("{}.html", name))) {
                Some(path) if path.is_file() => std::fs::read_to_string(&path)
                    .map_err(|e| GatewayError::Template(format!("{}: {}", path.display(), e)))?,
                _ => embedded(name)
                    .ok_or_else(|| GatewayError::Template(format!("{}: no template", name)))?
                    .to_string(),
            };
            let source = if minified { minify(&source) } else { source };
            templates.insert(name, Template::parse(name, &source)?);
        }
        Ok(Self { templates })
    }

    /// Render `name` into the `base` layout.
    pub fn render_page(&self, name: &str, title: &str, slots: &[(&str, String)]) -> Result<String, GatewayError> {
        let page = self
            .templates
            .get(name)
            .ok_or_else(|| GatewayError::Template(format!("unknown template '{}'", name)))?;
        let base = self
            .templates
            .get("base")
            .ok_or_else(|| GatewayError::Template("unknown template 'base'".into()))?;
        let content = page.render(slots);
        Ok(base.render(&[
            ("title", super::format::escape_html(title)),
            ("content", content),
            ("version", crate::VERSION.to_string()),
        ]))
    }
}

/// Where HTML handlers get their templates from.
///
/// In debug mode the set is rebuilt on each request so edits show up
/// without a restart; otherwise one minified set is shared read-only.
#[derive(Debug, Clone)]
pub enum TemplateStore {
    Static(Arc<TemplateSet>),
    Reload(Option<PathBuf>),
}

impl TemplateStore {
    pub fn new(config: &ExplorerConfig, debug: bool) -> Result<Self, GatewayError> {
        let dir = config.templates_dir.clone();
        if debug {
            // fail at startup rather than on the first page
            TemplateSet::load(dir.as_deref(), false)?;
            Ok(Self::Reload(dir))
        } else {
            Ok(Self::Static(Arc::new(TemplateSet::load(dir.as_deref(), true)?)))
        }
    }

    pub fn current(&self) -> Result<Arc<TemplateSet>, GatewayError> {
        match self {
            Self::Static(set) => Ok(Arc::clone(set)),
            Self::Reload(dir) => Ok(Arc::new(TemplateSet::load(dir.as_deref(), false)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minify_strips_indentation_and_newlines() {
        assert_eq!(minify("<p>\n    <b>x</b>\n</p>\n"), "<p><b>x</b></p>");
    }

    #[test]
    fn test_parse_and_render() {
        let t = Template::parse("t", "<h1>{{ title }}</h1>{{body}}{{missing}}").unwrap();
        let out = t.render(&[("title", "A".into()), ("body", "<p>b</p>".into())]);
        assert_eq!(out, "<h1>A</h1><p>b</p>");
    }

    #[test]
    fn test_parse_rejects_broken_placeholders() {
        assert!(matches!(
            Template::parse("t", "<p>{{oops</p>"),
            Err(GatewayError::Template(_))
        ));
        assert!(Template::parse("t", "{{a b}}").is_err());
    }

    #[test]
    fn test_embedded_set_renders_in_layout() {
        let set = TemplateSet::load(None, true).unwrap();
        let page = set
            .render_page("error", "Error <x>", &[("message", "boom".into())])
            .unwrap();
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<title>Error &lt;x&gt;</title>"));
        assert!(page.contains(r#"<p class="error">boom</p>"#));
        assert!(!page.contains('\n'));
        assert!(set.render_page("nope", "", &[]).is_err());
    }

    #[test]
    fn test_store_modes() {
        let cfg = ExplorerConfig::default();
        assert!(matches!(TemplateStore::new(&cfg, false).unwrap(), TemplateStore::Static(_)));
        let reload = TemplateStore::new(&cfg, true).unwrap();
        assert!(matches!(reload, TemplateStore::Reload(None)));
        assert!(reload.current().is_ok());
    }
}
