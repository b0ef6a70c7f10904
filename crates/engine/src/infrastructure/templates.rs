//! Filesystem template source.
//!
//! Templates are markdown files under
//! `<root>/<experience>/templates/<entity_type>/<template_id>.md`:
//! a `---`-fenced frontmatter block of `key: value` lines followed by
//! `## Section` bodies. Values parse as JSON scalars where they can
//! (`true`, `3`, `1.5`, `null`, quoted strings) and fall back to plain
//! strings. The core never writes to this tree.

use std::path::PathBuf;

use async_trait::async_trait;
use regex_lite::Regex;
use serde_json::{Map, Value};

use super::ports::{RawTemplate, TemplateError, TemplateSource};

pub struct FsTemplateSource {
    root: PathBuf,
}

impl FsTemplateSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn template_path(
        &self,
        experience: &str,
        entity_type: &str,
        template_id: &str,
    ) -> Result<PathBuf, TemplateError> {
        for segment in [experience, entity_type, template_id] {
            if segment.is_empty()
                || segment == "."
                || segment == ".."
                || segment.contains('/')
                || segment.contains('\\')
            {
                return Err(TemplateError::Io(format!(
                    "invalid template path segment: {segment:?}"
                )));
            }
        }
        Ok(self
            .root
            .join(experience)
            .join("templates")
            .join(entity_type)
            .join(format!("{template_id}.md")))
    }
}

#[async_trait]
impl TemplateSource for FsTemplateSource {
    async fn read_template(
        &self,
        experience: &str,
        entity_type: &str,
        template_id: &str,
    ) -> Result<RawTemplate, TemplateError> {
        let path = self.template_path(experience, entity_type, template_id)?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TemplateError::NotFound {
                    entity_type: entity_type.to_string(),
                    template_id: template_id.to_string(),
                })
            }
            Err(e) => return Err(TemplateError::Io(e.to_string())),
        };
        parse_template(template_id, &text)
    }
}

/// Split a template file into frontmatter fields and named sections.
pub fn parse_template(template_id: &str, text: &str) -> Result<RawTemplate, TemplateError> {
    let (frontmatter_text, body) = split_frontmatter(template_id, text)?;

    let mut frontmatter = Map::new();
    for (lineno, line) in frontmatter_text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(TemplateError::Parse {
                template_id: template_id.to_string(),
                reason: format!("frontmatter line {} has no key", lineno + 1),
            });
        };
        frontmatter.insert(key.trim().to_string(), parse_scalar(value.trim()));
    }

    Ok(RawTemplate {
        frontmatter,
        sections: split_sections(body),
    })
}

fn split_frontmatter<'t>(
    template_id: &str,
    text: &'t str,
) -> Result<(&'t str, &'t str), TemplateError> {
    let rest = match text.strip_prefix("---") {
        Some(rest) => rest,
        // No frontmatter fence: the whole file is body.
        None => return Ok(("", text)),
    };
    match rest.split_once("\n---") {
        Some((frontmatter, body)) => Ok((frontmatter, body)),
        None => Err(TemplateError::Parse {
            template_id: template_id.to_string(),
            reason: "unterminated frontmatter fence".to_string(),
        }),
    }
}

fn split_sections(body: &str) -> Vec<(String, String)> {
    let heading = Regex::new(r"(?m)^#{1,3}\s+(.+)$").expect("static regex");
    let mut sections = Vec::new();
    let mut current: Option<(String, usize)> = None;

    for found in heading.find_iter(body) {
        if let Some((name, start)) = current.take() {
            sections.push((name, body[start..found.start()].trim().to_string()));
        }
        let name = body[found.start()..found.end()]
            .trim_start_matches('#')
            .trim()
            .to_string();
        current = Some((name, found.end()));
    }
    if let Some((name, start)) = current {
        sections.push((name, body[start..].trim().to_string()));
    }
    sections
}

/// Interpret a frontmatter value as the narrowest JSON scalar it parses as.
fn parse_scalar(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" | "~" | "" => return Value::Null,
        _ => {}
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    let unquoted = raw
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .unwrap_or(raw);
    Value::String(unquoted.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BOTTLE: &str = r#"---
semantic_name: Mysterious Bottle
collectible: true
weight: 0.3
media_ref: "assets/bottle.glb"
---

## Description

A sea-worn bottle with a rolled note inside.

## Lore

Nobody remembers who corked it.
"#;

    #[test]
    fn parses_frontmatter_scalars() {
        let raw = parse_template("bottle", BOTTLE).expect("parse");
        assert_eq!(raw.frontmatter["semantic_name"], json!("Mysterious Bottle"));
        assert_eq!(raw.frontmatter["collectible"], json!(true));
        assert_eq!(raw.frontmatter["weight"], json!(0.3));
        assert_eq!(raw.frontmatter["media_ref"], json!("assets/bottle.glb"));
    }

    #[test]
    fn parses_named_sections_in_order() {
        let raw = parse_template("bottle", BOTTLE).expect("parse");
        assert_eq!(raw.sections.len(), 2);
        assert_eq!(raw.sections[0].0, "Description");
        assert_eq!(
            raw.sections[0].1,
            "A sea-worn bottle with a rolled note inside."
        );
        assert_eq!(raw.sections[1].0, "Lore");
    }

    #[test]
    fn file_without_frontmatter_is_all_body() {
        let raw = parse_template("plain", "## Notes\n\njust text\n").expect("parse");
        assert!(raw.frontmatter.is_empty());
        assert_eq!(raw.sections[0].0, "Notes");
    }

    #[test]
    fn unterminated_fence_is_a_parse_error() {
        let err = parse_template("broken", "---\nname: x\n").expect_err("must fail");
        assert!(matches!(err, TemplateError::Parse { .. }));
    }

    #[test]
    fn keyless_frontmatter_line_is_a_parse_error() {
        let err = parse_template("broken", "---\njust words\n---\n").expect_err("must fail");
        assert!(matches!(err, TemplateError::Parse { .. }));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = FsTemplateSource::new(dir.path());
        let err = source
            .read_template("wylding-woods", "items", "ghost")
            .await
            .expect_err("must fail");
        assert!(matches!(err, TemplateError::NotFound { .. }));
    }

    #[tokio::test]
    async fn reads_from_the_expected_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let items = dir.path().join("wylding-woods/templates/items");
        tokio::fs::create_dir_all(&items).await.expect("mkdir");
        tokio::fs::write(items.join("bottle.md"), BOTTLE)
            .await
            .expect("write");

        let source = FsTemplateSource::new(dir.path());
        let raw = source
            .read_template("wylding-woods", "items", "bottle")
            .await
            .expect("read");
        assert_eq!(raw.frontmatter["collectible"], json!(true));
    }
}
