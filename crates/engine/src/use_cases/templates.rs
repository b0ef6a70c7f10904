//! Template resolution and caching.
//!
//! Instances persist only their own state; this resolver decorates them
//! with the immutable defaults of the template they reference. Parsed
//! templates are cached process-wide keyed by
//! `(experience, entity_type, template_id)` until an admin flushes the
//! cache.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};

use wayfinder_domain::instance;

use crate::infrastructure::ports::{RawTemplate, TemplateError, TemplateSource};

type CacheKey = (String, String, String);

pub struct TemplateResolver {
    source: Arc<dyn TemplateSource>,
    cache: DashMap<CacheKey, Arc<Map<String, Value>>>,
}

impl TemplateResolver {
    pub fn new(source: Arc<dyn TemplateSource>) -> Self {
        Self {
            source,
            cache: DashMap::new(),
        }
    }

    /// Merge template defaults under an instance.
    ///
    /// The instance is normalized (legacy `id`/`type` keys rewritten) and
    /// always comes back with `instance_id`, `template_id`, and a `state`
    /// sub-map. A missing template is not an error: the normalized instance
    /// is returned as-is. A malformed template is an operational error; it
    /// is logged and never propagated into state.
    pub async fn merge(&self, experience: &str, entity_type: &str, instance: &Value) -> Value {
        let normalized = instance::normalize(instance);
        let Some(template_id) = normalized
            .get("template_id")
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            return instance::merge_template(&Map::new(), &normalized);
        };

        match self.fields(experience, entity_type, &template_id).await {
            Ok(fields) => instance::merge_template(&fields, &normalized),
            Err(TemplateError::NotFound { .. }) => {
                tracing::debug!(
                    experience = %experience,
                    entity_type = %entity_type,
                    template_id = %template_id,
                    "Template not found, returning instance unchanged"
                );
                instance::merge_template(&Map::new(), &normalized)
            }
            Err(e) => {
                tracing::warn!(
                    experience = %experience,
                    entity_type = %entity_type,
                    template_id = %template_id,
                    error = %e,
                    "Template unusable, returning instance unchanged"
                );
                instance::merge_template(&Map::new(), &normalized)
            }
        }
    }

    /// Drop every cached template. Returns how many entries were evicted.
    pub fn flush(&self) -> usize {
        let evicted = self.cache.len();
        self.cache.clear();
        tracing::info!(evicted, "Template cache flushed");
        evicted
    }

    async fn fields(
        &self,
        experience: &str,
        entity_type: &str,
        template_id: &str,
    ) -> Result<Arc<Map<String, Value>>, TemplateError> {
        let key = (
            experience.to_string(),
            entity_type.to_string(),
            template_id.to_string(),
        );
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.clone());
        }

        let raw = self
            .source
            .read_template(experience, entity_type, template_id)
            .await?;
        let fields = Arc::new(template_fields(raw));
        self.cache.insert(key, fields.clone());
        Ok(fields)
    }
}

/// Flatten a parsed template into default fields: the frontmatter, plus the
/// first body section as `description` when the frontmatter has none.
fn template_fields(raw: RawTemplate) -> Map<String, Value> {
    let mut fields = raw.frontmatter;
    if !fields.contains_key("description") {
        let description = raw
            .sections
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("description"))
            .or_else(|| raw.sections.first());
        if let Some((_, body)) = description {
            fields.insert("description".to_string(), Value::String(body.clone()));
        }
    }
    fields
}
