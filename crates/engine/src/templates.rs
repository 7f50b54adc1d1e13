//! Message template cache.
//!
//! User-visible prose is authored as parametric templates in the game
//! message catalogue. Templates substitute `{name}` scalar tokens and
//! `[array]` list tokens. A missing template falls back to the literal
//! default supplied at the call site, so a half-seeded catalogue never
//! breaks gameplay.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::infrastructure::ports::MessageRepo;

/// A substitution value: a scalar for `{key}` or a list for `[key]`.
pub enum TemplateValue {
    Scalar(String),
    List(Vec<String>),
}

impl TemplateValue {
    pub fn scalar(value: impl Into<String>) -> TemplateValue {
        TemplateValue::Scalar(value.into())
    }

    pub fn list(values: Vec<String>) -> TemplateValue {
        TemplateValue::List(values)
    }
}

pub struct TemplateCache {
    repo: Arc<dyn MessageRepo>,
    templates: RwLock<HashMap<String, String>>,
}

impl TemplateCache {
    /// Load the catalogue up front. A repository failure leaves the cache
    /// empty; call sites then render their literal defaults.
    pub async fn load(repo: Arc<dyn MessageRepo>) -> TemplateCache {
        let templates = match repo.all_game_messages().await {
            Ok(messages) => messages.into_iter().collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load game messages, using defaults");
                HashMap::new()
            }
        };
        TemplateCache {
            repo,
            templates: RwLock::new(templates),
        }
    }

    /// Render a template by key, substituting the given values. An unknown
    /// key is fetched on demand once, then the default is used.
    pub async fn render(
        &self,
        key: &str,
        default: &str,
        values: &[(&str, TemplateValue)],
    ) -> String {
        let template = match self.lookup(key).await {
            Some(t) => t,
            None => default.to_string(),
        };
        substitute(&template, values)
    }

    /// The raw catalogue, for the `gameMessages` push.
    pub async fn all(&self) -> Vec<(String, String)> {
        let templates = self.templates.read().await;
        let mut all: Vec<(String, String)> = templates
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all.sort();
        all
    }

    async fn lookup(&self, key: &str) -> Option<String> {
        {
            let templates = self.templates.read().await;
            if let Some(t) = templates.get(key) {
                return Some(t.clone());
            }
        }
        // On-demand reload covers templates added after startup.
        match self.repo.all_game_messages().await {
            Ok(messages) => {
                let mut templates = self.templates.write().await;
                for (k, v) in messages {
                    templates.entry(k).or_insert(v);
                }
                templates.get(key).cloned()
            }
            Err(_) => None,
        }
    }
}

fn substitute(template: &str, values: &[(&str, TemplateValue)]) -> String {
    let mut out = template.to_string();
    for (key, value) in values {
        match value {
            TemplateValue::Scalar(s) => {
                out = out.replace(&format!("{{{key}}}"), s);
            }
            TemplateValue::List(items) => {
                out = out.replace(&format!("[{key}]"), &items.join(", "));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{MockMessageRepo, RepoError};

    fn repo_with(messages: Vec<(String, String)>) -> Arc<dyn MessageRepo> {
        let mut repo = MockMessageRepo::new();
        repo.expect_all_game_messages()
            .returning(move || Ok(messages.clone()));
        Arc::new(repo)
    }

    #[test]
    fn substitutes_scalars_and_lists() {
        let rendered = substitute(
            "{name} left to {direction}. Exits: [exits]",
            &[
                ("name", TemplateValue::scalar("Wren")),
                ("direction", TemplateValue::scalar("the east")),
                (
                    "exits",
                    TemplateValue::list(vec!["N".to_string(), "E".to_string()]),
                ),
            ],
        );
        assert_eq!(rendered, "Wren left to the east. Exits: N, E");
    }

    #[tokio::test]
    async fn renders_catalogue_template_when_present() {
        let cache = TemplateCache::load(repo_with(vec![(
            "wall_collision".to_string(),
            "{name} walks into a wall.".to_string(),
        )]))
        .await;
        let rendered = cache
            .render(
                "wall_collision",
                "You cannot go that way.",
                &[("name", TemplateValue::scalar("Wren"))],
            )
            .await;
        assert_eq!(rendered, "Wren walks into a wall.");
    }

    #[tokio::test]
    async fn falls_back_to_default_when_missing() {
        let cache = TemplateCache::load(repo_with(vec![])).await;
        let rendered = cache
            .render("nonexistent", "You cannot go that way.", &[])
            .await;
        assert_eq!(rendered, "You cannot go that way.");
    }

    #[tokio::test]
    async fn survives_repository_failure() {
        let mut repo = MockMessageRepo::new();
        repo.expect_all_game_messages()
            .returning(|| Err(RepoError::Database("down".to_string())));
        let cache = TemplateCache::load(Arc::new(repo)).await;
        let rendered = cache.render("anything", "fallback", &[]).await;
        assert_eq!(rendered, "fallback");
    }
}
