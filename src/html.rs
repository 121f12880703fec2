//! Expands one HTML template into one document per language.
//!
//! Templates reference bundles with placeholder tokens, `__LOCALE_BUNDLE_messages__` with the
//! default prefix. The target owning the first placeholder's bundles owns the document. For
//! every language that target has bundles for, each token is replaced verbatim by the content
//! of the `(bundle, language)` registry entry:
//!
//! ```html
//! <script>window.translations = __LOCALE_BUNDLE_messages__;</script>
//! ```
//!
//! One rendered document becomes the primary output at the template's own path: the active
//! language if the dev server knows one, otherwise the owning target's default language. Every
//! other language is placed at a sibling path with the language as its first segment
//! (`index.html` → `fr/index.html`).
//!
//! Rendering is all-or-nothing. Every placeholder must resolve for every language, and all of
//! them must come from the same build target, before any document is returned.

use crate::{
    addresser::BundleIdentity,
    config::{BundlerConfig, TargetConfig, TargetId},
    emit::AssetEmitter,
    error::BundlerError,
    registry::AssetRegistry,
    state::SharedState,
};
use regex::Regex;
use std::{collections::BTreeSet, ops::Range};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub name: String,
    pub span: Range<usize>,
}

#[derive(Debug, Clone)]
pub struct PlaceholderPattern {
    prefix: String,
    regex: Regex,
}

impl PlaceholderPattern {
    pub fn new(prefix: &str) -> Result<Self, BundlerError> {
        let regex = Regex::new(&format!(
            r"__{}_([A-Za-z0-9][A-Za-z0-9.\-]*)__",
            regex::escape(prefix)
        ))?;
        Ok(PlaceholderPattern {
            prefix: prefix.to_string(),
            regex,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn token(&self, name: &str) -> String {
        format!("__{}_{}__", self.prefix, name)
    }

    /// Placeholders in left-to-right order.
    pub fn find(&self, html: &str) -> Vec<Placeholder> {
        self.regex
            .captures_iter(html)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let name = caps.get(1)?;
                Some(Placeholder {
                    name: name.as_str().to_string(),
                    span: whole.range(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    /// `None` when the template had no placeholders.
    pub language: Option<String>,
    pub path: String,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlFanOut {
    pub primary: RenderedDocument,
    pub variants: Vec<RenderedDocument>,
}

impl HtmlFanOut {
    pub fn documents(&self) -> impl Iterator<Item = &RenderedDocument> {
        std::iter::once(&self.primary).chain(self.variants.iter())
    }

    /// Hands each language-qualified document to the emitter.
    pub async fn emit_variants(&self, emitter: &dyn AssetEmitter) -> Result<(), BundlerError> {
        for doc in self.variants.iter() {
            emitter
                .emit(doc.path.trim_start_matches('/'), &doc.html)
                .await?;
        }
        Ok(())
    }

    pub async fn emit_all(&self, emitter: &dyn AssetEmitter) -> Result<(), BundlerError> {
        emitter
            .emit(self.primary.path.trim_start_matches('/'), &self.primary.html)
            .await?;
        self.emit_variants(emitter).await
    }
}

/// Inserts `language` as the first segment of `path`.
pub fn language_path(path: &str, language: &str) -> String {
    let leading = if path.starts_with('/') { "/" } else { "" };
    format!("{leading}{language}/{}", path.trim_start_matches('/'))
}

#[derive(Debug, Clone)]
pub struct HtmlMultiplexer {
    state: SharedState,
    targets: Vec<TargetConfig>,
    pattern: PlaceholderPattern,
}

impl HtmlMultiplexer {
    pub fn new(
        state: SharedState,
        targets: Vec<TargetConfig>,
        prefix: &str,
    ) -> Result<Self, BundlerError> {
        Ok(HtmlMultiplexer {
            state,
            targets,
            pattern: PlaceholderPattern::new(prefix)?,
        })
    }

    pub fn from_config(state: SharedState, config: &BundlerConfig) -> Result<Self, BundlerError> {
        Self::new(
            state,
            config.targets.clone(),
            &config.html.placeholder_prefix,
        )
    }

    pub fn pattern(&self) -> &PlaceholderPattern {
        &self.pattern
    }

    /// Renders `html` once per language of the owning target. `document_path` is where the template itself
    /// is served or emitted.
    pub fn fan_out(&self, html: &str, document_path: &str) -> Result<HtmlFanOut, BundlerError> {
        let placeholders = self.pattern.find(html);
        let Some(first) = placeholders.first() else {
            return Ok(HtmlFanOut {
                primary: RenderedDocument {
                    language: None,
                    path: document_path.to_string(),
                    html: html.to_string(),
                },
                variants: Vec::new(),
            });
        };

        let registry = self.state.registry();
        // The first placeholder decides which target the document belongs to
        let Some(owner) = registry.owner_of(&first.name).cloned() else {
            let language = registry
                .languages()
                .iter()
                .next()
                .cloned()
                .unwrap_or_else(|| "<no languages registered>".to_string());
            return Err(BundlerError::Resolution {
                bundle: first.name.clone(),
                language,
            });
        };
        let languages = registry.target_languages(&owner);

        let mut rendered = Vec::with_capacity(languages.len());
        for language in languages.iter() {
            let doc = render_language(&registry, html, &placeholders, language, &owner)?;
            rendered.push((language.clone(), doc));
        }
        drop(registry);
        let default = self.default_language(&owner, &languages)?;

        let mut primary = None;
        let mut variants = Vec::with_capacity(rendered.len().saturating_sub(1));
        for (language, html) in rendered {
            if language == default {
                primary = Some(RenderedDocument {
                    path: document_path.to_string(),
                    language: Some(language),
                    html,
                });
            } else {
                variants.push(RenderedDocument {
                    path: language_path(document_path, &language),
                    language: Some(language),
                    html,
                });
            }
        }
        let primary = primary.ok_or_else(|| {
            BundlerError::InvariantViolation(format!(
                "default language '{default}' was not rendered"
            ))
        })?;

        tracing::debug!(
            "[HtmlMultiplexer] {} rendered for {} language(s), primary={}",
            document_path,
            variants.len() + 1,
            default
        );
        Ok(HtmlFanOut { primary, variants })
    }

    /// Only the document for the active (or default) language.
    pub fn render_primary(&self, html: &str, document_path: &str) -> Result<String, BundlerError> {
        Ok(self.fan_out(html, document_path)?.primary.html)
    }

    fn default_language(
        &self,
        owner: &TargetId,
        languages: &BTreeSet<String>,
    ) -> Result<String, BundlerError> {
        if let Some(active) = self.state.active_language() {
            if languages.contains(&active) {
                return Ok(active);
            }
            tracing::debug!(
                "[HtmlMultiplexer] Ignoring active language {:?} without bundles in '{}'",
                active,
                owner
            );
        }

        let known = languages.iter().cloned().collect::<Vec<_>>().join(", ");
        let configured = self
            .targets
            .iter()
            .find(|t| &t.name == owner)
            .and_then(TargetConfig::default_language);
        match configured {
            Some(lang) if languages.contains(lang) => Ok(lang.to_string()),
            Some(lang) => Err(BundlerError::Config(format!(
                "default_language '{lang}' of target '{owner}' has no bundles (known languages: {known})"
            ))),
            None if languages.len() == 1 => Ok(known),
            None => {
                let suggestion = languages.iter().next().cloned().unwrap_or_default();
                Err(BundlerError::Config(format!(
                    "target '{owner}' has bundles for several languages ({known}) but no default_language; \
                     set e.g. default_language = \"{suggestion}\" in its mode table"
                )))
            }
        }
    }
}

fn render_language(
    registry: &AssetRegistry,
    html: &str,
    placeholders: &[Placeholder],
    language: &str,
    owner: &TargetId,
) -> Result<String, BundlerError> {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for placeholder in placeholders {
        let identity = BundleIdentity::new(placeholder.name.as_str(), language);
        let (content, target) =
            registry
                .resolve(&identity)
                .ok_or_else(|| BundlerError::Resolution {
                    bundle: placeholder.name.clone(),
                    language: language.to_string(),
                })?;

        if target != owner {
            return Err(BundlerError::CrossTarget {
                bundle: placeholder.name.clone(),
                language: language.to_string(),
                expected: owner.to_string(),
                found: target.to_string(),
            });
        }

        out.push_str(&html[last..placeholder.span.start]);
        out.push_str(content);
        last = placeholder.span.end;
    }
    out.push_str(&html[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{DynamicOptions, TargetMode, DEFAULT_PLACEHOLDER_PREFIX},
        emit::MemoryEmitter,
        state::AssetState,
    };

    const TEMPLATE: &str =
        "<html><script>window.t = __LOCALE_BUNDLE_greeting__;</script></html>";

    fn dynamic(name: &str, default_language: Option<&str>) -> TargetConfig {
        TargetConfig::new(
            name,
            "translations",
            TargetMode::Dynamic(DynamicOptions {
                default_language: default_language.map(str::to_string),
                ..Default::default()
            }),
        )
    }

    fn register(state: &AssetState, identifier: &str, language: &str, target: &str) {
        state.registry_mut().upsert(
            BundleIdentity::new(identifier, language),
            format!("/i18n/{identifier}.{language}.json"),
            format!("{{\"{identifier}\":\"{language}\"}}"),
            TargetId::from(target),
        );
    }

    fn greeting_state() -> SharedState {
        let state = AssetState::shared();
        register(&state, "greeting", "en", "app");
        register(&state, "greeting", "fr", "app");
        state
    }

    fn multiplexer(state: &SharedState, default_language: Option<&str>) -> HtmlMultiplexer {
        HtmlMultiplexer::new(
            state.clone(),
            vec![dynamic("app", default_language), dynamic("admin", None)],
            DEFAULT_PLACEHOLDER_PREFIX,
        )
        .unwrap()
    }

    #[test]
    fn test_find_placeholders_in_order() {
        let pattern = PlaceholderPattern::new("LOCALE_BUNDLE").unwrap();
        let html = "__LOCALE_BUNDLE_b__ x __LOCALE_BUNDLE_a.b-c__ __OTHER_x__ __LOCALE_BUNDLE___";
        let found = pattern.find(html);
        let names: Vec<_> = found.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a.b-c"]);
        assert_eq!(&html[found[0].span.clone()], "__LOCALE_BUNDLE_b__");
        assert_eq!(pattern.token("b"), "__LOCALE_BUNDLE_b__");
    }

    #[test]
    fn test_fan_out_uses_default_language() {
        let state = greeting_state();
        let fan_out = multiplexer(&state, Some("en"))
            .fan_out(TEMPLATE, "index.html")
            .unwrap();

        assert_eq!(fan_out.documents().count(), 2);
        assert_eq!(fan_out.primary.language.as_deref(), Some("en"));
        assert_eq!(fan_out.primary.path, "index.html");
        assert_eq!(
            fan_out.primary.html,
            "<html><script>window.t = {\"greeting\":\"en\"};</script></html>"
        );
        assert_eq!(fan_out.variants.len(), 1);
        assert_eq!(fan_out.variants[0].language.as_deref(), Some("fr"));
        assert_eq!(fan_out.variants[0].path, "fr/index.html");
        assert!(fan_out.variants[0].html.contains("{\"greeting\":\"fr\"}"));
    }

    #[test]
    fn test_fan_out_prefers_active_language() {
        let state = greeting_state();
        state.set_active_language(Some("fr".to_string()));
        let fan_out = multiplexer(&state, Some("en"))
            .fan_out(TEMPLATE, "/index.html")
            .unwrap();
        assert_eq!(fan_out.primary.language.as_deref(), Some("fr"));
        assert_eq!(fan_out.variants[0].path, "/en/index.html");

        // An active language without bundles is ignored
        state.set_active_language(Some("de".to_string()));
        let fan_out = multiplexer(&state, Some("en"))
            .fan_out(TEMPLATE, "/index.html")
            .unwrap();
        assert_eq!(fan_out.primary.language.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn test_missing_bundle_fails_without_emitting() {
        let state = greeting_state();
        let emitter = MemoryEmitter::new();
        let template = "<p>__LOCALE_BUNDLE_greeting__</p><p>__LOCALE_BUNDLE_missing__</p>";

        let result = multiplexer(&state, Some("en")).fan_out(template, "index.html");
        if let Ok(fan_out) = &result {
            fan_out.emit_all(&emitter).await.unwrap();
        }
        let err = result.unwrap_err();
        assert_eq!(
            err,
            BundlerError::Resolution {
                bundle: "missing".to_string(),
                language: "en".to_string(),
            }
        );
        let message = err.to_string();
        assert!(message.contains("missing") && message.contains("en"), "{message}");
        assert!(emitter.is_empty());
    }

    #[test]
    fn test_cross_target_document_is_rejected() {
        let state = greeting_state();
        register(&state, "dashboard", "en", "admin");
        register(&state, "dashboard", "fr", "admin");
        let template = "__LOCALE_BUNDLE_greeting__ __LOCALE_BUNDLE_dashboard__";

        let err = multiplexer(&state, Some("en"))
            .fan_out(template, "index.html")
            .unwrap_err();
        assert_eq!(
            err,
            BundlerError::CrossTarget {
                bundle: "dashboard".to_string(),
                language: "en".to_string(),
                expected: "app".to_string(),
                found: "admin".to_string(),
            }
        );
    }

    #[test]
    fn test_fan_out_covers_only_owning_target_languages() {
        let state = greeting_state();
        register(&state, "dashboard", "de", "admin");
        let multiplexer = multiplexer(&state, Some("en"));

        let fan_out = multiplexer
            .fan_out("<p>__LOCALE_BUNDLE_greeting__</p>", "index.html")
            .unwrap();
        let languages: Vec<_> = fan_out
            .documents()
            .filter_map(|doc| doc.language.as_deref())
            .collect();
        assert_eq!(languages, vec!["en", "fr"]);

        let fan_out = multiplexer
            .fan_out("<p>__LOCALE_BUNDLE_dashboard__</p>", "admin.html")
            .unwrap();
        assert_eq!(fan_out.primary.language.as_deref(), Some("de"));
        assert_eq!(fan_out.primary.html, "<p>{\"dashboard\":\"de\"}</p>");
        assert!(fan_out.variants.is_empty());
    }

    #[test]
    fn test_unknown_first_placeholder_is_resolution_error() {
        let state = greeting_state();
        let err = multiplexer(&state, Some("en"))
            .fan_out("__LOCALE_BUNDLE_nope__", "index.html")
            .unwrap_err();
        assert!(
            matches!(&err, BundlerError::Resolution { bundle, .. } if bundle == "nope"),
            "{err:?}"
        );
    }

    #[test]
    fn test_no_placeholders_passes_through() {
        let state = AssetState::shared();
        let html = "<html><body>static</body></html>";
        let fan_out = multiplexer(&state, None).fan_out(html, "index.html").unwrap();
        assert_eq!(fan_out.primary.html, html);
        assert_eq!(fan_out.primary.language, None);
        assert!(fan_out.variants.is_empty());
    }

    #[test]
    fn test_missing_default_language_suggests_one() {
        let state = greeting_state();
        let err = multiplexer(&state, None)
            .fan_out(TEMPLATE, "index.html")
            .unwrap_err();
        match err {
            BundlerError::Config(message) => {
                assert!(message.contains("default_language = \"en\""), "{message}")
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_single_language_is_inferred() {
        let state = AssetState::shared();
        register(&state, "greeting", "en", "app");
        let fan_out = multiplexer(&state, None)
            .fan_out(TEMPLATE, "index.html")
            .unwrap();
        assert_eq!(fan_out.primary.language.as_deref(), Some("en"));
        assert!(fan_out.variants.is_empty());
    }

    #[test]
    fn test_unknown_configured_default_is_config_error() {
        let state = greeting_state();
        let err = multiplexer(&state, Some("de"))
            .fan_out(TEMPLATE, "index.html")
            .unwrap_err();
        assert!(matches!(err, BundlerError::Config(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_emit_variants() {
        let state = greeting_state();
        let emitter = MemoryEmitter::new();
        let fan_out = multiplexer(&state, Some("en"))
            .fan_out(TEMPLATE, "/index.html")
            .unwrap();
        fan_out.emit_variants(&emitter).await.unwrap();
        assert_eq!(emitter.file_names(), vec!["fr/index.html".to_string()]);
    }

    #[test]
    fn test_language_path() {
        assert_eq!(language_path("index.html", "fr"), "fr/index.html");
        assert_eq!(language_path("/about/index.html", "de"), "/de/about/index.html");
    }
}
