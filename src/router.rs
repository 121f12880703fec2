//! Development request routing.
//!
//! Every request is classified with plain registry lookups; nothing here waits on a build.
//! Along the way the router records which language the client appears to be viewing, which the
//! reload notifier and the HTML multiplexer read back from [`AssetState`](crate::state::AssetState).

use crate::{config::ActiveLanguagePolicy, state::SharedState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// The path is a registered bundle; answer with its content as JSON.
    ServeBundle { content: String, language: String },
    /// A language-prefixed HTML request. `path` has the language segment removed.
    Forward { path: String, language: String },
    /// Not ours; continue with the original path.
    PassThrough { path: String },
}

/// HTML requests are directory-like paths, `.html` files, or paths whose last segment has no
/// extension.
pub fn is_html_request(path: &str) -> bool {
    if path.ends_with('/') || path.ends_with(".html") {
        return true;
    }
    let last = path.rsplit('/').next().unwrap_or_default();
    !last.contains('.')
}

/// Splits `/fr/about/` into `("fr", "/about/")`. Returns `None` for paths with a single segment
/// that is not followed by a slash, since `/fr` is a page named `fr`, not a language root.
fn split_language(path: &str) -> Option<(&str, String)> {
    let rest = path.strip_prefix('/')?;
    let (first, tail) = rest.split_once('/')?;
    if first.is_empty() {
        return None;
    }
    Some((first, format!("/{tail}")))
}

#[derive(Debug, Clone)]
pub struct RequestRouter {
    state: SharedState,
    policy: ActiveLanguagePolicy,
}

impl RequestRouter {
    pub fn new(state: SharedState, policy: ActiveLanguagePolicy) -> Self {
        RequestRouter { state, policy }
    }

    pub fn policy(&self) -> ActiveLanguagePolicy {
        self.policy
    }

    /// Classifies a request path. The query string, if any, is ignored.
    pub fn route(&self, uri_path: &str) -> RouteDecision {
        let path = uri_path.split(['?', '#']).next().unwrap_or_default();

        let bundle = {
            let registry = self.state.registry();
            registry.identity_at(path).and_then(|identity| {
                registry
                    .lookup(path)
                    .map(|content| (content.to_string(), identity.language.clone()))
            })
        };
        if let Some((content, language)) = bundle {
            tracing::debug!("[RequestRouter] Serving bundle {} ({})", path, language);
            self.state.set_active_language(Some(language.clone()));
            return RouteDecision::ServeBundle { content, language };
        }

        if is_html_request(path) {
            if let Some((language, stripped)) = split_language(path) {
                if self.state.registry().has_language(language) {
                    tracing::debug!(
                        "[RequestRouter] {} -> {} for language {}",
                        path,
                        stripped,
                        language
                    );
                    self.state.set_active_language(Some(language.to_string()));
                    return RouteDecision::Forward {
                        path: stripped,
                        language: language.to_string(),
                    };
                }
            }
        }

        if self.policy == ActiveLanguagePolicy::Reset {
            self.state.set_active_language(None);
        }
        RouteDecision::PassThrough {
            path: path.to_string(),
        }
    }
}
