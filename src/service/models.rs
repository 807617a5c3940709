//! Model resolution: fixed id, or pick one from the service's model list.
//!
//! Dynamic selection is product policy rather than anything correctness
//! critical: prefer the cheap, fast multimodal tier and degrade gracefully.
//!
//! | Priority | Rule |
//! |----------|------|
//! | 1 | name contains `flash` and `1.5` |
//! | 2 | name contains `flash` |
//! | 3 | name contains `pro` and `1.5` |
//! | 4 | [`LEGACY_FALLBACK_MODEL`] |

use super::DocumentService;
use crate::config::ModelSelection;
use tracing::{info, warn};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "models/gemini-1.5-flash";

/// Last rung of automatic selection, also used when listing fails.
pub const LEGACY_FALLBACK_MODEL: &str = "models/gemini-pro";

/// Prefix the service expects on model resource names.
pub fn qualify_model(model: &str) -> String {
    let model = model.trim();
    if model.starts_with("models/") || model.starts_with("tunedModels/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

/// Pick a model from `available` by the priority table above.
///
/// Matching is case-insensitive; within a rule the first listed model wins,
/// so the service's own ordering breaks ties.
pub fn select_model<S: AsRef<str>>(available: &[S]) -> String {
    let lower: Vec<(String, &str)> = available
        .iter()
        .map(|m| (m.as_ref().to_lowercase(), m.as_ref()))
        .collect();

    let rules: [fn(&str) -> bool; 3] = [
        |m: &str| m.contains("flash") && m.contains("1.5"),
        |m: &str| m.contains("flash"),
        |m: &str| m.contains("pro") && m.contains("1.5"),
    ];

    rules
        .iter()
        .find_map(|rule| {
            lower
                .iter()
                .find(|(l, _)| rule(l.as_str()))
                .map(|(_, orig)| qualify_model(orig))
        })
        .unwrap_or_else(|| LEGACY_FALLBACK_MODEL.to_string())
}

/// Turn the configured [`ModelSelection`] into a concrete model name.
///
/// Runs once per batch. A failed model listing is not fatal: the fallback
/// model is used and every document will report its own error if the
/// credential itself is the problem.
pub async fn resolve_model(service: &dyn DocumentService, selection: &ModelSelection) -> String {
    match selection {
        ModelSelection::Fixed(model) => qualify_model(model),
        ModelSelection::Auto => match service.list_models().await {
            Ok(models) => {
                let chosen = select_model(&models);
                info!("Selected model {} from {} available", chosen, models.len());
                chosen
            }
            Err(e) => {
                warn!(
                    "Could not list models ({}); falling back to {}",
                    e, LEGACY_FALLBACK_MODEL
                );
                LEGACY_FALLBACK_MODEL.to_string()
            }
        },
    }
}
