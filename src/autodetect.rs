use std::cmp::Ordering;

use crate::emitter::Emitter;
use crate::error::TintaResult;
use crate::highlight::{HighlightResult, PLAINTEXT_LANGUAGE, SecondBest, highlight_language};
use crate::registry::Registry;

/// How `a` ranks against `b`, the best first
fn compare<E>(registry: &Registry, a: &HighlightResult<E>, b: &HighlightResult<E>) -> Ordering {
    if a.relevance != b.relevance {
        return b.relevance.cmp(&a.relevance);
    }
    // On a tie, the language extending the other one wins
    if registry.is_superset_of(&a.language, &b.language) {
        Ordering::Less
    } else if registry.is_superset_of(&b.language, &a.language) {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

/// Highlights `code` with every candidate and keeps the most relevant result.
///
/// The candidates default to the `languages` option, and to every registered language
/// if that is not set either. Unknown languages and the ones excluded from autodetection
/// are skipped.
pub(crate) fn highlight_auto<E: Emitter>(
    registry: &Registry,
    code: &str,
    candidates: Option<&[String]>,
) -> TintaResult<HighlightResult<E>> {
    let all;
    let candidates = match candidates.or(registry.options().languages.as_deref()) {
        Some(candidates) => candidates,
        None => {
            all = registry.list_languages();
            all.as_slice()
        }
    };

    // The floor: anything scoring 0 doesn't beat plain text
    let mut results = vec![HighlightResult::plaintext(registry, PLAINTEXT_LANGUAGE, code)];
    for name in candidates {
        if !registry.auto_detection(name) {
            continue;
        }
        let result = highlight_language::<E>(registry, name, code, false, true, None)?;
        if cfg!(feature = "debug") {
            log::debug!("[highlight_auto] {} scored {}", result.language, result.relevance);
        }
        results.push(result);
    }

    // Stable, so the floor stays ahead of any other 0
    results.sort_by(|a, b| compare(registry, a, b));
    let mut results = results.into_iter();
    let mut best = results.next().expect("the floor is always there");
    best.second_best = results.next().map(|second| SecondBest {
        language: second.language,
        relevance: second.relevance,
    });
    Ok(best)
}
