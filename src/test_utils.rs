use crate::grammars::{Keywords, Language, Mode};
use crate::options::Options;
use crate::registry::Registry;

/// A language made of a root mode only
pub(crate) fn language_from_mode(mode: Mode) -> Language {
    Language {
        mode,
        ..Default::default()
    }
}

/// `mini`: keywords only. `quoted`: double-quoted strings that can't span lines.
fn register_test_languages(registry: &mut Registry) {
    registry
        .register_language(
            "mini",
            language_from_mode(Mode {
                keywords: Some(Keywords::from("if else")),
                ..Default::default()
            }),
        )
        .unwrap();

    let string = Mode {
        scope: Some("string".into()),
        begin: Some("\"".into()),
        end: Some("\"".into()),
        illegal: Some(r"\n".into()),
        ..Default::default()
    };
    registry
        .register_language(
            "quoted",
            language_from_mode(Mode {
                contains: vec![string.into()],
                ..Default::default()
            }),
        )
        .unwrap();
}

pub(crate) fn get_registry() -> Registry {
    let mut registry = Registry::default();
    register_test_languages(&mut registry);
    registry
}

/// Same languages, but errors are returned instead of turned into results
pub(crate) fn get_strict_registry() -> Registry {
    let mut registry = Registry::new(Options::default().strict());
    register_test_languages(&mut registry);
    registry
}
