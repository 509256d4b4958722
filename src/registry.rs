use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::autodetect::highlight_auto;
use crate::emitter::{Emitter, TokenTree};
use crate::error::{Error, TintaResult};
use crate::grammars::{CompiledLanguage, Language};
use crate::highlight::{HighlightResult, PLAINTEXT_LANGUAGE, highlight_language};
use crate::options::{HighlightOptions, Options};

/// The main struct in tinta.
///
/// Holds all the languages and is responsible for highlighting a text. Registration
/// takes `&mut self`; once done, the registry can be shared between threads and every
/// highlight only needs `&self`.
pub struct Registry {
    options: Options,
    // name -> raw language, the name being what users refer to
    languages: HashMap<String, Arc<Language>>,
    // lowercased alias -> name
    aliases: HashMap<String, String>,
    // name -> compiled language, filled on registration or on first use
    compiled: papaya::HashMap<String, Arc<CompiledLanguage>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("options", &self.options)
            .field("languages", &self.list_languages())
            .field("aliases", &self.aliases)
            .finish()
    }
}

impl Registry {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            languages: HashMap::new(),
            aliases: HashMap::new(),
            compiled: papaya::HashMap::new(),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Registers the language built by `factory` under `name`.
    ///
    /// See [`Registry::register_language`].
    pub fn register<F>(&mut self, name: &str, factory: F) -> TintaResult<()>
    where
        F: FnOnce(&Registry) -> Language,
    {
        let language = factory(self);
        self.register_language(name, language)
    }

    /// Registers a language under `name` and compiles it.
    ///
    /// If the language doesn't compile, the error is returned and the language is replaced
    /// by a stub highlighting everything as plain text: highlighting with it still works and
    /// autodetection ignores it.
    pub fn register_language(&mut self, name: &str, mut language: Language) -> TintaResult<()> {
        if language.name.is_empty() {
            language.name = name.to_owned();
        }
        for alias in &language.aliases {
            self.aliases.insert(alias.to_lowercase(), name.to_owned());
        }
        self.languages.insert(name.to_owned(), Arc::new(language));
        self.compiled.pin().remove(name);
        self.compiled_language(name).map(|_| ())
    }

    /// Reads a JSON file and registers it as a language named after the file stem.
    pub fn add_language_from_path(&mut self, path: impl AsRef<Path>) -> TintaResult<()> {
        let path = path.as_ref();
        let language = Language::load_from_file(path)?;
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_owned)
            .unwrap_or_else(|| language.name.clone());
        self.register_language(&name, language)
    }

    /// Adds a language that will not match anything. Useful as a fallback if the language
    /// is not found.
    ///
    /// It will get the `plaintext` name.
    pub fn add_plain_language(&mut self, aliases: &[&str]) -> TintaResult<()> {
        let language = Language {
            name: PLAINTEXT_LANGUAGE.to_owned(),
            aliases: aliases.iter().map(|alias| alias.to_string()).collect(),
            disable_autodetect: true,
            ..Default::default()
        };
        self.register_language(PLAINTEXT_LANGUAGE, language)
    }

    /// Removes a language and every alias pointing to it
    pub fn unregister(&mut self, name: &str) {
        let Some(name) = self.canonical_name(name).map(str::to_owned) else {
            return;
        };
        self.languages.remove(&name);
        self.aliases.retain(|_, target| *target != name);
        self.compiled.pin().remove(&name);
    }

    /// The names of all the registered languages, sorted
    pub fn list_languages(&self) -> Vec<String> {
        let mut names: Vec<_> = self.languages.keys().cloned().collect();
        names.sort();
        names
    }

    /// The name a language is registered under, looking up aliases case-insensitively
    pub fn canonical_name(&self, name_or_alias: &str) -> Option<&str> {
        if let Some((name, _)) = self.languages.get_key_value(name_or_alias) {
            return Some(name);
        }
        let lowered = name_or_alias.to_lowercase();
        if let Some((name, _)) = self.languages.get_key_value(&lowered) {
            return Some(name);
        }
        self.aliases
            .get(&lowered)
            .map(String::as_str)
            .filter(|name| self.languages.contains_key(*name))
    }

    pub fn get_language(&self, name_or_alias: &str) -> Option<&Arc<Language>> {
        self.canonical_name(name_or_alias)
            .and_then(|name| self.languages.get(name))
    }

    /// Adds aliases for the given language
    pub fn register_aliases(&mut self, aliases: &[&str], language_name: &str) {
        for alias in aliases {
            self.aliases
                .insert(alias.to_lowercase(), language_name.to_owned());
        }
    }

    /// Whether the language takes part in autodetection
    pub fn auto_detection(&self, name: &str) -> bool {
        self.compiled_language(name)
            .is_ok_and(|language| !language.disable_autodetect)
    }

    /// Whether `language` declares itself a superset of `other`
    pub(crate) fn is_superset_of(&self, language: &str, other: &str) -> bool {
        let Some(superset_of) = self
            .get_language(language)
            .and_then(|l| l.superset_of.as_deref())
        else {
            return false;
        };
        match (self.canonical_name(superset_of), self.canonical_name(other)) {
            (Some(a), Some(b)) => a == b,
            _ => superset_of == other,
        }
    }

    /// The compiled version of a language, compiling it if needed.
    ///
    /// Every call returns the same instance until the language is registered again.
    pub fn compiled_language(&self, name: &str) -> TintaResult<Arc<CompiledLanguage>> {
        let name = self
            .canonical_name(name)
            .ok_or_else(|| Error::LanguageNotFound(name.to_owned()))?;
        let compiled = self.compiled.pin();
        if let Some(language) = compiled.get(name) {
            return Ok(Arc::clone(language));
        }

        let raw = &self.languages[name];
        match CompiledLanguage::compile(raw) {
            Ok(language) => {
                if cfg!(feature = "debug") {
                    log::debug!("compiled {name} into {} modes", language.modes_len());
                }
                let language = compiled.get_or_insert(name.to_owned(), Arc::new(language));
                Ok(Arc::clone(language))
            }
            Err(source) => {
                log::warn!("language {name} could not be compiled, using a plaintext stub: {source}");
                compiled.insert(
                    name.to_owned(),
                    Arc::new(CompiledLanguage::plaintext(&raw.name)),
                );
                Err(Error::Compile {
                    language: name.to_owned(),
                    source,
                })
            }
        }
    }

    /// The main entry point: highlights `code` with the language of `options` into a tree.
    pub fn highlight(
        &self,
        code: &str,
        options: HighlightOptions<'_>,
    ) -> TintaResult<HighlightResult<TokenTree>> {
        self.highlight_with(code, options)
    }

    /// Same as [`Registry::highlight`], with any emitter
    pub fn highlight_with<E: Emitter>(
        &self,
        code: &str,
        options: HighlightOptions<'_>,
    ) -> TintaResult<HighlightResult<E>> {
        if options.fallback_to_plain && self.canonical_name(options.language).is_none() {
            return Ok(HighlightResult::plaintext(self, PLAINTEXT_LANGUAGE, code));
        }
        highlight_language(
            self,
            options.language,
            code,
            options.ignore_illegals,
            false,
            None,
        )
    }

    /// Highlights `code` with the most relevant of the candidates.
    ///
    /// The candidates default to the `languages` option, then to every registered language.
    pub fn highlight_auto(
        &self,
        code: &str,
        candidates: Option<&[String]>,
    ) -> TintaResult<HighlightResult<TokenTree>> {
        self.highlight_auto_with(code, candidates)
    }

    /// Same as [`Registry::highlight_auto`], with any emitter
    pub fn highlight_auto_with<E: Emitter>(
        &self,
        code: &str,
        candidates: Option<&[String]>,
    ) -> TintaResult<HighlightResult<E>> {
        highlight_auto(self, code, candidates)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::emitter::Node;
    use crate::error::CompileError;
    use crate::grammars::{Keywords, Mode, ModeRef};
    use crate::renderers::html::HtmlEmitter;
    use crate::test_utils::{get_registry, language_from_mode};

    #[test]
    fn keywords_get_scoped_and_scored() {
        let registry = get_registry();
        let result = registry
            .highlight("if (x) else y", HighlightOptions::new("mini"))
            .unwrap();
        insta::assert_snapshot!(
            result.value,
            @r#"<span class="hljs-keyword">if</span> (x) <span class="hljs-keyword">else</span> y"#
        );
        let leaves = result
            .emitter
            .root()
            .children
            .iter()
            .filter(|node| matches!(node, Node::Scope(_)))
            .count();
        assert_eq!(leaves, 2);
        // `if` is one of the common keywords and doesn't count
        assert_eq!(result.relevance, 1);

        let mut registry = Registry::default();
        registry
            .register_language(
                "mini2",
                language_from_mode(Mode {
                    keywords: Some(Keywords::from("if|1 else")),
                    ..Default::default()
                }),
            )
            .unwrap();
        let result = registry
            .highlight("if (x) else y", HighlightOptions::new("mini2"))
            .unwrap();
        assert_eq!(result.relevance, 2);
    }

    #[test]
    fn self_at_root_fails_registration() {
        let mut registry = Registry::default();
        let res = registry.register_language(
            "broken",
            language_from_mode(Mode {
                contains: vec![ModeRef::SelfRef],
                ..Default::default()
            }),
        );
        assert!(matches!(
            res,
            Err(Error::Compile {
                source: CompileError::SelfAtRoot,
                ..
            })
        ));

        // the stub is still usable but never detected
        let result = registry
            .highlight("<x>", HighlightOptions::new("broken"))
            .unwrap();
        assert_eq!(result.value, "&lt;x&gt;");
        assert!(!registry.auto_detection("broken"));
    }

    #[test]
    fn compiling_twice_gives_the_same_language() {
        let registry = get_registry();
        let first = registry.compiled_language("mini").unwrap();
        let second = registry.compiled_language("MINI").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn aliases_are_case_insensitive() {
        let mut registry = get_registry();
        registry.register_aliases(&["Mn", "m"], "mini");
        assert_eq!(registry.canonical_name("mn"), Some("mini"));
        assert_eq!(registry.canonical_name("M"), Some("mini"));
        assert!(registry.get_language("unknown").is_none());

        let result = registry
            .highlight_with::<HtmlEmitter>("else", HighlightOptions::new("MN"))
            .unwrap();
        assert_eq!(result.language, "mini");
    }

    #[test]
    fn unregister_removes_aliases() {
        let mut registry = get_registry();
        registry.register_aliases(&["mn"], "mini");
        registry.unregister("mn");
        assert!(registry.get_language("mini").is_none());
        assert!(registry.get_language("mn").is_none());
        assert!(!registry.list_languages().contains(&"mini".to_string()));
        assert!(matches!(
            registry.highlight("x", HighlightOptions::new("mini")),
            Err(Error::LanguageNotFound(_))
        ));
    }

    #[test]
    fn can_fallback_to_plain() {
        let mut registry = get_registry();
        registry.add_plain_language(&["text"]).unwrap();
        let result = registry
            .highlight(
                "if <x>",
                HighlightOptions::new("nope").fallback_to_plain(true),
            )
            .unwrap();
        assert_eq!(result.language, PLAINTEXT_LANGUAGE);
        assert_eq!(result.value, "if &lt;x&gt;");

        let result = registry
            .highlight("if", HighlightOptions::new("text"))
            .unwrap();
        assert_eq!(result.language, PLAINTEXT_LANGUAGE);
        assert_eq!(result.relevance, 0);
        assert!(!registry.auto_detection("text"));
    }

    #[test]
    fn factories_see_the_registry() {
        let mut registry = get_registry();
        registry
            .register("derived", |registry| {
                let mut language = (**registry.get_language("mini").unwrap()).clone();
                language.name = "Derived".into();
                language.aliases = vec!["der".into()];
                language
            })
            .unwrap();
        assert_eq!(registry.get_language("der").unwrap().name, "Derived");
        assert!(registry.auto_detection("derived"));
    }

    #[test]
    fn can_load_json_grammars() {
        let mut registry = Registry::default();
        registry
            .add_language_from_path("src/fixtures/grammars/ini.json")
            .unwrap();
        assert_eq!(registry.get_language("ini").unwrap().name, "INI");
        assert_eq!(registry.canonical_name("toml-ish"), Some("ini"));

        let sample = std::fs::read_to_string("src/fixtures/samples/ini.txt").unwrap();
        let result = registry
            .highlight(&sample, HighlightOptions::new("ini"))
            .unwrap();
        let expected = std::fs::read_to_string("src/fixtures/snapshots/ini.html").unwrap();
        assert_eq!(result.value.trim(), expected.trim());
    }
}
