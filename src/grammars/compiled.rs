use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use crate::error::CompileError;
use crate::grammars::keywords::{DEFAULT_KEYWORD_PATTERN, KeywordTable, compile_keywords};
use crate::grammars::passes::normalize;
use crate::grammars::pattern_set::{ResumableScanner, RuleKind, ScanRule};
use crate::grammars::raw::{
    GroupScopes, Hook, Language, Mode, ModeRef, RegexSource, ScopeSpec, SubLanguage,
};
use crate::grammars::regex::Regex;

/// Always matches, without consuming anything
pub const ALWAYS_MATCH: &str = r"\B|\b";

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct ModeId(pub u16);

impl Deref for ModeId {
    type Target = u16;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl ModeId {
    #[inline]
    pub fn as_index(self) -> usize {
        self.0 as usize
    }

    fn for_index(index: usize) -> Result<Self, CompileError> {
        u16::try_from(index)
            .map(ModeId)
            .map_err(|_| CompileError::TooManyModes)
    }
}

pub const ROOT_MODE_ID: ModeId = ModeId(0);

/// How the text of a begin or end match gets scoped
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum EmitScope {
    /// The whole match gets the scope
    Wrap(String),
    /// Each listed group of the match gets its own scope, if any
    Multi(GroupScopes),
}

impl EmitScope {
    fn new(scope: Option<ScopeSpec>, groups: Option<GroupScopes>) -> Option<Self> {
        if let Some(groups) = groups {
            return Some(EmitScope::Multi(groups));
        }
        match scope {
            Some(ScopeSpec::Name(name)) => Some(EmitScope::Wrap(name)),
            // A group map on a single pattern has nothing to map to
            Some(ScopeSpec::Groups(_)) | None => None,
        }
    }
}

/// A mode ready to be used by the tokenizer.
///
/// Only the root has no `begin`/`end`.
#[derive(Debug, Default)]
pub struct CompiledMode {
    pub id: ModeId,
    pub scope: Option<String>,
    pub begin_scope: Option<EmitScope>,
    pub end_scope: Option<EmitScope>,
    pub begin: Option<Regex>,
    pub end: Option<Regex>,
    /// The end source, followed by the terminators of the parents the mode ends with.
    /// Empty if the mode can't be ended.
    pub terminator_end: String,
    pub illegal: Option<Regex>,
    pub keywords: Option<KeywordTable>,
    /// Only set alongside `keywords`
    pub keyword_pattern: Option<Regex>,
    pub contains: Vec<ModeId>,
    pub starts: Option<ModeId>,
    pub sub_language: Option<SubLanguage>,
    pub relevance: u32,
    pub ends_with_parent: bool,
    pub ends_parent: bool,
    pub skip: bool,
    pub exclude_begin: bool,
    pub exclude_end: bool,
    pub return_begin: bool,
    pub return_end: bool,
    pub(crate) on_begin: Option<Hook>,
    pub(crate) on_end: Option<Hook>,
    pub(crate) before_begin: Option<Hook>,
    pub(crate) scanner: ResumableScanner,
}

impl CompiledMode {
    /// The name used in error messages
    pub fn display_name(&self) -> &str {
        self.scope.as_deref().unwrap_or("<unnamed>")
    }
}

/// A language with all its modes compiled into an arena, the root being the first one.
#[derive(Debug)]
pub struct CompiledLanguage {
    pub name: String,
    pub aliases: Vec<String>,
    pub case_insensitive: bool,
    pub disable_autodetect: bool,
    pub superset_of: Option<String>,
    pub class_name_aliases: HashMap<String, String>,
    pub(crate) modes: Vec<CompiledMode>,
}

impl CompiledLanguage {
    pub fn compile(language: &Language) -> Result<Self, CompileError> {
        if language
            .mode
            .contains
            .iter()
            .any(|c| matches!(c, ModeRef::SelfRef))
        {
            return Err(CompileError::SelfAtRoot);
        }

        let mut compiler = ModeCompiler::new(language);
        let root = compiler.retain(Arc::new(language.mode.clone()));
        let root_id = compiler.compile(&root, None)?;
        debug_assert_eq!(root_id, ROOT_MODE_ID);

        Ok(Self {
            name: language.name.clone(),
            aliases: language.aliases.clone(),
            case_insensitive: language.case_insensitive,
            disable_autodetect: language.disable_autodetect,
            superset_of: language.superset_of.clone(),
            class_name_aliases: language.class_name_aliases.clone(),
            modes: compiler.modes,
        })
    }

    /// A language without any rule: everything is plain text and nothing is ever scored.
    pub fn plaintext(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            aliases: Vec::new(),
            case_insensitive: false,
            disable_autodetect: true,
            superset_of: None,
            class_name_aliases: HashMap::new(),
            modes: vec![CompiledMode::default()],
        }
    }

    #[inline]
    pub fn root(&self) -> &CompiledMode {
        &self.modes[ROOT_MODE_ID.as_index()]
    }

    #[inline]
    pub fn mode(&self, id: ModeId) -> &CompiledMode {
        &self.modes[id.as_index()]
    }

    pub fn modes_len(&self) -> usize {
        self.modes.len()
    }

    /// The scope name to emit for `scope`, going through `class_name_aliases`
    pub(crate) fn alias_scope<'a>(&'a self, scope: &'a str) -> &'a str {
        self.class_name_aliases
            .get(scope)
            .map(String::as_str)
            .unwrap_or(scope)
    }
}

/// Compiles the modes of a language.
///
/// Templates are identified by their address: compiling the same `Arc<Mode>` twice gives the
/// same id. Every template derived during compilation is kept alive until the end so that
/// no address gets reused.
pub(crate) struct ModeCompiler<'l> {
    language: &'l Language,
    modes: Vec<CompiledMode>,
    compiled: HashMap<usize, ModeId>,
    variants: HashMap<usize, Vec<Arc<Mode>>>,
    retained: Vec<Arc<Mode>>,
}

impl<'l> ModeCompiler<'l> {
    pub(crate) fn new(language: &'l Language) -> Self {
        Self {
            language,
            modes: Vec::new(),
            compiled: HashMap::new(),
            variants: HashMap::new(),
            retained: Vec::new(),
        }
    }

    fn retain(&mut self, mode: Arc<Mode>) -> Arc<Mode> {
        self.retained.push(Arc::clone(&mode));
        mode
    }

    fn regex(&self, pattern: String) -> Result<Regex, CompileError> {
        Regex::new(pattern, self.language.case_insensitive)
    }

    /// Compiles `template` as a child of `parent`, or as the root if there's no parent
    pub(crate) fn compile(
        &mut self,
        template: &Arc<Mode>,
        parent: Option<&CompiledMode>,
    ) -> Result<ModeId, CompileError> {
        let key = Arc::as_ptr(template) as usize;
        if let Some(id) = self.compiled.get(&key) {
            return Ok(*id);
        }

        let id = ModeId::for_index(self.modes.len())?;
        self.modes.push(CompiledMode::default());
        self.compiled.insert(key, id);

        let case_insensitive = self.language.case_insensitive;
        let mode = normalize(
            (**template).clone(),
            parent,
            &self.language.compiler_extensions,
            case_insensitive,
        )?;
        let mode = self.retain(Arc::new(mode));

        let mut cmode = CompiledMode {
            id,
            scope: match &mode.scope {
                Some(ScopeSpec::Name(name)) => Some(name.clone()),
                _ => None,
            },
            begin_scope: EmitScope::new(
                mode.begin_scope.clone(),
                mode.derived.begin_groups.clone(),
            ),
            end_scope: EmitScope::new(mode.end_scope.clone(), mode.derived.end_groups.clone()),
            sub_language: mode.sub_language.clone(),
            relevance: mode.relevance.unwrap_or(1),
            ends_with_parent: mode.ends_with_parent,
            ends_parent: mode.ends_parent,
            skip: mode.skip,
            exclude_begin: mode.exclude_begin,
            exclude_end: mode.exclude_end,
            return_begin: mode.return_begin,
            return_end: mode.return_end,
            on_begin: mode.on_begin.clone(),
            on_end: mode.on_end.clone(),
            before_begin: mode.derived.before_begin.clone(),
            ..Default::default()
        };

        if let Some(raw_keywords) = &mode.keywords {
            let (pattern, table) = compile_keywords(raw_keywords, case_insensitive);
            let pattern = pattern.unwrap_or_else(|| DEFAULT_KEYWORD_PATTERN.to_owned());
            cmode.keyword_pattern = Some(self.regex(pattern)?);
            cmode.keywords = Some(table);
        }

        if let Some(parent) = parent {
            let begin = source(&mode.begin).unwrap_or_else(|| ALWAYS_MATCH.to_owned());
            cmode.begin = Some(self.regex(begin)?);

            let end = match source(&mode.end) {
                Some(end) => Some(end),
                None if !mode.ends_with_parent => Some(ALWAYS_MATCH.to_owned()),
                None => None,
            };
            if let Some(end) = &end {
                cmode.end = Some(self.regex(end.clone())?);
            }

            let mut terminator_end = end.unwrap_or_default();
            if mode.ends_with_parent && !parent.terminator_end.is_empty() {
                if cmode.end.is_some() {
                    terminator_end.push('|');
                }
                terminator_end.push_str(&parent.terminator_end);
            }
            cmode.terminator_end = terminator_end;
        }

        if let Some(illegal) = source(&mode.illegal) {
            cmode.illegal = Some(self.regex(illegal)?);
        }

        // The parent's scanner needs our begin even if we are still compiling
        self.modes[id.as_index()].begin = cmode.begin.clone();

        for child in &mode.contains {
            let templates = match child {
                ModeRef::SelfRef => {
                    cmode.contains.push(id);
                    continue;
                }
                ModeRef::Mode(template) => self.expand_or_clone(template),
            };
            for template in templates {
                let child_id = self.compile(&template, Some(&cmode))?;
                cmode.contains.push(child_id);
            }
        }

        if let Some(starts) = &mode.starts {
            cmode.starts = Some(self.compile(starts, parent)?);
        }

        cmode.scanner = self.build_scanner(&cmode)?;
        if cfg!(feature = "debug") {
            log::debug!(
                "compiled mode {} ({}) of {}: {:?}",
                *id,
                cmode.display_name(),
                self.language.name,
                cmode.scanner
            );
        }
        self.modes[id.as_index()] = cmode;
        Ok(id)
    }

    /// Variants get expanded into one mode each, shared by every use of the template.
    /// A mode whose compilation depends on its parent gets its own copy for each use.
    fn expand_or_clone(&mut self, template: &Arc<Mode>) -> Vec<Arc<Mode>> {
        if template.variants.is_empty() {
            return vec![self.clone_for_use_site(template)];
        }

        let key = Arc::as_ptr(template) as usize;
        let expanded = match self.variants.get(&key) {
            Some(expanded) => expanded.clone(),
            None => {
                let expanded: Vec<Arc<Mode>> = template
                    .variants
                    .iter()
                    .map(|variant| Arc::new(template.inherit(variant)))
                    .collect();
                self.retain(Arc::clone(template));
                for variant in &expanded {
                    self.retain(Arc::clone(variant));
                }
                self.variants.insert(key, expanded.clone());
                expanded
            }
        };

        expanded
            .iter()
            .map(|variant| self.clone_for_use_site(variant))
            .collect()
    }

    fn clone_for_use_site(&mut self, template: &Arc<Mode>) -> Arc<Mode> {
        if !template.depends_on_parent() {
            return Arc::clone(template);
        }
        let mut copy = (**template).clone();
        copy.starts = copy.starts.map(|starts| Arc::new((*starts).clone()));
        self.retain(Arc::new(copy))
    }

    fn build_scanner(&self, cmode: &CompiledMode) -> Result<ResumableScanner, CompileError> {
        let mut rules = Vec::with_capacity(cmode.contains.len() + 2);
        for child_id in &cmode.contains {
            let child = if *child_id == cmode.id {
                cmode
            } else {
                &self.modes[child_id.as_index()]
            };
            let Some(begin) = &child.begin else {
                continue;
            };
            rules.push(ScanRule {
                source: begin.pattern().to_owned(),
                kind: RuleKind::Begin(*child_id),
                position: rules.len(),
            });
        }
        if !cmode.terminator_end.is_empty() {
            rules.push(ScanRule {
                source: cmode.terminator_end.clone(),
                kind: RuleKind::End,
                position: rules.len(),
            });
        }
        if let Some(illegal) = &cmode.illegal {
            rules.push(ScanRule {
                source: illegal.pattern().to_owned(),
                kind: RuleKind::Illegal,
                position: rules.len(),
            });
        }
        ResumableScanner::new(rules, self.language.case_insensitive)
    }
}

/// An empty pattern counts as no pattern at all
fn source(pattern: &Option<RegexSource>) -> Option<String> {
    let pattern = match pattern {
        Some(RegexSource::Single(p)) => p.clone(),
        Some(RegexSource::Sequence(p)) => p.concat(),
        None => return None,
    };
    (!pattern.is_empty()).then_some(pattern)
}
