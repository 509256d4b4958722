//! The normalization steps every mode goes through before being compiled.
//!
//! Each pass takes the mode by value and returns the rewritten mode, they are run in the
//! order of [`normalize`].

use std::sync::Arc;

use crate::error::CompileError;
use crate::grammars::compiled::CompiledMode;
use crate::grammars::raw::{
    Extension, GroupScopes, Hook, Keywords, Mode, ModeRef, RegexSource, ScopeSpec,
};
use crate::grammars::regex::{
    concat, count_match_groups, either, lookahead, rewrite_backreferences,
};

pub(crate) type Pass = fn(Mode, Option<&CompiledMode>) -> Result<Mode, CompileError>;

/// Run before the language compiler extensions
const PRE_EXTENSION_PASSES: [Pass; 5] = [
    scope_class_name,
    compile_match,
    multi_class,
    compile_illegal,
    before_match,
];

/// Run after the language compiler extensions
const POST_EXTENSION_PASSES: [Pass; 2] = [begin_keywords, compile_relevance];

pub(crate) fn normalize(
    mut mode: Mode,
    parent: Option<&CompiledMode>,
    extensions: &[Extension],
    case_insensitive: bool,
) -> Result<Mode, CompileError> {
    for pass in PRE_EXTENSION_PASSES {
        mode = pass(mode, parent)?;
    }
    for ext in extensions {
        mode = ext.apply(mode, parent)?;
    }
    mode.derived.before_begin = None;
    for pass in POST_EXTENSION_PASSES {
        mode = pass(mode, parent)?;
    }
    // Group counts need the grammar flags so they are done apart
    finish_multi_class(mode, case_insensitive)
}

/// `className` is the legacy name of `scope`
pub(crate) fn scope_class_name(
    mut mode: Mode,
    _parent: Option<&CompiledMode>,
) -> Result<Mode, CompileError> {
    if let Some(class_name) = mode.class_name.take() {
        mode.scope = Some(ScopeSpec::Name(class_name));
    }
    Ok(mode)
}

/// `match` is a `begin` without an `end`
pub(crate) fn compile_match(
    mut mode: Mode,
    _parent: Option<&CompiledMode>,
) -> Result<Mode, CompileError> {
    let Some(pattern) = mode.match_.take() else {
        return Ok(mode);
    };
    if mode.begin.is_some() || mode.end.is_some() {
        return Err(CompileError::MatchWithBeginOrEnd);
    }
    mode.begin = Some(pattern);
    Ok(mode)
}

/// A map-valued `scope` is a `beginScope`, and array-form `begin`/`end` need their scope
/// to be a group map.
///
/// Only validation happens here: the patterns are concatenated by [`finish_multi_class`]
/// once extensions had a chance to look at the array form.
pub(crate) fn multi_class(
    mut mode: Mode,
    _parent: Option<&CompiledMode>,
) -> Result<Mode, CompileError> {
    if matches!(mode.scope, Some(ScopeSpec::Groups(_))) {
        mode.begin_scope = mode.scope.take();
    }

    if matches!(mode.begin, Some(RegexSource::Sequence(_))) {
        if mode.skip || mode.exclude_begin || mode.return_begin {
            return Err(CompileError::MultiScopeIncompatible { key: "beginScope" });
        }
        if !matches!(mode.begin_scope, Some(ScopeSpec::Groups(_))) {
            return Err(CompileError::MultiScopeNotMap { key: "beginScope" });
        }
    }

    if matches!(mode.end, Some(RegexSource::Sequence(_))) {
        if mode.skip || mode.exclude_end || mode.return_end {
            return Err(CompileError::MultiScopeIncompatible { key: "endScope" });
        }
        if !matches!(mode.end_scope, Some(ScopeSpec::Groups(_))) {
            return Err(CompileError::MultiScopeNotMap { key: "endScope" });
        }
    }

    Ok(mode)
}

/// An `illegal` list is any of its patterns
pub(crate) fn compile_illegal(
    mut mode: Mode,
    _parent: Option<&CompiledMode>,
) -> Result<Mode, CompileError> {
    if let Some(RegexSource::Sequence(patterns)) = &mode.illegal {
        mode.illegal = Some(RegexSource::Single(either(patterns)));
    }
    Ok(mode)
}

/// `beforeMatch` turns the mode into a wrapper that matches the prefix, followed by a
/// lookahead on the original `begin`, and then starts the original mode.
pub(crate) fn before_match(
    mut mode: Mode,
    _parent: Option<&CompiledMode>,
) -> Result<Mode, CompileError> {
    let Some(prefix) = mode.before_match.take() else {
        return Ok(mode);
    };
    if mode.starts.is_some() {
        return Err(CompileError::BeforeMatchWithStarts);
    }

    let begin = match &mode.begin {
        Some(RegexSource::Single(p)) => p.clone(),
        Some(RegexSource::Sequence(p)) => concat(p),
        None => String::new(),
    };
    let keywords = mode.keywords.clone();
    let original = Mode {
        ends_parent: true,
        ..mode
    };

    Ok(Mode {
        keywords,
        begin: Some(RegexSource::Single(concat(&[prefix, lookahead(&begin)]))),
        relevance: Some(0),
        starts: Some(Arc::new(Mode {
            relevance: Some(0),
            contains: vec![ModeRef::from(original)],
            ..Default::default()
        })),
        ..Default::default()
    })
}

/// `beginKeywords` is a `begin` matching any of the words, which are also the default
/// keywords of the mode. Only applies below the root.
pub(crate) fn begin_keywords(
    mut mode: Mode,
    parent: Option<&CompiledMode>,
) -> Result<Mode, CompileError> {
    if parent.is_none() {
        return Ok(mode);
    }
    let Some(words) = mode.begin_keywords.take() else {
        return Ok(mode);
    };

    let alternatives: Vec<&str> = words.split(' ').filter(|w| !w.is_empty()).collect();
    mode.begin = Some(RegexSource::Single(format!(
        r"\b({})(?!\.)(?=\b|\s)",
        alternatives.join("|")
    )));
    mode.derived.before_begin = Some(Hook::new(|m, response| {
        if m.input[..m.index].ends_with('.') {
            response.ignore_match();
        }
    }));
    if mode.keywords.is_none() {
        mode.keywords = Some(Keywords::Words(words));
    }
    if mode.relevance.is_none() {
        mode.relevance = Some(0);
    }
    Ok(mode)
}

pub(crate) fn compile_relevance(
    mut mode: Mode,
    _parent: Option<&CompiledMode>,
) -> Result<Mode, CompileError> {
    if mode.relevance.is_none() {
        mode.relevance = Some(1);
    }
    Ok(mode)
}

/// Concatenates array-form `begin`/`end` and maps their scope maps onto the group
/// numbers of the concatenated pattern.
pub(crate) fn finish_multi_class(
    mut mode: Mode,
    case_insensitive: bool,
) -> Result<Mode, CompileError> {
    if let Some(RegexSource::Sequence(patterns)) = &mode.begin {
        let groups = remap_scope_names(
            patterns,
            mode.begin_scope.take(),
            "beginScope",
            case_insensitive,
        )?;
        mode.begin = Some(RegexSource::Single(rewrite_backreferences(patterns, "")));
        mode.derived.begin_groups = Some(groups);
    }
    if let Some(RegexSource::Sequence(patterns)) = &mode.end {
        let groups = remap_scope_names(
            patterns,
            mode.end_scope.take(),
            "endScope",
            case_insensitive,
        )?;
        mode.end = Some(RegexSource::Single(rewrite_backreferences(patterns, "")));
        mode.derived.end_groups = Some(groups);
    }
    Ok(mode)
}

/// Sub-pattern `i` (1-based) of the scope map ends up as group `i + offset` where `offset`
/// is the number of groups the previous sub-patterns declare themselves.
fn remap_scope_names(
    patterns: &[String],
    scope: Option<ScopeSpec>,
    key: &'static str,
    case_insensitive: bool,
) -> Result<GroupScopes, CompileError> {
    let Some(ScopeSpec::Groups(names)) = scope else {
        return Err(CompileError::MultiScopeNotMap { key });
    };

    let mut by_piece = Vec::with_capacity(names.len());
    for (index, name) in names {
        let index: usize = index
            .parse()
            .map_err(|_| CompileError::InvalidScopeIndex {
                key,
                index: index.clone(),
            })?;
        by_piece.push((index, name));
    }

    let mut out = GroupScopes::new();
    let mut offset = 0;
    for (i, pattern) in patterns.iter().enumerate() {
        let piece = i + 1;
        let scope = by_piece
            .iter()
            .find(|(idx, _)| *idx == piece)
            .map(|(_, name)| name.clone());
        out.insert(piece + offset, scope);
        offset += count_match_groups(pattern, case_insensitive)?;
    }
    Ok(out)
}
