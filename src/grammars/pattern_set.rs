use std::fmt::{Debug, Formatter};
use std::sync::OnceLock;

use onig::{Region, SearchOptions};

use crate::error::CompileError;
use crate::grammars::compiled::ModeId;
use crate::grammars::regex::{compile_onig, count_match_groups, rewrite_backreferences};

/// What happens when a rule of a scanner fires
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RuleKind {
    /// Start the given child mode
    Begin(ModeId),
    /// The terminator of the current mode
    End,
    /// The illegal pattern of the current mode
    Illegal,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ScanRule {
    pub source: String,
    pub kind: RuleKind,
    /// Declaration order in the scanner, begin rules first
    pub position: usize,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ScanMatch {
    /// Byte offset of the match start
    pub index: usize,
    /// Byte offset of the match end
    pub end: usize,
    /// The groups of the rule that fired, in that rule's own numbering. Index 0 is the
    /// whole match.
    pub groups: Vec<Option<(usize, usize)>>,
    pub kind: RuleKind,
    pub position: usize,
}

impl ScanMatch {
    pub fn is_empty(&self) -> bool {
        self.index == self.end
    }

    pub fn lexeme<'t>(&self, text: &'t str) -> &'t str {
        &text[self.index..self.end]
    }
}

#[cfg(test)]
thread_local! {
    /// How many searches the combined regexes ran on this thread
    pub(crate) static SEARCHES: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

#[derive(Debug, Copy, Clone)]
struct MatchSlot {
    /// Group of the combined regex wrapping the rule
    group: usize,
    /// Index of the rule in `MultiRegex::rules`
    rule: usize,
    /// How many groups the rule declares itself
    own_groups: usize,
}

/// All the rules merged into a single alternation so one search finds the leftmost match
/// of any of them, ties going to the rule declared first.
pub struct MultiRegex {
    regex: Option<onig::Regex>,
    slots: Vec<MatchSlot>,
    rules: Vec<ScanRule>,
}

impl MultiRegex {
    pub fn new(rules: &[ScanRule], case_insensitive: bool) -> Result<Self, CompileError> {
        if rules.is_empty() {
            return Ok(Self {
                regex: None,
                slots: Vec::new(),
                rules: Vec::new(),
            });
        }

        let mut slots = Vec::with_capacity(rules.len());
        let mut match_at = 1;
        for (i, rule) in rules.iter().enumerate() {
            let own_groups = count_match_groups(&rule.source, case_insensitive)?;
            slots.push(MatchSlot {
                group: match_at,
                rule: i,
                own_groups,
            });
            match_at += own_groups + 1;
        }

        let sources: Vec<&str> = rules.iter().map(|r| r.source.as_str()).collect();
        let pattern = rewrite_backreferences(&sources, "|");
        let regex = compile_onig(&pattern, case_insensitive)?;

        Ok(Self {
            regex: Some(regex),
            slots,
            rules: rules.to_vec(),
        })
    }

    /// Finds the first match at or after `from`
    pub fn exec(&self, text: &str, from: usize) -> Option<ScanMatch> {
        let regex = self.regex.as_ref()?;
        if from > text.len() {
            return None;
        }
        #[cfg(test)]
        SEARCHES.with(|searches| searches.set(searches.get() + 1));
        let mut region = Region::new();
        regex.search_with_options(
            text,
            from,
            text.len(),
            SearchOptions::SEARCH_OPTION_NONE,
            Some(&mut region),
        )?;

        // The first defined group is the wrapper of the rule that fired
        let slot = self
            .slots
            .iter()
            .find(|slot| region.pos(slot.group).is_some())?;
        let groups: Vec<_> = (0..=slot.own_groups)
            .map(|i| region.pos(slot.group + i))
            .collect();
        let (index, end) = groups[0]?;
        let rule = &self.rules[slot.rule];

        Some(ScanMatch {
            index,
            end,
            groups,
            kind: rule.kind,
            position: rule.position,
        })
    }
}

impl Debug for MultiRegex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MultiRegex({} rules)", self.rules.len())
    }
}

/// Scans with the sibling begin rules of a mode plus its terminator and illegal pattern.
///
/// When a begin match gets vetoed by a hook, the next scan at the same position has to skip
/// every rule up to the vetoed one, so there is one combined regex per resume point. They
/// are built the first time they are needed, except the full one which is built upfront.
///
/// The resume point itself lives with the caller: a scanner is shared by every activation
/// of its mode.
#[derive(Default)]
pub struct ResumableScanner {
    rules: Vec<ScanRule>,
    begin_count: usize,
    case_insensitive: bool,
    matchers: Vec<OnceLock<Result<MultiRegex, String>>>,
}

impl ResumableScanner {
    pub fn new(rules: Vec<ScanRule>, case_insensitive: bool) -> Result<Self, CompileError> {
        let begin_count = rules
            .iter()
            .filter(|r| matches!(r.kind, RuleKind::Begin(_)))
            .count();
        let full = MultiRegex::new(&rules, case_insensitive)?;
        let mut matchers: Vec<OnceLock<Result<MultiRegex, String>>> =
            (0..begin_count.max(1)).map(|_| OnceLock::new()).collect();
        matchers[0] = OnceLock::from(Ok(full));

        Ok(Self {
            rules,
            begin_count,
            case_insensitive,
            matchers,
        })
    }

    pub fn rules(&self) -> &[ScanRule] {
        &self.rules
    }

    fn matcher(&self, resume: usize) -> Result<Option<&MultiRegex>, String> {
        let Some(cell) = self.matchers.get(resume) else {
            return Ok(None);
        };
        let built = cell.get_or_init(|| {
            if cfg!(feature = "debug") {
                log::trace!("building matcher for resume point {resume}");
            }
            MultiRegex::new(&self.rules[resume..], self.case_insensitive)
                .map_err(|e| e.to_string())
        });
        match built {
            Ok(m) => Ok(Some(m)),
            Err(e) => Err(e.clone()),
        }
    }

    /// Finds the next match at or after `cursor`, skipping the rules before `resume`.
    ///
    /// `resume` is updated to point right after the rule that fired, wrapping back to 0 once
    /// every begin rule has been tried. If the restricted scan doesn't match at `cursor`,
    /// none of the skipped rules could have either and we scan everything again from the next
    /// character.
    pub fn exec(
        &self,
        text: &str,
        cursor: usize,
        resume: &mut usize,
    ) -> Result<Option<ScanMatch>, String> {
        if *resume >= self.matchers.len() {
            *resume = 0;
        }
        let Some(matcher) = self.matcher(*resume)? else {
            return Ok(None);
        };
        let mut found = matcher.exec(text, cursor);

        if *resume != 0 && !found.as_ref().is_some_and(|m| m.index == cursor) {
            found = match (self.matcher(0)?, next_char_boundary(text, cursor)) {
                (Some(full), Some(next)) => full.exec(text, next),
                _ => None,
            };
        }

        if let Some(m) = &found {
            *resume = m.position + 1;
            if *resume == self.begin_count {
                *resume = 0;
            }
        }
        Ok(found)
    }
}

impl Debug for ResumableScanner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ResumableScanner({} rules, {} begin)",
            self.rules.len(),
            self.begin_count
        )
    }
}

/// The offset of the character after the one at `at`, if there's one
pub(crate) fn next_char_boundary(text: &str, at: usize) -> Option<usize> {
    text.get(at..)?
        .chars()
        .next()
        .map(|c| at + c.len_utf8())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn begin_rules(patterns: &[&str]) -> Vec<ScanRule> {
        patterns
            .iter()
            .enumerate()
            .map(|(i, p)| ScanRule {
                source: p.to_string(),
                kind: RuleKind::Begin(ModeId(i as u16 + 1)),
                position: i,
            })
            .collect()
    }

    #[test]
    fn first_declared_rule_wins_at_same_index() {
        let m = MultiRegex::new(&begin_rules(&["ab", "a"]), false).unwrap();
        let found = m.exec("ab", 0).unwrap();
        assert_eq!(found.position, 0);
        assert_eq!(found.lexeme("ab"), "ab");
        assert_eq!(found.kind, RuleKind::Begin(ModeId(1)));
    }

    #[test]
    fn leftmost_match_wins_over_declaration_order() {
        let m = MultiRegex::new(&begin_rules(&["b", "a"]), false).unwrap();
        let found = m.exec("ab", 0).unwrap();
        assert_eq!(found.position, 1);
        assert_eq!(found.index, 0);
    }

    #[test]
    fn groups_are_trimmed_to_the_firing_rule() {
        let rules = begin_rules(&[r"(x)(y)", r"(\d+)-(\d+)", r"(a)\1"]);
        let m = MultiRegex::new(&rules, false).unwrap();

        let found = m.exec("ab 12-34", 0).unwrap();
        assert_eq!(found.position, 1);
        assert_eq!(found.groups, vec![Some((3, 8)), Some((3, 5)), Some((6, 8))]);

        // backreferences still point at the rule's own group once merged
        let found = m.exec("ab aa", 0).unwrap();
        assert_eq!(found.position, 2);
        assert_eq!(found.lexeme("ab aa"), "aa");
    }

    #[test]
    fn empty_rules_never_match() {
        let scanner = ResumableScanner::new(Vec::new(), false).unwrap();
        let mut resume = 0;
        assert_eq!(scanner.exec("anything", 0, &mut resume).unwrap(), None);
    }

    #[test]
    fn case_insensitive_matching() {
        let m = MultiRegex::new(&begin_rules(&["select"]), true).unwrap();
        assert!(m.exec("SeLeCt 1", 0).is_some());
    }

    #[test]
    fn resumes_after_the_vetoed_rule() {
        let mut rules = begin_rules(&["q", "r", "s", "t", "u", "x", "xy", "[a-z]"]);
        rules.push(ScanRule {
            source: "$".into(),
            kind: RuleKind::End,
            position: 8,
        });
        let scanner = ResumableScanner::new(rules, false).unwrap();
        let mut resume = 0;

        let found = scanner.exec("xyz", 0, &mut resume).unwrap().unwrap();
        assert_eq!(found.position, 5);
        assert_eq!(resume, 6);

        // pretend rule 5 got vetoed: only rules after it are considered
        let found = scanner.exec("xyz", 0, &mut resume).unwrap().unwrap();
        assert_eq!(found.position, 6);
        assert_eq!(found.lexeme("xyz"), "xy");
        assert_eq!(resume, 7);

        // the last begin rule wraps the resume point around
        let found = scanner.exec("xyz", 0, &mut resume).unwrap().unwrap();
        assert_eq!(found.position, 7);
        assert_eq!(resume, 0);
    }

    #[test]
    fn falls_back_to_full_scan_from_next_char() {
        let scanner = ResumableScanner::new(begin_rules(&["x", "y", "z"]), false).unwrap();
        let mut resume = 0;
        let found = scanner.exec("xxy", 0, &mut resume).unwrap().unwrap();
        assert_eq!(found.position, 0);
        assert_eq!(resume, 1);

        // rules 1.. find `y` at 2, not at the cursor: rescan everything from 1
        let found = scanner.exec("xxy", 0, &mut resume).unwrap().unwrap();
        assert_eq!(found.index, 1);
        assert_eq!(found.position, 0);
        assert_eq!(resume, 1);
    }

    #[test]
    fn fallback_respects_char_boundaries() {
        let scanner = ResumableScanner::new(begin_rules(&["é", "z"]), false).unwrap();
        let mut resume = 1;
        let found = scanner.exec("éé", 0, &mut resume).unwrap().unwrap();
        assert_eq!(found.index, 2);
        assert_eq!(found.lexeme("éé"), "é");
    }

    #[test]
    fn invalid_rule_fails_upfront() {
        let res = ResumableScanner::new(begin_rules(&["ok", "(broken"]), false);
        assert!(matches!(res, Err(CompileError::InvalidRegex { .. })));
    }
}
