//! Splitting command-line tokens into known and residual ones.
//!
//! clap rejects tokens it does not recognise, so permissive parsing first
//! walks the tokens with the parser's option table and arities:
//!
//! - Known options keep the values they can take.
//! - Unknown options go to the residual list, together with one following
//!   value token unless the option is written `--key=value` or the token is
//!   a choice of a positional that is still waiting for one.
//! - Bare tokens are handed to the positionals in order; tokens left over
//!   once every positional is full are residual.
//!
//! Known positional tokens are emitted after a `--` so clap never mistakes
//! them for options. clap fills positionals strictly by index, so an
//! optional positional declared before a required one is given a later
//! index (see [`positional_order`]) and its tokens are emitted in that
//! order.

use std::collections::{HashMap, HashSet};

use multiplex_core::{ArgumentSpec, NameOrFlags};

use super::builder::HELP_FLAGS;
use super::values::choice_name;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Partition {
    pub(super) known: Vec<String>,
    pub(super) unknown: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Arity {
    min: usize,
    max: Option<usize>,
}

impl Arity {
    const FLAG: Self = Self { min: 0, max: Some(0) };

    fn of(spec: &ArgumentSpec) -> Self {
        if spec.action.is_flag() {
            return Self::FLAG;
        }
        match spec.nargs {
            None => Self { min: 1, max: Some(1) },
            Some(nargs) => Self {
                min: nargs.min_values(),
                max: nargs.max_values(),
            },
        }
    }

    fn takes_values(self) -> bool {
        self.max != Some(0)
    }
}

enum Cluster {
    /// Every character is a known short option; the last one may still
    /// need separate value tokens.
    Known(Option<Arity>),
    Unknown,
}

/// Choice sets of positionals that restrict their values.
struct Selectors {
    pending: Vec<HashSet<String>>,
}

impl Selectors {
    fn new(arguments: &[ArgumentSpec]) -> Self {
        let pending = arguments
            .iter()
            .filter(|a| a.is_positional())
            .filter_map(|a| a.choices.as_ref())
            .map(|choices| choices.iter().map(choice_name).collect())
            .collect();
        Self { pending }
    }

    fn accepts(&self, token: &str) -> bool {
        self.pending.iter().any(|choices| choices.contains(token))
    }

    fn observe(&mut self, token: &str) {
        if let Some(index) = self.pending.iter().position(|choices| choices.contains(token)) {
            self.pending.remove(index);
        }
    }
}

pub(super) fn partition(arguments: &[ArgumentSpec], help: bool, tokens: &[String]) -> Partition {
    let mut options: HashMap<&str, Arity> = HashMap::new();
    let mut positional_arities = Vec::new();
    for spec in arguments {
        match &spec.name_or_flags {
            NameOrFlags::Optional(flags) => {
                for flag in flags {
                    options.insert(flag.as_str(), Arity::of(spec));
                }
            }
            NameOrFlags::Positional(_) => positional_arities.push(Arity::of(spec)),
        }
    }
    if help {
        for flag in HELP_FLAGS {
            options.insert(*flag, Arity::FLAG);
        }
    }
    let mut selectors = Selectors::new(arguments);

    let mut known = Vec::new();
    let mut unknown: Vec<(usize, String)> = Vec::new();
    let mut bare: Vec<(usize, String)> = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];

        if token == "--" {
            bare.extend((i + 1..tokens.len()).map(|j| (j, tokens[j].clone())));
            break;
        }

        if let Some(arity) = options.get(token.as_str()) {
            known.push(token.clone());
            i = take_values(tokens, i + 1, *arity, &mut known);
            continue;
        }

        if !is_option_like(token) {
            selectors.observe(token);
            bare.push((i, token.clone()));
            i += 1;
            continue;
        }

        if let Some(name) = token.strip_prefix("--") {
            if let Some((flag, _)) = name.split_once('=') {
                if options.contains_key(format!("--{flag}").as_str()) {
                    known.push(token.clone());
                } else {
                    unknown.push((i, token.clone()));
                }
                i += 1;
                continue;
            }
            i = absorb_unknown(tokens, i, &selectors, &mut unknown);
            continue;
        }

        match short_cluster(token, &options) {
            Cluster::Known(pending) => {
                known.push(token.clone());
                i = match pending {
                    Some(arity) => take_values(tokens, i + 1, arity, &mut known),
                    None => i + 1,
                };
            }
            Cluster::Unknown => i = absorb_unknown(tokens, i, &selectors, &mut unknown),
        }
    }

    let counts = allocate_positionals(&positional_arities, bare.len());
    let taken: usize = counts.iter().sum();
    let mut slots = Vec::with_capacity(counts.len());
    let mut bare = bare.into_iter();
    for count in &counts {
        let slot: Vec<String> = bare.by_ref().take(*count).map(|(_, t)| t).collect();
        slots.push(slot);
    }
    unknown.extend(bare);

    if taken > 0 {
        known.push("--".to_string());
        for index in positional_order(arguments) {
            known.append(&mut slots[index]);
        }
    }

    unknown.sort_by_key(|(index, _)| *index);
    Partition {
        known,
        unknown: unknown.into_iter().map(|(_, t)| t).collect(),
    }
}

/// Order in which clap indexes the positionals: required ones first, then
/// the rest, each group in declaration order. Entries index the
/// positionals of `arguments`.
pub(super) fn positional_order(arguments: &[ArgumentSpec]) -> Vec<usize> {
    let arities: Vec<Arity> = arguments
        .iter()
        .filter(|a| a.is_positional())
        .map(Arity::of)
        .collect();
    let (required, optional): (Vec<usize>, Vec<usize>) = (0..arities.len()).partition(|&i| arities[i].min > 0);
    required.into_iter().chain(optional).collect()
}

/// Returns `true` when clap's positional indexes differ from declaration
/// order.
pub(super) fn reorders_positionals(arguments: &[ArgumentSpec]) -> bool {
    positional_order(arguments).iter().enumerate().any(|(rank, index)| rank != *index)
}

/// Copies up to `arity.max` value tokens starting at `start`; returns the
/// index of the first token not taken.
fn take_values(tokens: &[String], start: usize, arity: Arity, known: &mut Vec<String>) -> usize {
    let mut i = start;
    let mut taken = 0;
    while i < tokens.len() && arity.max.is_none_or(|max| taken < max) {
        let token = &tokens[i];
        if token == "--" || is_option_like(token) {
            break;
        }
        known.push(token.clone());
        taken += 1;
        i += 1;
    }
    i
}

fn absorb_unknown(
    tokens: &[String],
    start: usize,
    selectors: &Selectors,
    unknown: &mut Vec<(usize, String)>,
) -> usize {
    unknown.push((start, tokens[start].clone()));
    match tokens.get(start + 1) {
        Some(next) if next != "--" && !is_option_like(next) && !selectors.accepts(next) => {
            unknown.push((start + 1, next.clone()));
            start + 2
        }
        _ => start + 1,
    }
}

fn short_cluster(token: &str, options: &HashMap<&str, Arity>) -> Cluster {
    let body = token.trim_start_matches('-');
    for (offset, c) in body.char_indices() {
        let Some(arity) = options.get(format!("-{c}").as_str()) else {
            return Cluster::Unknown;
        };
        if arity.takes_values() {
            let attached = &body[offset + c.len_utf8()..];
            return if attached.is_empty() {
                Cluster::Known(Some(*arity))
            } else {
                Cluster::Known(None)
            };
        }
    }
    Cluster::Known(None)
}

/// Number of bare tokens each positional consumes, in declaration order.
///
/// Each positional takes as many tokens as it can while leaving enough for
/// the minimums of the positionals after it.
fn allocate_positionals(arities: &[Arity], available: usize) -> Vec<usize> {
    let mut used = 0;
    let mut counts = Vec::with_capacity(arities.len());
    for (index, arity) in arities.iter().enumerate() {
        let reserved: usize = arities[index + 1..].iter().map(|a| a.min).sum();
        let room = available.saturating_sub(used).saturating_sub(reserved);
        let take = match arity.max {
            Some(max) => max.min(room),
            None => room,
        };
        let count = take.max(arity.min).min(available - used);
        counts.push(count);
        used += count;
    }
    counts
}

/// Returns `true` for tokens that look like an option rather than a value.
pub(crate) fn is_option_like(token: &str) -> bool {
    token.len() > 1 && token.starts_with('-') && !is_negative_number(token)
}

fn is_negative_number(token: &str) -> bool {
    let Some(digits) = token.strip_prefix('-') else {
        return false;
    };
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    match digits.split_once('.') {
        None => !digits.is_empty() && all_digits(digits),
        Some((whole, frac)) => !frac.is_empty() && all_digits(whole) && all_digits(frac),
    }
}
