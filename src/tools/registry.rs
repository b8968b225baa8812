//! Capability registry with tolerant name resolution.
//!
//! Storage keys are canonical lowercase names. Resolution is a separate step:
//! exact (case-insensitive) first, then a bounded fuzzy match that only
//! succeeds when the best candidate is unambiguous.

use std::collections::BTreeMap;

use super::capability::Capability;

/// Largest edit distance fuzzy resolution will accept
const MAX_FUZZY_DISTANCE: usize = 2;

/// Name → capability lookup, built once and read-only afterwards
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    capabilities: BTreeMap<String, Capability>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability under its canonical name, replacing any previous one
    pub fn register(&mut self, capability: Capability) {
        let key = capability.name().to_lowercase();
        if self.capabilities.insert(key.clone(), capability).is_some() {
            log::warn!("Capability {} registered twice; keeping the latest", key);
        }
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.register(capability);
        self
    }

    /// Lookup by exact canonical name
    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.capabilities.get(name)
    }

    /// Resolve a requested name: exact (case-insensitive), then fuzzy
    pub fn resolve(&self, name: &str) -> Option<&Capability> {
        let wanted = name.trim().to_lowercase();
        if let Some(capability) = self.capabilities.get(&wanted) {
            return Some(capability);
        }

        let matched = fuzzy_match(&wanted, self.capabilities.keys().map(String::as_str))?;
        log::debug!("Resolved capability {} -> {}", name, matched);
        self.capabilities.get(matched)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.capabilities.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.values()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

/// Pick the single closest candidate within the distance bound.
///
/// Names are compared lowercase with `_` folded to `.`. A candidate is
/// eligible when its distance is at most 2 and at most a quarter of the
/// longer name; a tie for the best distance resolves to nothing.
pub fn fuzzy_match<'a>(name: &str, candidates: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let wanted = fold(name);
    let mut best: Option<(usize, &'a str)> = None;
    let mut tied = false;

    for candidate in candidates {
        let folded = fold(candidate);
        let distance = levenshtein(&wanted, &folded);
        let longest = wanted.chars().count().max(folded.chars().count());
        if distance > MAX_FUZZY_DISTANCE || distance * 4 > longest {
            continue;
        }
        match best {
            Some((d, _)) if distance > d => {}
            Some((d, _)) if distance == d => tied = true,
            _ => {
                best = Some((distance, candidate));
                tied = false;
            }
        }
    }

    match best {
        Some((_, candidate)) if !tied => Some(candidate),
        _ => None,
    }
}

fn fold(name: &str) -> String {
    name.to_lowercase().replace('_', ".")
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
