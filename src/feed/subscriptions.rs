//! Symbol subscription bookkeeping
//!
//! Tracks which symbols the server should keep pushing. The set survives
//! reconnects so it can be replayed on every new link.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How overlapping subscriptions from independent consumers interact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPolicy {
    /// One unsubscribe removes the symbol for everyone
    Shared,
    /// A symbol stays subscribed until every subscribe has been matched by an unsubscribe
    #[default]
    RefCounted,
}

/// Trim and uppercase a ticker symbol. Blank input yields `None`.
pub fn normalize_symbol(symbol: &str) -> Option<String> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        None
    } else {
        Some(symbol.to_uppercase())
    }
}

/// Normalize a batch, dropping blanks and duplicates while keeping first-seen order
fn normalize_all(symbols: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(symbols.len());
    for symbol in symbols.iter().filter_map(|s| normalize_symbol(s)) {
        if !out.contains(&symbol) {
            out.push(symbol);
        }
    }
    out
}

/// Anything accepted where one or more symbols are expected
pub trait IntoSymbols {
    fn into_symbols(self) -> Vec<String>;
}

impl IntoSymbols for &str {
    fn into_symbols(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoSymbols for String {
    fn into_symbols(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoSymbols for &String {
    fn into_symbols(self) -> Vec<String> {
        vec![self.clone()]
    }
}

impl<S: AsRef<str>> IntoSymbols for Vec<S> {
    fn into_symbols(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

impl<S: AsRef<str>> IntoSymbols for &Vec<S> {
    fn into_symbols(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

impl<S: AsRef<str>> IntoSymbols for &[S] {
    fn into_symbols(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

impl<S: AsRef<str>, const N: usize> IntoSymbols for [S; N] {
    fn into_symbols(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

impl<S: AsRef<str>, const N: usize> IntoSymbols for &[S; N] {
    fn into_symbols(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

/// Set of uppercase symbols with per-symbol interest counts
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSet {
    policy: SubscriptionPolicy,
    interest: HashMap<String, usize>,
}

impl SubscriptionSet {
    pub fn new(policy: SubscriptionPolicy) -> Self {
        Self {
            policy,
            interest: HashMap::new(),
        }
    }

    pub fn policy(&self) -> SubscriptionPolicy {
        self.policy
    }

    /// Record interest in `symbols`.
    ///
    /// Returns the symbols that should be announced to the server: under
    /// [`SubscriptionPolicy::Shared`] every requested symbol, under
    /// [`SubscriptionPolicy::RefCounted`] only the ones that were not yet
    /// subscribed.
    pub fn add(&mut self, symbols: Vec<String>) -> Vec<String> {
        let mut announce = Vec::new();
        for symbol in normalize_all(symbols) {
            let count = self.interest.entry(symbol.clone()).or_insert(0);
            let is_new = *count == 0;
            match self.policy {
                SubscriptionPolicy::Shared => *count = 1,
                SubscriptionPolicy::RefCounted => *count += 1,
            }
            if is_new || self.policy == SubscriptionPolicy::Shared {
                announce.push(symbol);
            }
        }
        announce
    }

    /// Release interest in `symbols`.
    ///
    /// Returns the symbols that actually left the set. Unknown symbols are ignored.
    pub fn remove(&mut self, symbols: Vec<String>) -> Vec<String> {
        let mut released = Vec::new();
        for symbol in normalize_all(symbols) {
            let Some(count) = self.interest.get_mut(&symbol) else {
                continue;
            };
            match self.policy {
                SubscriptionPolicy::Shared => *count = 0,
                SubscriptionPolicy::RefCounted => *count = count.saturating_sub(1),
            }
            if *count == 0 {
                self.interest.remove(&symbol);
                released.push(symbol);
            }
        }
        released
    }

    pub fn contains(&self, symbol: &str) -> bool {
        normalize_symbol(symbol).is_some_and(|s| self.interest.contains_key(&s))
    }

    /// Number of outstanding subscribes for `symbol`
    pub fn interest(&self, symbol: &str) -> usize {
        normalize_symbol(symbol)
            .and_then(|s| self.interest.get(&s).copied())
            .unwrap_or(0)
    }

    /// Sorted copy of the subscribed symbols
    pub fn snapshot(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.interest.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn len(&self) -> usize {
        self.interest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interest.is_empty()
    }

    pub fn clear(&mut self) {
        self.interest.clear();
    }
}
