// src/search/frontier.rs
//! Scored solution sets
//!
//! A frontier holds the valid solutions found for one task. Entries are
//! unique by term and kept in discovery order; [`Frontier::combine`] takes
//! the union of two frontiers and [`Frontier::top_k`] keeps the best
//! entries by posterior (`log_prior + log_likelihood`).

use crate::search::grammar::Term;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A term that passed the task oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierEntry<T> {
    pub program: T,

    /// Log prior under the grammar (<= 0)
    pub log_prior: f64,

    /// Oracle score (finite)
    pub log_likelihood: f64,
}

impl<T> FrontierEntry<T> {
    pub fn new(program: T, log_prior: f64, log_likelihood: f64) -> Self {
        Self {
            program,
            log_prior,
            log_likelihood,
        }
    }

    /// Unnormalized log posterior
    pub fn log_posterior(&self) -> f64 {
        self.log_prior + self.log_likelihood
    }
}

/// Ordered, duplicate-free set of solutions for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "T: Term")]
pub struct Frontier<T> {
    task: String,
    entries: Vec<FrontierEntry<T>>,
}

impl<T: Term> Frontier<T> {
    /// Empty frontier for a task
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            entries: Vec::new(),
        }
    }

    /// Build a frontier, dropping later duplicates of the same term
    pub fn from_entries(task: impl Into<String>, entries: Vec<FrontierEntry<T>>) -> Self {
        let mut frontier = Self::new(task);
        for entry in entries {
            frontier.insert(entry);
        }
        frontier
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FrontierEntry<T>] {
        &self.entries
    }

    pub fn contains(&self, program: &T) -> bool {
        self.entries.iter().any(|entry| &entry.program == program)
    }

    /// Add an entry unless its term is already present.
    /// Returns whether the entry was added.
    pub fn insert(&mut self, entry: FrontierEntry<T>) -> bool {
        if self.contains(&entry.program) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Union with another frontier. Existing entries win over duplicates.
    pub fn combine(mut self, other: Frontier<T>) -> Self {
        for entry in other.entries {
            self.insert(entry);
        }
        self
    }

    /// Keep the `k` entries with greatest log posterior.
    ///
    /// Ties are broken by the term's printed form so the result does not
    /// depend on discovery order.
    pub fn top_k(mut self, k: usize) -> Self {
        if self.entries.len() <= k {
            return self;
        }
        self.entries.sort_by(|a, b| {
            b.log_posterior()
                .partial_cmp(&a.log_posterior())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.program.to_string().cmp(&b.program.to_string()))
        });
        self.entries.truncate(k);
        self
    }

    /// Entry with greatest log posterior
    pub fn best(&self) -> Option<&FrontierEntry<T>> {
        self.entries.iter().max_by(|a, b| {
            a.log_posterior()
                .partial_cmp(&b.log_posterior())
                .unwrap_or(Ordering::Equal)
        })
    }
}
