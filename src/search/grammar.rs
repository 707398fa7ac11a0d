// src/search/grammar.rs
//! Term enumerator interface
//!
//! The engine does not own a type system or a term representation. A
//! [`Grammar`] supplies both, and is consumed through a narrow capability:
//! exhaustive, deterministic enumeration of every well-typed term whose
//! description length falls in a closed-open window `(lower, upper]`, in
//! non-decreasing order of description length.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// Symbolic expression produced by a grammar.
///
/// Equality and hashing are structural. Terms cross process boundaries
/// (isolated workers), so they must serialize.
pub trait Term:
    Clone + Eq + Hash + fmt::Debug + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> Term for T where
    T: Clone + Eq + Hash + fmt::Debug + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// One enumerated candidate
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<Ty, T> {
    /// Negative log prior of the term under the grammar
    pub description_length: f64,

    /// Request type refined by unification against the term
    pub refined_type: Ty,

    pub term: T,
}

impl<Ty, T> Candidate<Ty, T> {
    /// Log prior of the term (always <= 0)
    pub fn log_prior(&self) -> f64 {
        -self.description_length
    }
}

/// Weighted production, as shipped to external solvers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Production {
    pub expression: String,
    pub log_probability: f64,
}

/// Probabilistic grammar over typed terms
pub trait Grammar: Send + Sync + 'static {
    /// Type of requested and refined types
    type Type: Clone + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Term representation
    type Term: Term;

    /// Type-inference context threaded through enumeration
    type Context: Default + Clone + Send;

    /// Enumerate every term of `request` with description length in
    /// `(lower_bound, upper_bound]`.
    ///
    /// The sequence must be finite, deterministic, and ordered by
    /// non-decreasing description length.
    fn enumerate<'a>(
        &'a self,
        context: &Self::Context,
        environment: &[Self::Type],
        request: &Self::Type,
        lower_bound: f64,
        upper_bound: f64,
        max_depth: usize,
    ) -> Box<dyn Iterator<Item = Candidate<Self::Type, Self::Term>> + 'a>;

    /// Log prior of `term` at type `request`
    fn log_prior(&self, request: &Self::Type, term: &Self::Term) -> f64;

    /// Log probability of using a variable
    fn log_variable(&self) -> f64;

    /// Weighted productions in a solver-readable form
    fn productions(&self) -> Vec<Production>;

    /// Parse program text produced by an external solver
    fn parse(&self, text: &str) -> std::result::Result<Self::Term, String>;

    /// Whether `term` can be given type `request`
    fn can_have_type(&self, term: &Self::Term, request: &Self::Type) -> bool;
}
