// src/search/fixtures.rs
//! Deterministic literal grammar and predicate tasks
//!
//! Small, fully predictable collaborators for exercising the engine in
//! tests and benchmarks. [`LiteralGrammar`] enumerates integer literals
//! `0, 1, 2, ...` at description lengths `1, 2, 3, ...` (times a spacing
//! factor) and the boolean literals `false`, `true` at lengths `1, 2`.

use crate::search::grammar::{Candidate, Grammar, Production};
use crate::search::task::{Example, Task};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Types of the literal grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiteralType {
    Int,
    Bool,
}

impl fmt::Display for LiteralType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralType::Int => write!(f, "int"),
            LiteralType::Bool => write!(f, "bool"),
        }
    }
}

/// Terms of the literal grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Literal {
    Int(u64),
    Bool(bool),
}

impl Literal {
    pub fn literal_type(&self) -> LiteralType {
        match self {
            Literal::Int(_) => LiteralType::Int,
            Literal::Bool(_) => LiteralType::Bool,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Grammar over integer and boolean literals
#[derive(Debug, Clone)]
pub struct LiteralGrammar {
    /// Description length of one step (`0` costs one step, `1` two, ...)
    spacing: f64,
}

impl Default for LiteralGrammar {
    fn default() -> Self {
        Self { spacing: 1.0 }
    }
}

impl LiteralGrammar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grammar with a custom step; a spacing of 0.25 puts four integer
    /// literals in every unit-wide window
    pub fn with_spacing(spacing: f64) -> Self {
        Self { spacing }
    }

    /// Description length of a literal
    pub fn description_length(&self, literal: &Literal) -> f64 {
        let steps = match literal {
            Literal::Int(n) => *n + 1,
            Literal::Bool(false) => 1,
            Literal::Bool(true) => 2,
        };
        steps as f64 * self.spacing
    }
}

impl Grammar for LiteralGrammar {
    type Type = LiteralType;
    type Term = Literal;
    type Context = ();

    fn enumerate<'a>(
        &'a self,
        _context: &Self::Context,
        _environment: &[Self::Type],
        request: &Self::Type,
        lower_bound: f64,
        upper_bound: f64,
        _max_depth: usize,
    ) -> Box<dyn Iterator<Item = Candidate<Self::Type, Self::Term>> + 'a> {
        let literals: Box<dyn Iterator<Item = Literal> + 'a> = match request {
            LiteralType::Int => {
                let first = ((lower_bound.max(0.0) / self.spacing).floor() as u64).saturating_sub(1);
                Box::new((first..).map(Literal::Int))
            }
            LiteralType::Bool => Box::new([false, true].into_iter().map(Literal::Bool)),
        };
        let request = *request;

        Box::new(
            literals
                .map(move |literal| (self.description_length(&literal), literal))
                .skip_while(move |(length, _)| *length <= lower_bound)
                .take_while(move |(length, _)| *length <= upper_bound)
                .map(move |(description_length, term)| Candidate {
                    description_length,
                    refined_type: request,
                    term,
                }),
        )
    }

    fn log_prior(&self, request: &Self::Type, term: &Self::Term) -> f64 {
        if term.literal_type() == *request {
            -self.description_length(term)
        } else {
            f64::NEG_INFINITY
        }
    }

    fn log_variable(&self) -> f64 {
        0.0
    }

    fn productions(&self) -> Vec<Production> {
        [("0", 1.0), ("succ", 1.0), ("false", 1.0), ("true", 2.0)]
            .into_iter()
            .map(|(expression, steps)| Production {
                expression: expression.to_string(),
                log_probability: -steps * self.spacing,
            })
            .collect()
    }

    fn parse(&self, text: &str) -> Result<Self::Term, String> {
        match text.trim() {
            "true" => Ok(Literal::Bool(true)),
            "false" => Ok(Literal::Bool(false)),
            other => other
                .parse::<u64>()
                .map(Literal::Int)
                .map_err(|e| format!("not a literal: {}", e)),
        }
    }

    fn can_have_type(&self, term: &Self::Term, request: &Self::Type) -> bool {
        term.literal_type() == *request
    }
}

type Scorer = Arc<dyn Fn(&Literal) -> f64 + Send + Sync>;

/// Task whose oracle is an arbitrary scoring closure
#[derive(Clone)]
pub struct PredicateTask {
    name: String,
    request: LiteralType,
    examples: Vec<Example>,
    scorer: Scorer,
    evaluation_delay: Option<Duration>,
}

impl PredicateTask {
    pub fn new(
        name: impl Into<String>,
        request: LiteralType,
        scorer: impl Fn(&Literal) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            request,
            examples: Vec::new(),
            scorer: Arc::new(scorer),
            evaluation_delay: None,
        }
    }

    /// All-or-nothing task solved exactly by `accepted`
    pub fn accepting(name: impl Into<String>, request: LiteralType, accepted: Vec<Literal>) -> Self {
        Self::new(name, request, move |literal| {
            if accepted.contains(literal) {
                0.0
            } else {
                f64::NEG_INFINITY
            }
        })
    }

    pub fn with_examples(mut self, examples: Vec<Example>) -> Self {
        self.examples = examples;
        self
    }

    /// Make every oracle call take `delay`; calls whose timeout is shorter
    /// give up at the timeout and score as invalid
    pub fn with_evaluation_delay(mut self, delay: Duration) -> Self {
        self.evaluation_delay = Some(delay);
        self
    }
}

impl fmt::Debug for PredicateTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateTask")
            .field("name", &self.name)
            .field("request", &self.request)
            .finish()
    }
}

impl Task<LiteralGrammar> for PredicateTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn request(&self) -> &LiteralType {
        &self.request
    }

    fn examples(&self) -> &[Example] {
        &self.examples
    }

    fn log_likelihood(&self, term: &Literal, timeout: Option<Duration>) -> f64 {
        if let Some(delay) = self.evaluation_delay {
            match timeout {
                Some(timeout) if timeout < delay => {
                    std::thread::sleep(timeout);
                    return f64::NEG_INFINITY;
                }
                _ => std::thread::sleep(delay),
            }
        }
        (self.scorer)(term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(grammar: &LiteralGrammar, request: LiteralType, lower: f64, upper: f64) -> Vec<Literal> {
        grammar
            .enumerate(&(), &[], &request, lower, upper, 99)
            .map(|candidate| candidate.term)
            .collect()
    }

    #[test]
    fn test_integer_windows() {
        let grammar = LiteralGrammar::new();
        assert_eq!(terms(&grammar, LiteralType::Int, 0.0, 1.0), vec![Literal::Int(0)]);
        assert_eq!(
            terms(&grammar, LiteralType::Int, 1.0, 3.0),
            vec![Literal::Int(1), Literal::Int(2)]
        );
        assert!(terms(&grammar, LiteralType::Int, 3.0, 3.5).is_empty());
    }

    #[test]
    fn test_spacing_packs_windows() {
        let grammar = LiteralGrammar::with_spacing(0.25);
        assert_eq!(terms(&grammar, LiteralType::Int, 1.0, 2.0).len(), 4);
    }

    #[test]
    fn test_boolean_windows() {
        let grammar = LiteralGrammar::new();
        assert_eq!(
            terms(&grammar, LiteralType::Bool, 0.0, 10.0),
            vec![Literal::Bool(false), Literal::Bool(true)]
        );
        assert_eq!(terms(&grammar, LiteralType::Bool, 1.0, 2.0), vec![Literal::Bool(true)]);
    }

    #[test]
    fn test_parse_and_type_check() {
        let grammar = LiteralGrammar::new();
        let two = grammar.parse("2").unwrap();
        assert_eq!(two, Literal::Int(2));
        assert!(grammar.can_have_type(&two, &LiteralType::Int));
        assert!(!grammar.can_have_type(&grammar.parse("true").unwrap(), &LiteralType::Int));
        assert!(grammar.parse("(+ 1 1)").is_err());
    }

    #[test]
    fn test_log_prior() {
        let grammar = LiteralGrammar::new();
        assert_eq!(grammar.log_prior(&LiteralType::Int, &Literal::Int(2)), -3.0);
        assert_eq!(
            grammar.log_prior(&LiteralType::Int, &Literal::Bool(true)),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn test_evaluation_delay_respects_timeout() {
        let task = PredicateTask::accepting("t", LiteralType::Int, vec![Literal::Int(0)])
            .with_evaluation_delay(Duration::from_millis(50));

        let timed_out = task.log_likelihood(&Literal::Int(0), Some(Duration::from_millis(1)));
        assert_eq!(timed_out, f64::NEG_INFINITY);

        let scored = task.log_likelihood(&Literal::Int(0), None);
        assert_eq!(scored, 0.0);
    }
}
