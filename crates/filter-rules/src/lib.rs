//! Window matching rules and the filter decision engine.
//!
//! Rules are stored as [`RuleSpec`] records keyed by name and compiled into
//! [`Rule`]s. A [`RuleEngine`] keeps the compiled set partitioned by
//! [`RuleType`] and answers one question per focus change:
//!
//! - any active IGNORE rule: [`Decision::NoOp`], leave the filter alone;
//! - else any active EXCLUDE rule: [`Decision::Off`];
//! - else the first active INCLUDE rule: [`Decision::On`] with its filter;
//! - else [`Decision::Off`].

use std::result::Result as StdResult;

mod engine;
mod matcher;
mod record;
mod records;
mod rule;

pub use engine::{Decision, RuleEngine, RulePersistence, RuleSet};
pub use matcher::TextMatcher;
pub use record::{DEFAULT_FILTER, RuleSpec, RuleType, TitleSource};
pub use records::{
    RejectedRule, RuleRecords, RulesCodec, RulesDocument, RulesReport, engine_for_document,
};
pub use rule::Rule;

use thiserror::Error;

/// Errors raised while building a rule.
#[derive(Debug, Error)]
pub enum Error {
    /// Neither `path` nor `path_regex` is set.
    #[error("rule has no path condition")]
    MissingPathCondition,
    /// A pattern failed to compile.
    #[error("invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        /// The pattern as written.
        pattern: String,
        /// Compiler error.
        #[source]
        source: regex::Error,
    },
    /// `title_regex` is set but empty.
    #[error("title pattern is empty")]
    EmptyTitlePattern,
    /// Opacity is not a finite number.
    #[error("opacity must be a number between 0 and 1, got {0}")]
    InvalidOpacity(f32),
}

/// Convenient result type for rule construction.
pub type Result<T> = StdResult<T, Error>;
