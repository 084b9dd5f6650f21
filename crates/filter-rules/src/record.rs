//! Serialized form of a rule.

use serde::{Deserialize, Serialize};

/// Filter used by INCLUDE rules that do not name one.
pub const DEFAULT_FILTER: &str = "inversion";

/// How a matching rule affects the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    /// Turn the filter on.
    #[default]
    Include,
    /// Force the filter off.
    Exclude,
    /// Leave the filter as it is.
    Ignore,
}

/// Which title a title condition is tested against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TitleSource {
    /// The window's own title.
    #[default]
    Current,
    /// The title of the window's root.
    Root,
    /// Any title on the chain from the window to its root.
    Any,
}

/// One rule as stored in the rules file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSpec {
    /// Exact executable path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Executable path pattern, used when `path` is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_regex: Option<String>,
    /// Exact title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Title pattern, used when `title` is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_regex: Option<String>,
    /// Which title the title condition applies to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub look_for_title: Option<TitleSource>,
    /// Rule type.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub rule_type: Option<RuleType>,
    /// Keep matching processes that matched once, until the rules reload.
    #[serde(skip_serializing_if = "is_false")]
    pub remember_processes: bool,
    /// Filter to apply (INCLUDE only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_filter: Option<String>,
    /// Filter opacity in `[0, 1]` (INCLUDE only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f32>,
    /// Older files mark exclusions with `exclude: true`. Read only.
    #[serde(skip_serializing)]
    pub exclude: Option<bool>,
}

/// `skip_serializing_if` helper.
fn is_false(value: &bool) -> bool {
    !*value
}

impl RuleSpec {
    /// INCLUDE rule for an exact executable path.
    pub fn for_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// INCLUDE rule for an executable path pattern.
    pub fn for_path_regex(pattern: impl Into<String>) -> Self {
        Self {
            path_regex: Some(pattern.into()),
            ..Self::default()
        }
    }

    /// Add an exact title condition.
    pub fn with_title(mut self, title: impl Into<String>, source: TitleSource) -> Self {
        self.title = Some(title.into());
        self.look_for_title = Some(source);
        self
    }

    /// Add a title pattern condition.
    pub fn with_title_regex(mut self, pattern: impl Into<String>, source: TitleSource) -> Self {
        self.title_regex = Some(pattern.into());
        self.look_for_title = Some(source);
        self
    }

    /// Set the rule type.
    pub fn with_type(mut self, rule_type: RuleType) -> Self {
        self.rule_type = Some(rule_type);
        self
    }

    /// Set the filter and opacity used when the rule turns the filter on.
    pub fn with_filter(mut self, filter: impl Into<String>, opacity: f32) -> Self {
        self.color_filter = Some(filter.into());
        self.opacity = Some(opacity);
        self
    }

    /// Enable process stickiness.
    pub fn remembering_processes(mut self) -> Self {
        self.remember_processes = true;
        self
    }

    /// Rule type, defaulting to INCLUDE.
    pub fn kind(&self) -> RuleType {
        self.rule_type.unwrap_or_default()
    }

    /// Title source, defaulting to the current title.
    pub fn title_source(&self) -> TitleSource {
        self.look_for_title.unwrap_or_default()
    }

    /// Canonical form.
    ///
    /// Plain conditions shadow their regex twins, a rule without a title
    /// condition has no title source, the legacy `exclude` flag becomes a
    /// type, and filter settings exist only on INCLUDE rules (defaulted,
    /// with opacity clamped to `[0, 1]`).
    pub fn normalized(mut self) -> Self {
        if self.path.is_some() {
            self.path_regex = None;
        }
        if self.title.is_some() {
            self.title_regex = None;
        }
        if self.title.is_none() && self.title_regex.is_none() {
            self.look_for_title = None;
        }

        let legacy_exclude = self.exclude.take().unwrap_or(false);
        let kind = match self.rule_type {
            Some(kind) => kind,
            None if legacy_exclude => RuleType::Exclude,
            None => RuleType::Include,
        };
        self.rule_type = Some(kind);

        if kind == RuleType::Include {
            if self.color_filter.is_none() {
                self.color_filter = Some(DEFAULT_FILTER.to_string());
            }
            let opacity = self.opacity.unwrap_or(1.0);
            // NaN is left for rule construction to reject.
            self.opacity = Some(if opacity.is_nan() {
                opacity
            } else {
                opacity.clamp(0.0, 1.0)
            });
        } else {
            self.color_filter = None;
            self.opacity = None;
        }
        self
    }
}
