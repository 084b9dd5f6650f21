//! Compiled rule and its matching logic.

use std::collections::HashSet;

use parking_lot::Mutex;
use win_focus_watcher::WindowInfo;

use crate::{Error, Result, RuleSpec, RuleType, TextMatcher, TitleSource};

/// A validated, compiled rule.
#[derive(Debug)]
pub struct Rule {
    /// Normalized record the rule was built from.
    spec: RuleSpec,
    /// Path condition.
    path: TextMatcher,
    /// Optional title condition.
    title: Option<TextMatcher>,
    /// Title the condition is tested against.
    source: TitleSource,
    /// Pids matched so far; present only with `remember_processes`.
    sticky: Option<Mutex<HashSet<u32>>>,
}

impl Rule {
    /// Normalize and compile `spec`.
    ///
    /// Fails when no path condition is configured, when a pattern does not
    /// compile or is an empty title pattern, or when the opacity is not a
    /// number.
    pub fn new(spec: RuleSpec) -> Result<Self> {
        let spec = spec.normalized();
        if spec.title.is_none() && spec.title_regex.as_deref() == Some("") {
            return Err(Error::EmptyTitlePattern);
        }
        let path = TextMatcher::from_parts(spec.path.as_deref(), spec.path_regex.as_deref())?
            .ok_or(Error::MissingPathCondition)?;
        let title = TextMatcher::from_parts(spec.title.as_deref(), spec.title_regex.as_deref())?;
        if let Some(opacity) = spec.opacity
            && !opacity.is_finite()
        {
            return Err(Error::InvalidOpacity(opacity));
        }
        Ok(Self {
            source: spec.title_source(),
            sticky: spec.remember_processes.then(Mutex::default),
            spec,
            path,
            title,
        })
    }

    /// Normalized record.
    pub fn spec(&self) -> &RuleSpec {
        &self.spec
    }

    /// Rule type.
    pub fn rule_type(&self) -> RuleType {
        self.spec.kind()
    }

    /// Filter and opacity, for INCLUDE rules.
    pub fn filter(&self) -> Option<(&str, f32)> {
        Some((self.spec.color_filter.as_deref()?, self.spec.opacity?))
    }

    /// True when the rule applies to `info`.
    ///
    /// With `remember_processes`, a match records the window's pid and any
    /// later window of that process is active regardless of its path or
    /// title. Pid `0` (unknown) is never remembered.
    pub fn is_active(&self, info: &WindowInfo) -> bool {
        if let Some(sticky) = &self.sticky
            && info.pid != 0
            && sticky.lock().contains(&info.pid)
        {
            return true;
        }
        let matched = self.path.is_match(&info.path) && self.title_matches(info);
        if matched
            && let Some(sticky) = &self.sticky
            && info.pid != 0
        {
            sticky.lock().insert(info.pid);
        }
        matched
    }

    /// Title check for the configured source.
    fn title_matches(&self, info: &WindowInfo) -> bool {
        let Some(title) = &self.title else {
            return true;
        };
        match self.source {
            TitleSource::Current => title.is_match(&info.title),
            TitleSource::Root => title.is_match(&info.root_title),
            TitleSource::Any => title.matches_any(info.titles()),
        }
    }
}

#[cfg(test)]
mod tests {
    use win_focus_watcher::WindowHandle;

    use super::*;

    fn window(path: &str, title: &str, pid: u32) -> WindowInfo {
        WindowInfo::new(WindowHandle(1))
            .with_path(path)
            .with_title(title)
            .with_pid(pid)
    }

    #[test]
    fn construction_requires_a_path_condition() {
        let err = Rule::new(RuleSpec::default()).unwrap_err();
        assert!(matches!(err, Error::MissingPathCondition));

        let err = Rule::new(RuleSpec {
            path_regex: Some(String::new()),
            ..RuleSpec::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::MissingPathCondition));
    }

    #[test]
    fn construction_rejects_bad_patterns_and_nan_opacity() {
        assert!(matches!(
            Rule::new(RuleSpec::for_path_regex("[")),
            Err(Error::InvalidRegex { .. })
        ));
        assert!(matches!(
            Rule::new(RuleSpec::for_path("a.exe").with_filter("x", f32::NAN)),
            Err(Error::InvalidOpacity(_))
        ));
    }

    #[test]
    fn empty_title_pattern_is_rejected() {
        let spec = RuleSpec::for_path("a.exe").with_title_regex("", TitleSource::Current);
        let err = Rule::new(spec).unwrap_err();
        assert!(matches!(err, Error::EmptyTitlePattern));

        let plain_wins = RuleSpec {
            title: Some("Find".into()),
            ..RuleSpec::for_path("a.exe").with_title_regex("", TitleSource::Current)
        };
        assert!(Rule::new(plain_wins).is_ok());
    }

    #[test]
    fn path_only_rule_ignores_titles() {
        let rule = Rule::new(RuleSpec::for_path(r"C:\a.exe")).unwrap();
        assert!(rule.is_active(&window(r"C:\a.exe", "anything", 1)));
        assert!(!rule.is_active(&window(r"C:\b.exe", "anything", 1)));
    }

    #[test]
    fn title_sources() {
        let info = window(r"C:\a.exe", "Find", 1).with_root_title("Editor");

        let current = Rule::new(
            RuleSpec::for_path(r"C:\a.exe").with_title("Find", TitleSource::Current),
        )
        .unwrap();
        assert!(current.is_active(&info));

        let root = Rule::new(
            RuleSpec::for_path(r"C:\a.exe").with_title("Find", TitleSource::Root),
        )
        .unwrap();
        assert!(!root.is_active(&info));

        let root_regex = Rule::new(
            RuleSpec::for_path(r"C:\a.exe").with_title_regex("Edit.*", TitleSource::Root),
        )
        .unwrap();
        assert!(root_regex.is_active(&info));
    }

    #[test]
    fn any_mode_checks_every_title_in_the_chain() {
        let info = window(r"C:\a.exe", "Leaf", 1).with_titles(["Leaf", "Panel", "Main Window"]);

        let plain = Rule::new(
            RuleSpec::for_path(r"C:\a.exe").with_title("Panel", TitleSource::Any),
        )
        .unwrap();
        assert!(plain.is_active(&info));

        let partial = Rule::new(
            RuleSpec::for_path(r"C:\a.exe").with_title("Main", TitleSource::Any),
        )
        .unwrap();
        assert!(!partial.is_active(&info));

        let regex = Rule::new(
            RuleSpec::for_path(r"C:\a.exe").with_title_regex("Main.*", TitleSource::Any),
        )
        .unwrap();
        assert!(regex.is_active(&info));
    }

    #[test]
    fn remembered_process_stays_active() {
        let rule = Rule::new(
            RuleSpec::for_path(r"C:\game.exe")
                .with_title("Launcher", TitleSource::Current)
                .remembering_processes(),
        )
        .unwrap();

        assert!(!rule.is_active(&window(r"C:\game.exe", "Level 1", 42)));
        assert!(rule.is_active(&window(r"C:\game.exe", "Launcher", 42)));
        assert!(rule.is_active(&window(r"C:\game.exe", "Level 1", 42)));
        assert!(rule.is_active(&window(r"C:\other.exe", "", 42)));
        assert!(!rule.is_active(&window(r"C:\game.exe", "Level 1", 43)));
    }

    #[test]
    fn unknown_pid_is_never_remembered() {
        let rule = Rule::new(RuleSpec::for_path("").remembering_processes()).unwrap();
        assert!(rule.is_active(&window("", "Desktop", 0)));
        assert!(!rule.is_active(&window(r"C:\x.exe", "", 0)));
    }

    #[test]
    fn filter_only_for_include() {
        let include = Rule::new(RuleSpec::for_path("a").with_filter("grayscale", 0.4)).unwrap();
        assert_eq!(include.filter(), Some(("grayscale", 0.4)));
        let exclude = Rule::new(RuleSpec::for_path("a").with_type(RuleType::Exclude)).unwrap();
        assert_eq!(exclude.filter(), None);
    }
}
