//! Partitioned rule set and the decision engine.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use win_focus_watcher::WindowInfo;

use crate::{Rule, RuleRecords, RuleType};

/// Outcome of evaluating the rules for one window.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// An IGNORE rule matched: leave the filter in its current state.
    NoOp,
    /// Turn the filter off.
    Off,
    /// Turn the filter on with this effect.
    On {
        /// Filter identifier.
        filter: String,
        /// Filter opacity in `[0, 1]`.
        opacity: f32,
    },
}

/// Rules by name plus per-type partitions kept in sync on every change.
#[derive(Debug, Default, Clone)]
pub struct RuleSet {
    /// Every rule by name.
    rules: HashMap<String, Arc<Rule>>,
    /// INCLUDE rules, iterated in name order.
    include: BTreeMap<String, Arc<Rule>>,
    /// EXCLUDE rules.
    exclude: BTreeMap<String, Arc<Rule>>,
    /// IGNORE rules.
    ignore: BTreeMap<String, Arc<Rule>>,
}

impl RuleSet {
    /// Build a set from compiled rules.
    pub fn from_rules<I>(rules: I) -> Self
    where
        I: IntoIterator<Item = (String, Rule)>,
    {
        let mut set = Self::default();
        for (name, rule) in rules {
            set.insert(name, Arc::new(rule));
        }
        set
    }

    /// Partition holding rules of `rule_type`.
    pub fn partition(&self, rule_type: RuleType) -> &BTreeMap<String, Arc<Rule>> {
        match rule_type {
            RuleType::Include => &self.include,
            RuleType::Exclude => &self.exclude,
            RuleType::Ignore => &self.ignore,
        }
    }

    /// Mutable partition for `rule_type`.
    fn partition_mut(&mut self, rule_type: RuleType) -> &mut BTreeMap<String, Arc<Rule>> {
        match rule_type {
            RuleType::Include => &mut self.include,
            RuleType::Exclude => &mut self.exclude,
            RuleType::Ignore => &mut self.ignore,
        }
    }

    /// Insert `rule`, replacing (and unpartitioning) any rule of that name.
    pub fn insert(&mut self, name: String, rule: Arc<Rule>) {
        if let Some(old) = self.rules.insert(name.clone(), rule.clone()) {
            self.partition_mut(old.rule_type()).remove(&name);
        }
        self.partition_mut(rule.rule_type()).insert(name, rule);
    }

    /// Remove `name` from the map and its partition.
    pub fn remove(&mut self, name: &str) -> Option<Arc<Rule>> {
        let rule = self.rules.remove(name)?;
        self.partition_mut(rule.rule_type()).remove(name);
        Some(rule)
    }

    /// Rule by name.
    pub fn get(&self, name: &str) -> Option<&Arc<Rule>> {
        self.rules.get(name)
    }

    /// True when a rule with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate the rules for `info`.
    pub fn decide(&self, info: &WindowInfo) -> Decision {
        if self.ignore.values().any(|r| r.is_active(info)) {
            return Decision::NoOp;
        }
        if self.exclude.values().any(|r| r.is_active(info)) {
            return Decision::Off;
        }
        self.include
            .values()
            .filter(|r| r.is_active(info))
            .find_map(|r| r.filter())
            .map_or(Decision::Off, |(filter, opacity)| Decision::On {
                filter: filter.to_string(),
                opacity,
            })
    }

    /// Names of every rule active for `info`, sorted.
    pub fn active_rules(&self, info: &WindowInfo) -> Vec<String> {
        let mut names: Vec<String> = self
            .rules
            .iter()
            .filter(|(_, rule)| rule.is_active(info))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Serializable records for every rule.
    pub fn records(&self) -> RuleRecords {
        RuleRecords(
            self.rules
                .iter()
                .map(|(name, rule)| (name.clone(), rule.spec().clone()))
                .collect(),
        )
    }
}

/// Receives the full record set after every engine mutation.
pub trait RulePersistence: Send + Sync {
    /// Store `records`. Failures are handled (logged) by the implementation.
    fn persist(&self, records: &RuleRecords);
}

/// Persistence that keeps nothing.
struct Volatile;

impl RulePersistence for Volatile {
    fn persist(&self, _records: &RuleRecords) {}
}

/// Listener fired after the rule set changes.
type RulesListener = Arc<dyn Fn(&RuleSet) + Send + Sync>;

/// Owns the active [`RuleSet`].
///
/// Reads take a snapshot and never wait for writers; writers build a new set
/// and swap it in. Mutations are expected on the main thread while `decide`
/// runs on the focus hook thread.
pub struct RuleEngine {
    /// Current snapshot.
    current: RwLock<Arc<RuleSet>>,
    /// Serializes writers so read-modify-swap is atomic.
    writer: Mutex<()>,
    /// Where records go after a mutation.
    persistence: Arc<dyn RulePersistence>,
    /// Change listeners.
    listeners: Mutex<Vec<RulesListener>>,
}

impl RuleEngine {
    /// Empty engine that persists through `persistence`.
    pub fn new(persistence: Arc<dyn RulePersistence>) -> Self {
        Self {
            current: RwLock::new(Arc::new(RuleSet::default())),
            writer: Mutex::new(()),
            persistence,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Empty engine without persistence.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(Volatile))
    }

    /// Current rule set.
    pub fn snapshot(&self) -> Arc<RuleSet> {
        self.current.read().clone()
    }

    /// Register a listener fired after every change, on the mutating thread.
    pub fn on_rules_changed<F>(&self, listener: F)
    where
        F: Fn(&RuleSet) + Send + Sync + 'static,
    {
        self.listeners.lock().push(Arc::new(listener));
    }

    /// Add `rule` under `name`, replacing any rule of that name. Persists,
    /// then notifies.
    pub fn add_rule(&self, name: impl Into<String>, rule: Rule) {
        let name = name.into();
        info!(rule = %name, kind = ?rule.rule_type(), "adding rule");
        self.mutate(|set| set.insert(name, Arc::new(rule)), true);
    }

    /// Remove rules by name; unknown names are ignored. Persists, then
    /// notifies, when at least one rule was removed.
    pub fn remove_rules<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<S> = names.into_iter().collect();
        if names.is_empty() {
            return;
        }
        let _w = self.writer.lock();
        let mut next = (*self.snapshot()).clone();
        let mut removed = 0;
        for name in &names {
            let name = name.as_ref();
            if next.remove(name).is_some() {
                info!(rule = %name, "removed rule");
                removed += 1;
            } else {
                debug!(rule = %name, "remove: no such rule");
            }
        }
        if removed == 0 {
            return;
        }
        self.publish(next, true);
    }

    /// Replace every rule from stored records. Stickiness resets. Entries
    /// that fail to compile are logged and skipped. Notifies but does not
    /// persist.
    pub fn load_records(&self, records: &RuleRecords) {
        let rules = records.0.iter().filter_map(|(name, spec)| {
            match Rule::new(spec.clone()) {
                Ok(rule) => Some((name.clone(), rule)),
                Err(e) => {
                    warn!(rule = %name, error = %e, "skipping invalid rule");
                    None
                }
            }
        });
        let next = RuleSet::from_rules(rules);
        info!(count = next.len(), "rules loaded");
        let _w = self.writer.lock();
        self.publish(next, false);
    }

    /// Decide the filter state for `info`.
    pub fn decide(&self, info: &WindowInfo) -> Decision {
        self.snapshot().decide(info)
    }

    /// Names of every rule active for `info`.
    pub fn active_rules(&self, info: &WindowInfo) -> Vec<String> {
        self.snapshot().active_rules(info)
    }

    /// True when any rule is active for `info`.
    pub fn has_active_rules(&self, info: &WindowInfo) -> bool {
        let set = self.snapshot();
        set.rules.values().any(|r| r.is_active(info))
    }

    /// True when a rule with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.snapshot().contains(name)
    }

    /// Records for the current rules.
    pub fn records(&self) -> RuleRecords {
        self.snapshot().records()
    }

    /// Copy-on-write update under the writer lock.
    fn mutate(&self, f: impl FnOnce(&mut RuleSet), persist: bool) {
        let _w = self.writer.lock();
        let mut next = (*self.snapshot()).clone();
        f(&mut next);
        self.publish(next, persist);
    }

    /// Swap in `next`, persist if asked, then notify. Caller holds `writer`.
    fn publish(&self, next: RuleSet, persist: bool) {
        let next = Arc::new(next);
        *self.current.write() = next.clone();
        if persist {
            self.persistence.persist(&next.records());
        }
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener(&next);
        }
    }
}
