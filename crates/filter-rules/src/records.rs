//! Rules file format and persistence.

use std::{
    collections::BTreeMap,
    sync::{Arc, Weak},
};

use serde::{Deserialize, Serialize};
use synced_doc::{Codec, CodecError, Decoded, Document, SyncedDocument, YamlCodec};
use tracing::warn;

use crate::{Rule, RuleEngine, RulePersistence, RuleSpec};

/// Rule records keyed by rule name, as stored on disk.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleRecords(pub BTreeMap<String, RuleSpec>);

impl RuleRecords {
    /// True when there are no records.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Document for RuleRecords {
    fn normalize(self) -> Self {
        Self(
            self.0
                .into_iter()
                .map(|(name, spec)| (name, spec.normalized()))
                .collect(),
        )
    }
}

/// A record that was dropped while reading a rules file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRule {
    /// Rule name.
    pub name: String,
    /// Why it was dropped.
    pub reason: String,
}

/// Result of reading a rules file entry by entry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RulesReport {
    /// Entries that are valid, normalized.
    pub records: RuleRecords,
    /// Entries that were dropped.
    pub rejected: Vec<RejectedRule>,
}

/// YAML rules file codec.
///
/// An empty rule set is an empty file. Entries are read one at a time: a
/// malformed or invalid entry is dropped without affecting the others, and
/// the document keeps a `.corrupt` copy of the text it came from. Only text
/// that is not a YAML mapping at all counts as corrupt.
#[derive(Debug, Default, Clone, Copy)]
pub struct RulesCodec;

impl RulesCodec {
    /// Parse `text`, reporting every entry that was dropped.
    pub fn inspect(text: &str) -> Result<RulesReport, CodecError> {
        let mut report = RulesReport::default();
        if text.trim().is_empty() {
            return Ok(report);
        }
        let raw: Option<BTreeMap<String, serde_yaml::Value>> =
            serde_yaml::from_str(text).map_err(CodecError::new)?;
        for (name, value) in raw.unwrap_or_default() {
            let checked = serde_yaml::from_value::<RuleSpec>(value)
                .map_err(|e| e.to_string())
                .and_then(|spec| {
                    let spec = spec.normalized();
                    Rule::new(spec.clone())
                        .map(|_| spec)
                        .map_err(|e| e.to_string())
                });
            match checked {
                Ok(spec) => {
                    report.records.0.insert(name, spec);
                }
                Err(reason) => report.rejected.push(RejectedRule { name, reason }),
            }
        }
        Ok(report)
    }
}

impl Codec<RuleRecords> for RulesCodec {
    fn encode(&self, value: &RuleRecords) -> Result<String, CodecError> {
        if value.is_empty() {
            return Ok(String::new());
        }
        YamlCodec.encode(value)
    }

    fn decode(&self, text: &str) -> Result<RuleRecords, CodecError> {
        self.decode_entries(text).map(|decoded| decoded.value)
    }

    fn decode_entries(&self, text: &str) -> Result<Decoded<RuleRecords>, CodecError> {
        let report = Self::inspect(text)?;
        for rejected in &report.rejected {
            warn!(rule = %rejected.name, reason = %rejected.reason, "dropping invalid rule entry");
        }
        Ok(Decoded {
            value: report.records,
            dropped: report.rejected.len(),
        })
    }
}

/// The rules file.
pub type RulesDocument = SyncedDocument<RuleRecords, RulesCodec>;

impl RulePersistence for RulesDocument {
    fn persist(&self, records: &RuleRecords) {
        self.replace(records.clone());
        if let Err(e) = self.save() {
            warn!(path = %self.path().display(), error = %e, "failed to save rules");
        }
    }
}

/// Create an engine persisting into `doc` and reloading when `doc` reloads.
///
/// The document only keeps a weak reference to the engine.
pub fn engine_for_document(doc: &Arc<RulesDocument>) -> Arc<RuleEngine> {
    let engine = Arc::new(RuleEngine::new(doc.clone()));
    let weak: Weak<RuleEngine> = Arc::downgrade(&engine);
    doc.set_on_reloaded(move |records| {
        if let Some(engine) = weak.upgrade() {
            engine.load_records(records);
        }
    });
    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RuleType, TitleSource};

    #[test]
    fn empty_set_is_empty_text() {
        assert_eq!(RulesCodec.encode(&RuleRecords::default()).unwrap(), "");
        assert!(RulesCodec.decode("").unwrap().is_empty());
        assert!(RulesCodec.decode("\n  \n").unwrap().is_empty());
    }

    #[test]
    fn not_a_mapping_is_corrupt() {
        assert!(RulesCodec.decode("- just\n- a list\n").is_err());
        assert!(RulesCodec.decode("a: [unclosed").is_err());
    }

    #[test]
    fn invalid_entries_are_isolated() {
        let text = r#"
good:
  path: C:\a.exe
no_path:
  title: Foo
bad_regex:
  path_regex: "("
wrong_shape: 12
"#;
        let report = RulesCodec::inspect(text).unwrap();
        assert_eq!(report.records.0.keys().collect::<Vec<_>>(), vec!["good"]);
        let mut rejected: Vec<_> = report.rejected.iter().map(|r| r.name.as_str()).collect();
        rejected.sort_unstable();
        assert_eq!(rejected, vec!["bad_regex", "no_path", "wrong_shape"]);
    }

    #[test]
    fn encoded_records_are_canonical() {
        let mut records = RuleRecords::default();
        records.0.insert(
            "editor".into(),
            RuleSpec::for_path_regex(r".*\\code\.exe")
                .with_title("Settings", TitleSource::Root)
                .normalized(),
        );
        records.0.insert(
            "game".into(),
            RuleSpec::for_path(r"C:\game.exe")
                .with_type(RuleType::Exclude)
                .normalized(),
        );
        let text = RulesCodec.encode(&records).unwrap();
        assert!(text.contains("type: EXCLUDE"));
        assert!(text.contains("look_for_title: ROOT"));
        assert!(!text.contains("remember_processes"));
        assert!(!text.contains("null"));
        assert!(!text.contains("exclude:"));

        let decoded = RulesCodec.decode(&text).unwrap();
        assert_eq!(decoded, records.normalize());
    }

    #[test]
    fn dropped_entries_are_counted() {
        let decoded = RulesCodec
            .decode_entries("ok:\n  path: a\nbad:\n  path_regex: \"(\"\n")
            .unwrap();
        assert_eq!(decoded.dropped, 1);
        assert!(decoded.value.0.contains_key("ok"));
    }

    #[test]
    fn legacy_files_are_upgraded() {
        let decoded = RulesCodec
            .decode("old:\n  path: C:\\a.exe\n  exclude: true\n")
            .unwrap();
        assert_eq!(decoded.0["old"].rule_type, Some(RuleType::Exclude));
    }
}
