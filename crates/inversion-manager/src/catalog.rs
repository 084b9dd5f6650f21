//! Named color effects, kept in their own hot-reloaded file.
//!
//! Each effect is a 5x5 color matrix applied to row vectors
//! `[r, g, b, a, 1]`. On disk every matrix is five strings, one per row:
//!
//! ```yaml
//! inversion:
//! - -1 0 0 0 0
//! - 0 -1 0 0 0
//! - 0 0 -1 0 0
//! - 0 0 0 1 0
//! - 1 1 1 0 1
//! ```

use std::{
    collections::BTreeMap,
    fmt,
    result::Result as StdResult,
    sync::{Arc, Weak},
};

use filter_rules::RuleRecords;
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use synced_doc::{Document, SyncedDocument, YamlCodec};
use tracing::debug;

use crate::Result;

/// Matrix side length.
const SIDE: usize = 5;

/// A color transform for the screen effect API.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMatrix(pub [[f32; SIDE]; SIDE]);

impl ColorMatrix {
    /// Leaves colors unchanged.
    pub const IDENTITY: Self = Self([
        [1.0, 0.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 1.0],
    ]);

    /// Negative image.
    pub const INVERSION: Self = Self([
        [-1.0, 0.0, 0.0, 0.0, 0.0],
        [0.0, -1.0, 0.0, 0.0, 0.0],
        [0.0, 0.0, -1.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0, 0.0],
        [1.0, 1.0, 1.0, 0.0, 1.0],
    ]);

    /// Luminance only.
    pub const GRAYSCALE: Self = Self([
        [0.3, 0.3, 0.3, 0.0, 0.0],
        [0.6, 0.6, 0.6, 0.0, 0.0],
        [0.1, 0.1, 0.1, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 1.0],
    ]);

    /// Negative luminance.
    pub const INVERTED_GRAYSCALE: Self = Self([
        [-0.3, -0.3, -0.3, 0.0, 0.0],
        [-0.6, -0.6, -0.6, 0.0, 0.0],
        [-0.1, -0.1, -0.1, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0, 0.0],
        [1.0, 1.0, 1.0, 0.0, 1.0],
    ]);

    /// Warm brown tone.
    pub const SEPIA: Self = Self([
        [0.393, 0.349, 0.272, 0.0, 0.0],
        [0.769, 0.686, 0.534, 0.0, 0.0],
        [0.189, 0.168, 0.131, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 1.0],
    ]);

    /// Blue-yellow color blindness.
    pub const TRITANOPIA: Self = Self([
        [0.95, 0.0, 0.0, 0.0, 0.0],
        [0.05, 0.433, 0.475, 0.0, 0.0],
        [0.0, 0.567, 0.525, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 1.0],
    ]);

    /// Red blindness.
    pub const PROTANOPIA: Self = Self([
        [0.567, 0.558, 0.0, 0.0, 0.0],
        [0.433, 0.442, 0.242, 0.0, 0.0],
        [0.0, 0.0, 0.758, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 1.0],
    ]);

    /// Green blindness.
    pub const DEUTERANOPIA: Self = Self([
        [0.625, 0.7, 0.0, 0.0, 0.0],
        [0.375, 0.3, 0.3, 0.0, 0.0],
        [0.0, 0.0, 0.7, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 1.0],
    ]);

    /// Partial effect: `IDENTITY` at `0.0`, `self` at `1.0`.
    pub fn with_strength(&self, strength: f32) -> Self {
        let strength = strength.clamp(0.0, 1.0);
        let mut out = Self::IDENTITY;
        for (row, (src, id)) in out.0.iter_mut().zip(self.0.iter().zip(Self::IDENTITY.0)) {
            for (cell, (s, i)) in row.iter_mut().zip(src.iter().zip(id)) {
                *cell = i + (s - i) * strength;
            }
        }
        out
    }

    /// Parse five rows of whitespace-separated numbers. Rows may be split
    /// anywhere; only the total of 25 values matters.
    pub fn parse_rows<S: AsRef<str>>(rows: &[S]) -> StdResult<Self, String> {
        let values = rows
            .iter()
            .flat_map(|row| row.as_ref().split_whitespace())
            .map(|v| v.parse::<f32>().map_err(|e| format!("{v:?}: {e}")))
            .collect::<StdResult<Vec<_>, _>>()?;
        if values.len() != SIDE * SIDE {
            return Err(format!(
                "expected {} numbers, found {}",
                SIDE * SIDE,
                values.len()
            ));
        }
        let mut out = Self([[0.0; SIDE]; SIDE]);
        for (cell, v) in out.0.iter_mut().flatten().zip(values) {
            *cell = v;
        }
        Ok(out)
    }

    /// One string per row.
    pub fn rows(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|row| {
                row.iter()
                    .map(f32::to_string)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }
}

impl fmt::Display for ColorMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rows().join(" / "))
    }
}

impl Serialize for ColorMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> StdResult<S::Ok, S::Error> {
        serializer.collect_seq(self.rows())
    }
}

impl<'de> Deserialize<'de> for ColorMatrix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> StdResult<Self, D::Error> {
        let rows = Vec::<String>::deserialize(deserializer)?;
        Self::parse_rows(&rows).map_err(de::Error::custom)
    }
}

/// Effects by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterCatalog(pub BTreeMap<String, ColorMatrix>);

impl FilterCatalog {
    /// The effects shipped with the application.
    pub fn builtin() -> Self {
        Self(
            [
                ("inversion", ColorMatrix::INVERSION),
                ("grayscale", ColorMatrix::GRAYSCALE),
                ("inverted grayscale", ColorMatrix::INVERTED_GRAYSCALE),
                ("sepia", ColorMatrix::SEPIA),
                ("tritanopia", ColorMatrix::TRITANOPIA),
                ("protanopia", ColorMatrix::PROTANOPIA),
                ("deuteranopia", ColorMatrix::DEUTERANOPIA),
                ("no effect", ColorMatrix::IDENTITY),
            ]
            .into_iter()
            .map(|(name, matrix)| (name.to_string(), matrix))
            .collect(),
        )
    }

    /// Matrix for `name`.
    pub fn get(&self, name: &str) -> Option<&ColorMatrix> {
        self.0.get(name)
    }

    /// True when `name` is defined.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Rules whose filter is not in this catalogue, as `(rule, filter)`.
    pub fn unknown_filters(&self, records: &RuleRecords) -> Vec<(String, String)> {
        records
            .0
            .iter()
            .filter_map(|(name, spec)| {
                let filter = spec.color_filter.as_deref()?;
                (!self.contains(filter)).then(|| (name.clone(), filter.to_string()))
            })
            .collect()
    }
}

impl Default for FilterCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Document for FilterCatalog {}

/// The color filter catalogue file. A blank file reads as the built-in set.
pub type FilterCatalogDocument = SyncedDocument<FilterCatalog, YamlCodec>;

/// Catalogue listener.
type CatalogListener = Arc<dyn Fn(&FilterCatalog) + Send + Sync>;

/// Owns the catalogue document and tells listeners when it changes.
pub struct FilterCatalogController {
    /// Backing document.
    doc: Arc<FilterCatalogDocument>,
    /// Called after reloads and edits.
    listeners: Mutex<Vec<CatalogListener>>,
}

impl FilterCatalogController {
    /// Wrap `doc`; reloads of the document notify listeners.
    pub fn new(doc: Arc<FilterCatalogDocument>) -> Arc<Self> {
        let controller = Arc::new(Self {
            doc: doc.clone(),
            listeners: Mutex::new(Vec::new()),
        });
        let weak: Weak<Self> = Arc::downgrade(&controller);
        doc.set_on_reloaded(move |catalog| {
            if let Some(controller) = weak.upgrade() {
                controller.notify(catalog);
            }
        });
        controller
    }

    /// In-memory catalogue with nowhere to save.
    #[cfg(test)]
    pub(crate) fn detached() -> Arc<Self> {
        Self::new(Arc::new(SyncedDocument::new(
            "",
            FilterCatalog::builtin(),
            YamlCodec,
        )))
    }

    /// Backing document.
    pub fn document(&self) -> &Arc<FilterCatalogDocument> {
        &self.doc
    }

    /// Current catalogue.
    pub fn filters(&self) -> FilterCatalog {
        self.doc.get()
    }

    /// Matrix for `name`.
    pub fn matrix(&self, name: &str) -> Option<ColorMatrix> {
        self.doc.get().get(name).copied()
    }

    /// Call `listener` after every change.
    pub fn on_filters_changed<F>(&self, listener: F)
    where
        F: Fn(&FilterCatalog) + Send + Sync + 'static,
    {
        self.listeners.lock().push(Arc::new(listener));
    }

    /// Add or replace an effect, save, notify.
    pub fn add_filter(&self, name: impl Into<String>, matrix: ColorMatrix) -> Result<()> {
        self.doc.update(|c| {
            c.0.insert(name.into(), matrix);
        });
        self.commit()
    }

    /// Remove effects by name, save, notify. Unknown names are ignored.
    pub fn remove_filters<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut removed = 0;
        self.doc.update(|c| {
            for name in names {
                removed += usize::from(c.0.remove(name.as_ref()).is_some());
            }
        });
        if removed == 0 {
            return Ok(());
        }
        self.commit()
    }

    /// Save, then notify.
    fn commit(&self) -> Result<()> {
        self.doc.save()?;
        self.notify(&self.doc.get());
        Ok(())
    }

    /// Run every listener.
    fn notify(&self, catalog: &FilterCatalog) {
        debug!(filters = catalog.0.len(), "color filters changed");
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener(catalog);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use filter_rules::RuleSpec;
    use synced_doc::{Codec, LoadOutcome};

    use super::*;

    #[test]
    fn builtin_names() {
        let names: Vec<_> = FilterCatalog::builtin().0.into_keys().collect();
        assert_eq!(
            names,
            vec![
                "deuteranopia",
                "grayscale",
                "inversion",
                "inverted grayscale",
                "no effect",
                "protanopia",
                "sepia",
                "tritanopia",
            ]
        );
        assert!(FilterCatalog::builtin().contains(filter_rules::DEFAULT_FILTER));
    }

    #[test]
    fn matrices_are_rows_of_numbers_on_disk() {
        let mut catalog = FilterCatalog(BTreeMap::new());
        catalog.0.insert("inversion".into(), ColorMatrix::INVERSION);
        let text = YamlCodec.encode(&catalog).unwrap();
        assert!(text.contains("-1 0 0 0 0"), "{text}");
        assert!(text.contains("1 1 1 0 1"), "{text}");

        let back: FilterCatalog = YamlCodec.decode(&text).unwrap();
        assert_eq!(back, catalog);
    }

    #[test]
    fn rows_may_be_split_anywhere_but_need_25_values() {
        let flat = ["1 0 0 0 0 0 1 0 0 0", "0 0 1 0 0 0 0 0 1 0", "0 0 0 0 1"];
        assert_eq!(ColorMatrix::parse_rows(&flat).unwrap(), ColorMatrix::IDENTITY);
        assert!(ColorMatrix::parse_rows(&["1 0 0"]).is_err());
        assert!(ColorMatrix::parse_rows(&["x"; 5]).is_err());

        let bad: StdResult<FilterCatalog, _> = YamlCodec.decode("broken:\n- 1 2 3\n");
        assert!(bad.is_err());
    }

    #[test]
    fn strength_blends_from_identity() {
        assert_eq!(ColorMatrix::INVERSION.with_strength(0.0), ColorMatrix::IDENTITY);
        assert_eq!(ColorMatrix::INVERSION.with_strength(1.0), ColorMatrix::INVERSION);
        let half = ColorMatrix::INVERSION.with_strength(0.5);
        assert_eq!(half.0[0][0], 0.0);
        assert_eq!(half.0[4][0], 0.5);
    }

    #[test]
    fn unknown_filters_are_listed() {
        let mut records = RuleRecords::default();
        records.0.insert(
            "typo".into(),
            RuleSpec::for_path("a.exe").with_filter("greyscale", 1.0),
        );
        records
            .0
            .insert("ok".into(), RuleSpec::for_path("b.exe").with_filter("sepia", 1.0));
        assert_eq!(
            FilterCatalog::builtin().unknown_filters(&records),
            vec![("typo".to_string(), "greyscale".to_string())]
        );
    }

    #[test]
    fn edits_are_saved_and_reloads_notify() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("color_filters.yaml");
        let doc = Arc::new(FilterCatalogDocument::new(
            &path,
            FilterCatalog::builtin(),
            YamlCodec,
        ));
        let catalog = FilterCatalogController::new(doc);
        assert_eq!(catalog.document().load().unwrap(), LoadOutcome::Created);
        assert!(fs::read_to_string(&path).unwrap().contains("inverted grayscale:"));

        let seen = Arc::new(AtomicUsize::new(0));
        let hits = seen.clone();
        catalog.on_filters_changed(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });

        catalog.add_filter("night", ColorMatrix::SEPIA.with_strength(0.5)).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("night:"));
        catalog.remove_filters(["missing"]).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        let identity = "only:\n- 1 0 0 0 0\n- 0 1 0 0 0\n- 0 0 1 0 0\n- 0 0 0 1 0\n- 0 0 0 0 1\n";
        fs::write(&path, identity).unwrap();
        assert_eq!(catalog.document().load().unwrap(), LoadOutcome::Reloaded);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(catalog.matrix("only"), Some(ColorMatrix::IDENTITY));
        assert_eq!(catalog.matrix("night"), None);
    }
}
