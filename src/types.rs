use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

/// Timestamp type (milliseconds since epoch).
pub type Timestamp = i64;

/// Value type.
pub type Value = f64;

/// Substitute for NaN in inspection paths, since NaN never compares equal to itself.
///
/// Evaluation paths carry NaN through untouched; see [`crate::cursor::expand_for_inspection`].
pub const STALE_MARKER: Value = -99999999.0;

/// A single (timestamp, value) pair emitted by a [`crate::cursor::SampleCursor`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sample {
    pub t: Timestamp,
    pub v: Value,
}

impl Sample {
    pub fn new(t: Timestamp, v: Value) -> Self {
        Self { t, v }
    }
}

impl From<(Timestamp, Value)> for Sample {
    fn from((t, v): (Timestamp, Value)) -> Self {
        Self { t, v }
    }
}

/// A single label name/value pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Identity of a series: labels sorted by name, names unique.
///
/// Ordering is lexical over the sorted pairs (name first, then value); a label set that is a
/// strict prefix of another sorts first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LabelSet(Vec<Label>);

impl LabelSet {
    /// Builds a label set, sorting by name. When a name repeats, the first occurrence wins.
    pub fn new(mut labels: Vec<Label>) -> Self {
        labels.sort_by(|a, b| a.name.cmp(&b.name));
        labels.dedup_by(|later, earlier| later.name == earlier.name);
        Self(labels)
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self::new(pairs.iter().map(|(n, v)| Label::new(*n, *v)).collect())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .binary_search_by(|l| l.name.as_str().cmp(name))
            .ok()
            .map(|i| self.0[i].value.as_str())
    }

    /// Returns a copy without any label whose name is in `names`. Sort order is preserved.
    pub fn without(&self, names: &BTreeSet<String>) -> LabelSet {
        if names.is_empty() {
            return self.clone();
        }
        LabelSet(
            self.0
                .iter()
                .filter(|l| !names.contains(&l.name))
                .cloned()
                .collect(),
        )
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Label> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Ord for LabelSet {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.name.cmp(&b.name).then_with(|| a.value.cmp(&b.value)) {
                Ordering::Equal => continue,
                non_eq => return non_eq,
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

impl PartialOrd for LabelSet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromIterator<(String, String)> for LabelSet {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self::new(iter.into_iter().map(|(n, v)| Label::new(n, v)).collect())
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, l) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={:?}", l.name, l.value)?;
        }
        f.write_str("}")
    }
}

/// Closed query window `[mint, maxt]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub mint: Timestamp,
    pub maxt: Timestamp,
}

impl TimeWindow {
    pub fn new(mint: Timestamp, maxt: Timestamp) -> Self {
        Self { mint, maxt }
    }

    pub fn contains(&self, t: Timestamp) -> bool {
        self.mint <= t && t <= self.maxt
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            mint: Timestamp::MIN,
            maxt: Timestamp::MAX,
        }
    }
}
