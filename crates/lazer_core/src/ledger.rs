//! Per-repetition record of picks and the combination they form.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::identity::{ParameterGroup, ParameterIdentity};

/// One full assignment of chosen indices, keyed by identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Combination {
    picks: BTreeMap<ParameterIdentity, usize>,
}

impl Combination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, identity: &ParameterIdentity) -> Option<usize> {
        self.picks.get(identity).copied()
    }

    pub fn len(&self) -> usize {
        self.picks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.picks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParameterIdentity, usize)> {
        self.picks.iter().map(|(identity, index)| (identity, *index))
    }

    pub(crate) fn insert(&mut self, identity: ParameterIdentity, index: usize) {
        self.picks.insert(identity, index);
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (identity, index)) in self.picks.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", identity, index)?;
        }
        f.write_str("}")
    }
}

impl FromIterator<(ParameterIdentity, usize)> for Combination {
    fn from_iter<I: IntoIterator<Item = (ParameterIdentity, usize)>>(iter: I) -> Self {
        Self {
            picks: iter.into_iter().collect(),
        }
    }
}

/// One recorded pick of the current repetition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickRecord {
    pub identity: ParameterIdentity,
    pub group: Option<ParameterGroup>,
    pub index: usize,
    pub size: usize,
}

/// Odometer digit key: a combined parameter owns its digit, an uncombined group shares one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum DigitKey {
    Param(ParameterIdentity),
    Group(ParameterGroup),
}

/// One odometer position discovered during the repetition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Digit {
    pub(crate) key: DigitKey,
    pub(crate) value: usize,
    pub(crate) radix: usize,
}

impl Digit {
    pub(crate) fn can_advance(&self) -> bool {
        self.value + 1 < self.radix
    }
}

/// Sequence of picks made within one repetition, in call order.
#[derive(Debug, Clone, Default)]
pub struct PickLedger {
    picks: Vec<PickRecord>,
    by_identity: HashMap<ParameterIdentity, usize>,
    digits: Vec<Digit>,
    digit_index: HashMap<DigitKey, usize>,
    next_ordinal: usize,
}

impl PickLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks in the order their identities were first seen.
    pub fn picks(&self) -> &[PickRecord] {
        &self.picks
    }

    pub fn len(&self) -> usize {
        self.picks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.picks.is_empty()
    }

    pub fn get(&self, identity: &ParameterIdentity) -> Option<&PickRecord> {
        self.by_identity.get(identity).map(|&i| &self.picks[i])
    }

    pub fn combination(&self) -> Combination {
        self.picks
            .iter()
            .map(|pick| (pick.identity.clone(), pick.index))
            .collect()
    }

    pub(crate) fn take_ordinal(&mut self) -> ParameterIdentity {
        let identity = ParameterIdentity::Ordinal(self.next_ordinal);
        self.next_ordinal += 1;
        identity
    }

    pub(crate) fn record(&mut self, record: PickRecord) {
        self.by_identity.insert(record.identity.clone(), self.picks.len());
        self.picks.push(record);
    }

    pub(crate) fn digits(&self) -> &[Digit] {
        &self.digits
    }

    pub(crate) fn digit_mut(&mut self, key: &DigitKey) -> Option<&mut Digit> {
        let pos = *self.digit_index.get(key)?;
        self.digits.get_mut(pos)
    }

    pub(crate) fn push_digit(&mut self, digit: Digit) {
        self.digit_index.insert(digit.key.clone(), self.digits.len());
        self.digits.push(digit);
    }

    pub(crate) fn clear(&mut self) {
        self.picks.clear();
        self.by_identity.clear();
        self.digits.clear();
        self.digit_index.clear();
        self.next_ordinal = 0;
    }
}
