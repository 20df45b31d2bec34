use std::collections::HashMap;
use std::fmt;

use crate::error::{ClaimManagerError, ClaimResult};

/// One output encoding variant every segment has to be transcoded into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Profile(String);

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Profile {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// The profiles of a work assignment in canonical order (sorted by name).
///
/// Every hash concatenation over per-profile outputs walks this order, so commitments do
/// not depend on the order in which profiles were configured or receipts arrived.
#[derive(Debug, Clone)]
pub struct ProfileSet {
    ordered: Vec<Profile>,
    positions: HashMap<Profile, usize>,
}

impl ProfileSet {
    pub fn new(profiles: impl IntoIterator<Item = Profile>) -> ClaimResult<Self> {
        let mut ordered: Vec<Profile> = profiles.into_iter().collect();
        if ordered.is_empty() {
            return Err(ClaimManagerError::InvalidConfiguration("at least one profile is required".into()));
        }
        ordered.sort();

        let mut positions = HashMap::with_capacity(ordered.len());
        for (position, profile) in ordered.iter().enumerate() {
            if positions.insert(profile.clone(), position).is_some() {
                return Err(ClaimManagerError::InvalidConfiguration(format!("profile {profile} is configured twice")));
            }
        }

        Ok(Self { ordered, positions })
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Canonical position of `profile`, if configured.
    pub fn position(&self, profile: &Profile) -> Option<usize> {
        self.positions.get(profile).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Profile> {
        self.ordered.iter()
    }
}
