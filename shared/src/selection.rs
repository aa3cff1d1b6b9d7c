use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A (year, variable) pair picked in the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Selection {
    pub year: String,
    pub variable: String,
}

impl Selection {
    pub fn new(year: impl Into<String>, variable: impl Into<String>) -> Self {
        Self {
            year: year.into(),
            variable: variable.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("no census data loaded")]
    Empty,
    #[error("unknown year `{0}`")]
    UnknownYear(String),
    #[error("variable `{variable}` is not available for {year}")]
    UnknownVariable { year: String, variable: String },
}

/// Years present in the census data and the variables recorded for each.
///
/// Both levels are kept sorted so the first entry is a stable default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionCatalog {
    by_year: BTreeMap<String, BTreeSet<String>>,
}

impl SelectionCatalog {
    pub fn from_selections<'a>(selections: impl IntoIterator<Item = &'a Selection>) -> Self {
        let mut by_year: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for selection in selections {
            by_year
                .entry(selection.year.clone())
                .or_default()
                .insert(selection.variable.clone());
        }
        Self { by_year }
    }

    pub fn is_empty(&self) -> bool {
        self.by_year.is_empty()
    }

    pub fn years(&self) -> impl Iterator<Item = &str> {
        self.by_year.keys().map(String::as_str)
    }

    /// Variables valid for `year`; empty when the year is unknown.
    pub fn variables<'a>(&'a self, year: &str) -> impl Iterator<Item = &'a str> + use<'a> {
        self.by_year
            .get(year)
            .into_iter()
            .flat_map(|vars| vars.iter().map(String::as_str))
    }

    pub fn contains(&self, selection: &Selection) -> bool {
        self.by_year
            .get(&selection.year)
            .is_some_and(|vars| vars.contains(&selection.variable))
    }

    /// Check that a fully specified selection exists.
    pub fn validate(&self, selection: &Selection) -> Result<(), SelectionError> {
        let Some(vars) = self.by_year.get(&selection.year) else {
            return Err(SelectionError::UnknownYear(selection.year.clone()));
        };
        if !vars.contains(&selection.variable) {
            return Err(SelectionError::UnknownVariable {
                year: selection.year.clone(),
                variable: selection.variable.clone(),
            });
        }
        Ok(())
    }

    /// Resolve the dashboard selection after the year changes.
    ///
    /// A missing year falls back to the first year. The previously chosen
    /// variable is kept when the resolved year still offers it, otherwise the
    /// first variable of that year is used. A year with no variables cannot be
    /// produced by [`SelectionCatalog::from_selections`], so resolution only
    /// fails for an empty catalog or an unknown year.
    pub fn resolve(
        &self,
        year: Option<&str>,
        previous_variable: Option<&str>,
    ) -> Result<Selection, SelectionError> {
        let (year, vars) = match year {
            Some(year) => self
                .by_year
                .get_key_value(year)
                .ok_or_else(|| SelectionError::UnknownYear(year.to_owned()))?,
            None => self.by_year.iter().next().ok_or(SelectionError::Empty)?,
        };

        let variable = previous_variable
            .filter(|variable| vars.contains(*variable))
            .map(str::to_owned)
            .or_else(|| vars.iter().next().cloned())
            .ok_or(SelectionError::Empty)?;

        Ok(Selection::new(year.clone(), variable))
    }
}
