use immersive_protocol::ids::SourceId;
use serde::{Deserialize, Serialize};

use crate::error::{SelectionError, SelectionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    General,
    Special,
}

impl CatalogKind {
    pub fn other(self) -> Self {
        match self {
            Self::General => Self::Special,
            Self::Special => Self::General,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Special => "special",
        }
    }
}

impl std::fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: SourceId,
    pub label: String,
}

impl CatalogEntry {
    pub fn new(id: impl Into<SourceId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub kind: CatalogKind,
    pub entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(kind: CatalogKind, entries: Vec<CatalogEntry>) -> Self {
        Self { kind, entries }
    }

    pub fn contains(&self, source: &SourceId) -> bool {
        self.entries.iter().any(|entry| &entry.id == source)
    }
}

/// What a single selection change did to the pair of controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChange {
    pub catalog: CatalogKind,
    pub selected: Option<SourceId>,
    pub cleared_other: Option<SourceId>,
}

/// Keeps the general and special catalog selections mutually exclusive.
#[derive(Debug, Clone)]
pub struct SelectionCoordinator {
    general: Catalog,
    special: Catalog,
    general_value: Option<SourceId>,
    special_value: Option<SourceId>,
}

impl SelectionCoordinator {
    pub fn new(general: Catalog, special: Catalog) -> Self {
        debug_assert_eq!(general.kind, CatalogKind::General);
        debug_assert_eq!(special.kind, CatalogKind::Special);
        Self {
            general,
            special,
            general_value: None,
            special_value: None,
        }
    }

    pub fn catalog(&self, kind: CatalogKind) -> &Catalog {
        match kind {
            CatalogKind::General => &self.general,
            CatalogKind::Special => &self.special,
        }
    }

    pub fn value(&self, kind: CatalogKind) -> Option<&SourceId> {
        match kind {
            CatalogKind::General => self.general_value.as_ref(),
            CatalogKind::Special => self.special_value.as_ref(),
        }
    }

    /// Applies a change to one control. A non-empty value clears the other
    /// control; an unknown source leaves both untouched.
    pub fn select(
        &mut self,
        kind: CatalogKind,
        source: Option<SourceId>,
    ) -> SelectionResult<SelectionChange> {
        if let Some(source_id) = source.as_ref() {
            if !self.catalog(kind).contains(source_id) {
                return Err(SelectionError::UnknownSource {
                    catalog: kind,
                    source_id: source_id.clone(),
                });
            }
        }

        let cleared_other = if source.is_some() {
            self.slot_mut(kind.other()).take()
        } else {
            None
        };
        *self.slot_mut(kind) = source.clone();

        Ok(SelectionChange {
            catalog: kind,
            selected: source,
            cleared_other,
        })
    }

    /// The single selected source, or `None` when nothing (or, impossibly,
    /// both controls) hold a value.
    pub fn resolve(&self) -> Option<&SourceId> {
        match (self.general_value.as_ref(), self.special_value.as_ref()) {
            (Some(_), Some(_)) => {
                tracing::error!("both catalog selections hold a value; refusing to resolve");
                None
            }
            (Some(source), None) | (None, Some(source)) => Some(source),
            (None, None) => None,
        }
    }

    pub fn resolved_catalog(&self) -> Option<CatalogKind> {
        match (self.general_value.is_some(), self.special_value.is_some()) {
            (true, false) => Some(CatalogKind::General),
            (false, true) => Some(CatalogKind::Special),
            _ => None,
        }
    }

    fn slot_mut(&mut self, kind: CatalogKind) -> &mut Option<SourceId> {
        match kind {
            CatalogKind::General => &mut self.general_value,
            CatalogKind::Special => &mut self.special_value,
        }
    }

    #[cfg(test)]
    pub(crate) fn force_values(
        &mut self,
        general: Option<SourceId>,
        special: Option<SourceId>,
    ) {
        self.general_value = general;
        self.special_value = special;
    }
}
