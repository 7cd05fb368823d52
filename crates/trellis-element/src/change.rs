//! Changes and change-level findings
//!
//! A [`Change`] is a tagged variant over the before and after states of one
//! element. Construction from optional states is validated so an addition can
//! never carry a before state and a modification always has both.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::elem_id::ElemId;
use crate::element::{Element, ElementError, InstanceElement};

/// Action a change performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionName {
    /// Element is created
    Add,
    /// Element is deleted
    Remove,
    /// Element is updated
    Modify,
}

impl ActionName {
    /// Lowercase name
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Modify => "modify",
        }
    }
}

impl Display for ActionName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A before/after transition of one element
#[derive(Debug, Clone, PartialEq)]
pub enum Change<T = Element> {
    /// New element
    Addition {
        /// Created state
        after: T,
    },
    /// Deleted element
    Removal {
        /// Deleted state
        before: T,
    },
    /// Updated element
    Modification {
        /// State before the update
        before: T,
        /// State after the update
        after: T,
    },
}

impl<T> Change<T> {
    /// Action of this change
    #[inline]
    #[must_use]
    pub fn action(&self) -> ActionName {
        match self {
            Self::Addition { .. } => ActionName::Add,
            Self::Removal { .. } => ActionName::Remove,
            Self::Modification { .. } => ActionName::Modify,
        }
    }

    /// The relevant state: after for additions and modifications, before for removals
    #[inline]
    #[must_use]
    pub fn data(&self) -> &T {
        match self {
            Self::Addition { after } | Self::Modification { after, .. } => after,
            Self::Removal { before } => before,
        }
    }

    /// Mutable relevant state
    #[inline]
    pub fn data_mut(&mut self) -> &mut T {
        match self {
            Self::Addition { after } | Self::Modification { after, .. } => after,
            Self::Removal { before } => before,
        }
    }

    /// Consume into the relevant state
    #[inline]
    #[must_use]
    pub fn into_data(self) -> T {
        match self {
            Self::Addition { after } | Self::Modification { after, .. } => after,
            Self::Removal { before } => before,
        }
    }

    /// Before state, if any
    #[inline]
    #[must_use]
    pub fn before(&self) -> Option<&T> {
        match self {
            Self::Removal { before } | Self::Modification { before, .. } => Some(before),
            Self::Addition { .. } => None,
        }
    }

    /// After state, if any
    #[inline]
    #[must_use]
    pub fn after(&self) -> Option<&T> {
        match self {
            Self::Addition { after } | Self::Modification { after, .. } => Some(after),
            Self::Removal { .. } => None,
        }
    }

    /// Whether the change has an after state
    #[inline]
    #[must_use]
    pub fn is_addition_or_modification(&self) -> bool {
        !matches!(self, Self::Removal { .. })
    }

    /// Apply `f` to every state, keeping the action
    pub fn map_data<U>(self, mut f: impl FnMut(T) -> U) -> Change<U> {
        match self {
            Self::Addition { after } => Change::Addition { after: f(after) },
            Self::Removal { before } => Change::Removal { before: f(before) },
            Self::Modification { before, after } => Change::Modification {
                before: f(before),
                after: f(after),
            },
        }
    }

    /// Fallible [`Change::map_data`]
    ///
    /// # Errors
    /// Returns the first error produced by `f`.
    pub fn try_map_data<U, E>(self, mut f: impl FnMut(T) -> Result<U, E>) -> Result<Change<U>, E> {
        Ok(match self {
            Self::Addition { after } => Change::Addition { after: f(after)? },
            Self::Removal { before } => Change::Removal { before: f(before)? },
            Self::Modification { before, after } => Change::Modification {
                before: f(before)?,
                after: f(after)?,
            },
        })
    }
}

/// Element id of the relevant state
pub trait ChangeId {
    /// Id of the changed element
    fn change_id(&self) -> &ElemId;
}

impl ChangeId for Change<Element> {
    fn change_id(&self) -> &ElemId {
        self.data().elem_id()
    }
}

impl ChangeId for Change<InstanceElement> {
    fn change_id(&self) -> &ElemId {
        self.data().elem_id()
    }
}

impl Change<Element> {
    /// Build a change from optional states
    ///
    /// # Errors
    /// Fails when both states are absent or when they belong to different elements.
    pub fn from_states(
        before: Option<Element>,
        after: Option<Element>,
    ) -> Result<Self, ElementError> {
        match (before, after) {
            (None, None) => Err(ElementError::InvalidChange(
                "a change needs a before or an after state".to_string(),
            )),
            (None, Some(after)) => Ok(Self::Addition { after }),
            (Some(before), None) => Ok(Self::Removal { before }),
            (Some(before), Some(after)) => {
                if before.elem_id() != after.elem_id() {
                    return Err(ElementError::InvalidChange(format!(
                        "before state {} and after state {} differ",
                        before.elem_id(),
                        after.elem_id()
                    )));
                }
                Ok(Self::Modification { before, after })
            }
        }
    }

    /// Narrow to an instance change
    ///
    /// # Errors
    /// Returns [`ElementError::NotAnInstance`] for type and field changes.
    pub fn into_instance_change(self) -> Result<Change<InstanceElement>, ElementError> {
        self.try_map_data(Element::into_instance)
    }
}

impl From<Change<InstanceElement>> for Change<Element> {
    fn from(change: Change<InstanceElement>) -> Self {
        change.map_data(Element::Instance)
    }
}

/// Severity of a [`ChangeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Informational
    Info,
    /// Surfaced to the user, does not block
    Warning,
    /// Blocks the implicated change
    Error,
}

/// A finding about one change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeError {
    /// Element the finding is about
    pub elem_id: ElemId,
    /// Severity
    pub severity: Severity,
    /// Short message
    pub message: String,
    /// Detailed message
    pub detailed_message: String,
}

impl ChangeError {
    /// Create an `Error` finding
    #[must_use]
    pub fn error(elem_id: ElemId, message: impl Into<String>, detailed: impl Into<String>) -> Self {
        Self {
            elem_id,
            severity: Severity::Error,
            message: message.into(),
            detailed_message: detailed.into(),
        }
    }

    /// Create a `Warning` finding
    #[must_use]
    pub fn warning(
        elem_id: ElemId,
        message: impl Into<String>,
        detailed: impl Into<String>,
    ) -> Self {
        Self {
            elem_id,
            severity: Severity::Warning,
            message: message.into(),
            detailed_message: detailed.into(),
        }
    }

    /// Whether this finding blocks the change
    #[inline]
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl Display for ChangeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}: {}", self.severity, self.elem_id, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ObjectType;

    fn ty(name: &str) -> Element {
        Element::ObjectType(ObjectType::new(ElemId::new_type("sf", name)))
    }

    #[test]
    fn from_states() {
        assert!(matches!(
            Change::from_states(None, Some(ty("A"))),
            Ok(Change::Addition { .. })
        ));
        assert!(matches!(
            Change::from_states(Some(ty("A")), None),
            Ok(Change::Removal { .. })
        ));
        assert_eq!(
            Change::from_states(Some(ty("A")), Some(ty("A"))).unwrap().action(),
            ActionName::Modify
        );
        assert!(Change::<Element>::from_states(None, None).is_err());
        assert!(Change::from_states(Some(ty("A")), Some(ty("B"))).is_err());
    }

    #[test]
    fn data_is_after_unless_removal() {
        let change = Change::Modification {
            before: 1,
            after: 2,
        };
        assert_eq!(*change.data(), 2);
        assert_eq!(change.before(), Some(&1));
        let removal = Change::Removal { before: 7 };
        assert_eq!(*removal.data(), 7);
        assert!(removal.after().is_none());
        assert!(!removal.is_addition_or_modification());
    }

    #[test]
    fn map_data_keeps_action() {
        let change = Change::Modification {
            before: 1,
            after: 2,
        }
        .map_data(|x| x * 10);
        assert_eq!(
            change,
            Change::Modification {
                before: 10,
                after: 20
            }
        );
    }

    #[test]
    fn into_instance_change_rejects_types() {
        let change = Change::Addition { after: ty("A") };
        assert!(change.into_instance_change().is_err());
    }

    #[test]
    fn change_error_blocking() {
        let id = ElemId::new_type("sf", "A");
        assert!(ChangeError::error(id.clone(), "m", "d").is_blocking());
        assert!(!ChangeError::warning(id, "m", "d").is_blocking());
    }
}
