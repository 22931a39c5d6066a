//! Allow-list admission rules.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::AllowedContact;

/// Maximum number of allowed contacts per template.
pub const MAX_ALLOWED_CONTACTS: usize = 5;

/// Why a contact cannot join an allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddContactRejection {
    /// The normalized number is empty
    InvalidNumber,
    /// The template already holds the maximum
    CapReached,
    /// The normalized number is already on the list
    Duplicate,
    /// The picked contact carries no phone number at all
    NoNumber,
    /// The requested number is not one of the picked contact's numbers
    NumberNotPicked,
}

impl fmt::Display for AddContactRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNumber => write!(f, "invalid_number"),
            Self::CapReached => write!(f, "cap_reached (max {MAX_ALLOWED_CONTACTS})"),
            Self::Duplicate => write!(f, "duplicate"),
            Self::NoNumber => write!(f, "no_number"),
            Self::NumberNotPicked => write!(f, "number_not_picked"),
        }
    }
}

/// Check whether a contact with `phone_number_normalized` may be added.
///
/// Checks run in order: empty number, cap, duplicate.
pub fn can_add_allowed_contact(
    existing: &[AllowedContact],
    phone_number_normalized: &str,
) -> Result<(), AddContactRejection> {
    if phone_number_normalized.is_empty() {
        return Err(AddContactRejection::InvalidNumber);
    }
    if existing.len() >= MAX_ALLOWED_CONTACTS {
        return Err(AddContactRejection::CapReached);
    }
    if existing
        .iter()
        .any(|c| c.phone_number_normalized == phone_number_normalized)
    {
        return Err(AddContactRejection::Duplicate);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(n: &str) -> AllowedContact {
        AllowedContact::new(format!("Contact {n}"), n.to_string(), None)
    }

    #[test]
    fn empty_number_is_invalid() {
        assert_eq!(can_add_allowed_contact(&[], ""), Err(AddContactRejection::InvalidNumber));
    }

    #[test]
    fn sixth_contact_hits_the_cap() {
        let existing: Vec<_> = (1..=5).map(|i| contact(&format!("55500{i}"))).collect();
        assert_eq!(
            can_add_allowed_contact(&existing, "5559999"),
            Err(AddContactRejection::CapReached)
        );
    }

    #[test]
    fn exact_duplicate_is_rejected() {
        let existing = vec![contact("5551234567")];
        assert_eq!(
            can_add_allowed_contact(&existing, "5551234567"),
            Err(AddContactRejection::Duplicate)
        );
    }

    #[test]
    fn plus_prefix_is_a_different_number() {
        let existing = vec![contact("5551234567")];
        assert_eq!(can_add_allowed_contact(&existing, "+5551234567"), Ok(()));
    }

    #[test]
    fn invalid_number_wins_over_cap() {
        let existing: Vec<_> = (1..=5).map(|i| contact(&format!("55500{i}"))).collect();
        assert_eq!(can_add_allowed_contact(&existing, ""), Err(AddContactRejection::InvalidNumber));
    }

    #[test]
    fn otherwise_accepted() {
        let existing = vec![contact("5551234567")];
        assert_eq!(can_add_allowed_contact(&existing, "5557654321"), Ok(()));
    }
}
