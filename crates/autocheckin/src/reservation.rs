//! Reservation identity and the data exchanged with the reservation gateway.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// Who is checking in and for which reservation.
///
/// Immutable once built. All constructors and deserialization go through
/// [`Identity::new`], so a value of this type is always valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "IdentityRepr")]
pub struct Identity {
    first_name: String,
    last_name: String,
    confirmation_number: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityRepr {
    first_name: String,
    last_name: String,
    confirmation_number: String,
}

impl TryFrom<IdentityRepr> for Identity {
    type Error = StateError;

    fn try_from(repr: IdentityRepr) -> Result<Self, Self::Error> {
        Identity::new(repr.first_name, repr.last_name, repr.confirmation_number)
    }
}

impl Identity {
    /// Validate and normalize an identity.
    ///
    /// Names are trimmed; the confirmation number is trimmed and upper-cased
    /// and must be alphanumeric.
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        confirmation_number: impl Into<String>,
    ) -> Result<Self, StateError> {
        let first_name = non_blank(first_name.into(), "firstName")?;
        let last_name = non_blank(last_name.into(), "lastName")?;
        let confirmation_number =
            non_blank(confirmation_number.into(), "confirmationNumber")?.to_ascii_uppercase();

        if !confirmation_number.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StateError::InvalidConfirmation(confirmation_number));
        }

        Ok(Self {
            first_name,
            last_name,
            confirmation_number,
        })
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn confirmation_number(&self) -> &str {
        &self.confirmation_number
    }

    /// Case-insensitive name comparison against a passenger record.
    pub fn matches_passenger(&self, passenger: &Passenger) -> bool {
        self.first_name
            .eq_ignore_ascii_case(passenger.first_name.trim())
            && self.last_name.eq_ignore_ascii_case(passenger.last_name.trim())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({})",
            self.first_name, self.last_name, self.confirmation_number
        )
    }
}

fn non_blank(value: String, field: &'static str) -> Result<String, StateError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StateError::Blank { field });
    }
    Ok(trimmed.to_string())
}

/// An email address that boarding passes can be sent to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, StateError> {
        let trimmed = raw.as_ref().trim();
        // Accept "Display Name <user@host>" as well as a bare address.
        let bare = match (trimmed.rfind('<'), trimmed.rfind('>')) {
            (Some(open), Some(close)) if open < close => &trimmed[open + 1..close],
            _ => trimmed,
        };

        let mut parts = bare.split('@');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(local), Some(domain), None)
                if !local.is_empty()
                    && !domain.is_empty()
                    && !bare
                        .chars()
                        .any(|c| c.is_whitespace() || c == '<' || c == '>') =>
            {
                Ok(Self(bare.to_string()))
            }
            _ => Err(StateError::InvalidAddress(raw.as_ref().to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Domain part, lower-cased.
    pub fn domain(&self) -> String {
        self.0
            .rsplit('@')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase()
    }

    /// True when the address is at `domain` or any subdomain of it.
    pub fn belongs_to(&self, domain: &str) -> bool {
        let own = self.domain();
        let domain = domain.trim().trim_start_matches('.').to_ascii_lowercase();
        own == domain || own.ends_with(&format!(".{domain}"))
    }
}

impl TryFrom<String> for Address {
    type Error = StateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Address::parse(value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reservation details as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub confirmation_number: String,
    pub passengers: Vec<Passenger>,
    pub bounds: Vec<Bound>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Passenger {
    pub first_name: String,
    pub last_name: String,
}

/// One direction of travel. Connecting flights share a single check-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bound {
    pub origin: String,
    pub destination: String,
    pub departs_at: DateTime<Utc>,
    #[serde(default)]
    pub flights: Vec<String>,
}

/// What the gateway returned for a successful check-in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInResult {
    pub boarding_passes: Vec<BoardingPass>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardingPass {
    pub passenger: String,
    pub flight: String,
    pub group: String,
    pub position: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_normalizes_confirmation_number() {
        let identity = Identity::new(" Ada ", "Lovelace", " abc123 ").unwrap();
        assert_eq!(identity.first_name(), "Ada");
        assert_eq!(identity.confirmation_number(), "ABC123");
    }

    #[test]
    fn identity_rejects_blank_and_punctuated_values() {
        assert_eq!(
            Identity::new("", "Lovelace", "ABC123"),
            Err(StateError::Blank { field: "firstName" })
        );
        assert!(matches!(
            Identity::new("Ada", "Lovelace", "ABC-12"),
            Err(StateError::InvalidConfirmation(_))
        ));
    }

    #[test]
    fn identity_deserialization_is_validated() {
        let json = serde_json::json!({
            "firstName": "Ada",
            "lastName": "  ",
            "confirmationNumber": "ABC123"
        });
        assert!(serde_json::from_value::<Identity>(json).is_err());
    }

    #[test]
    fn address_accepts_display_name_form() {
        let address = Address::parse("Southwest Airlines <SouthwestAirlines@Luv.Southwest.com>")
            .unwrap();
        assert_eq!(address.as_str(), "SouthwestAirlines@Luv.Southwest.com");
        assert_eq!(address.domain(), "luv.southwest.com");
    }

    #[test]
    fn address_domain_membership_requires_label_boundary() {
        let own = Address::parse("noreply@southwest.com").unwrap();
        let sub = Address::parse("noreply@luv.southwest.com").unwrap();
        let lookalike = Address::parse("friend@notsouthwest.com").unwrap();

        assert!(own.belongs_to("southwest.com"));
        assert!(sub.belongs_to("southwest.com"));
        assert!(!lookalike.belongs_to("southwest.com"));
    }

    #[test]
    fn address_rejects_garbage() {
        assert!(Address::parse("not an address").is_err());
        assert!(Address::parse("a@b@c").is_err());
        assert!(Address::parse("@example.com").is_err());
    }

    #[test]
    fn address_rejects_unbalanced_angle_brackets() {
        assert!(Address::parse("foo<bar@x.com").is_err());
        assert!(Address::parse("bar@x.com>").is_err());
        assert!(Address::parse("Foo <bar@x.com").is_err());
        assert_eq!(Address::parse("<bar@x.com>").unwrap().as_str(), "bar@x.com");
    }
}
