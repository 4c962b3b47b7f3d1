//! Payment status enumeration and the fixed transition graph (§4.2).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A payment's position in the status lifecycle. Wire names are exactly
/// as specified (§6 "Payment status wire names").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[serde(rename = "INIT")]
    Init,
    #[serde(rename = "NEW")]
    New,
    #[serde(rename = "FORM_SHOWED")]
    FormShowed,
    #[serde(rename = "AUTHORIZED")]
    Authorized,
    #[serde(rename = "CONFIRMED")]
    Confirmed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
    #[serde(rename = "REJECTED")]
    Rejected,
    #[serde(rename = "REFUNDED")]
    Refunded,
    #[serde(rename = "PARTIAL_REFUNDED")]
    PartialRefunded,
    #[serde(rename = "EXPIRED")]
    Expired,
}

impl PaymentStatus {
    /// The exact wire name for this status (§6).
    pub fn wire_name(&self) -> &'static str {
        match self {
            PaymentStatus::Init => "INIT",
            PaymentStatus::New => "NEW",
            PaymentStatus::FormShowed => "FORM_SHOWED",
            PaymentStatus::Authorized => "AUTHORIZED",
            PaymentStatus::Confirmed => "CONFIRMED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Rejected => "REJECTED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::PartialRefunded => "PARTIAL_REFUNDED",
            PaymentStatus::Expired => "EXPIRED",
        }
    }

    /// The statuses this status may transition to directly (§4.2's table).
    /// Terminal statuses return an empty slice.
    pub fn successors(&self) -> &'static [PaymentStatus] {
        use PaymentStatus::*;
        match self {
            Init => &[New, Cancelled, Expired],
            New => &[FormShowed, Cancelled, Expired],
            FormShowed => &[Authorized, Rejected, Cancelled, Expired],
            Authorized => &[Confirmed, Cancelled, Expired],
            Confirmed => &[Refunded, PartialRefunded],
            PartialRefunded => &[Refunded],
            Cancelled | Rejected | Refunded | Expired => &[],
        }
    }

    /// Whether `to` is a permitted direct successor of `self`.
    pub fn can_transition_to(&self, to: PaymentStatus) -> bool {
        self.successors().contains(&to)
    }

    /// Terminal statuses have no permitted successors (§3, §4.2).
    pub fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }

    /// Parse a status from its exact wire name (§6). Used at the HTTP
    /// boundary and by store implementations reading back persisted rows.
    pub fn from_wire(s: &str) -> Option<Self> {
        use PaymentStatus::*;
        Some(match s {
            "INIT" => Init,
            "NEW" => New,
            "FORM_SHOWED" => FormShowed,
            "AUTHORIZED" => Authorized,
            "CONFIRMED" => Confirmed,
            "CANCELLED" => Cancelled,
            "REJECTED" => Rejected,
            "REFUNDED" => Refunded,
            "PARTIAL_REFUNDED" => PartialRefunded,
            "EXPIRED" => Expired,
            _ => return None,
        })
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PaymentStatus::*;

    const ALL: &[PaymentStatus] = &[
        Init,
        New,
        FormShowed,
        Authorized,
        Confirmed,
        Cancelled,
        Rejected,
        Refunded,
        PartialRefunded,
        Expired,
    ];

    #[test]
    fn wire_names_match_spec_exactly() {
        assert_eq!(Init.wire_name(), "INIT");
        assert_eq!(New.wire_name(), "NEW");
        assert_eq!(FormShowed.wire_name(), "FORM_SHOWED");
        assert_eq!(Authorized.wire_name(), "AUTHORIZED");
        assert_eq!(Confirmed.wire_name(), "CONFIRMED");
        assert_eq!(Cancelled.wire_name(), "CANCELLED");
        assert_eq!(Rejected.wire_name(), "REJECTED");
        assert_eq!(Refunded.wire_name(), "REFUNDED");
        assert_eq!(PartialRefunded.wire_name(), "PARTIAL_REFUNDED");
        assert_eq!(Expired.wire_name(), "EXPIRED");
    }

    #[test]
    fn terminal_statuses_have_no_successors() {
        for terminal in [Cancelled, Rejected, Refunded, Expired] {
            assert!(terminal.is_terminal());
            assert!(terminal.successors().is_empty());
        }
    }

    #[test]
    fn non_terminal_statuses_have_successors() {
        for s in [Init, New, FormShowed, Authorized, Confirmed, PartialRefunded] {
            assert!(!s.is_terminal());
        }
    }

    /// Exhaustive invariant #1: for every pair not in §4.2's table,
    /// `can_transition_to` returns false.
    #[test]
    fn exhaustive_pairs_not_in_table_are_rejected() {
        let permitted: Vec<(PaymentStatus, PaymentStatus)> = ALL
            .iter()
            .flat_map(|from| from.successors().iter().map(move |to| (*from, *to)))
            .collect();

        for &from in ALL {
            for &to in ALL {
                let expected = permitted.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "mismatch for {from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn from_wire_round_trips_with_wire_name() {
        for &s in ALL {
            assert_eq!(PaymentStatus::from_wire(s.wire_name()), Some(s));
        }
        assert_eq!(PaymentStatus::from_wire("NOT_A_STATUS"), None);
    }

    #[test]
    fn serde_round_trip_uses_wire_names() {
        for &s in ALL {
            let json = serde_json::to_string(&s).unwrap();
            assert_eq!(json, format!("\"{}\"", s.wire_name()));
            let back: PaymentStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(back, s);
        }
    }
}
