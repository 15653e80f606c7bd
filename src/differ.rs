//! Decides which observed invites are worth reporting.

use crate::data::{format_stamp, parse_stamp, Invite, PendingReviews};
use chrono::{Duration, NaiveDateTime};

/// Classification of one current observation against prior state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Not present in the previous scan
    New,
    /// Still pending and its stamp is older than the threshold
    StalePending,
    Unchanged,
}

impl Classification {
    pub fn label(&self, threshold: Duration) -> String {
        match self {
            Self::New => "new".to_string(),
            Self::StalePending => format!("pending over {}h", threshold.num_hours()),
            Self::Unchanged => "unchanged".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOutcome {
    /// Every current observation in input order, with its classification
    pub classified: Vec<(Classification, Invite)>,
    /// Replacement state to persist
    pub next_state: PendingReviews,
    /// Age after which a known invite was classified `StalePending`
    pub threshold: Duration,
}

impl DiffOutcome {
    /// Observations that require a notification (`New` and `StalePending`)
    pub fn to_notify(&self) -> Vec<(Classification, &Invite)> {
        self.classified
            .iter()
            .filter(|(c, _)| *c != Classification::Unchanged)
            .map(|(c, i)| (*c, i))
            .collect()
    }
}

/// Compare a fresh scan with the previous state.
///
/// The stored stamp is the time an invite was last reported: `New` and
/// `StalePending` items are stamped `now`, `Unchanged` items keep their stamp,
/// so an unreviewed invite is reported again every `threshold`. Items missing
/// from `current` are dropped; an empty scan yields an empty state. A stamp
/// that cannot be parsed counts as stale.
pub fn diff(
    current: &[Invite],
    previous: &PendingReviews,
    now: NaiveDateTime,
    threshold: Duration,
) -> DiffOutcome {
    let now_stamp = format_stamp(now);
    let mut classified = Vec::with_capacity(current.len());
    let mut next_state = PendingReviews::new();

    for invite in current {
        let classification = match previous.get(&invite.id) {
            None => Classification::New,
            Some(raw) => match parse_stamp(raw) {
                Some(stamp) if now.signed_duration_since(stamp) > threshold => {
                    Classification::StalePending
                }
                Some(_) => Classification::Unchanged,
                None => {
                    tracing::warn!("Unreadable stamp {:?} for invite {}", raw, invite.id);
                    Classification::StalePending
                }
            },
        };

        let stamp = match (classification, previous.get(&invite.id)) {
            (Classification::Unchanged, Some(raw)) => raw.clone(),
            _ => now_stamp.clone(),
        };
        next_state.insert(invite.id.clone(), stamp);
        classified.push((classification, invite.clone()));
    }

    DiffOutcome {
        classified,
        next_state,
        threshold,
    }
}
