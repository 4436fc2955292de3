// Feed watch state — identity resolution and the "latest seen" watermark.
//
// A watch moves through a fixed sequence of phases, driven only by the
// response bodies the browser hands us:
//
//   Uninitialized -> IdentityResolved -> WatermarkSeeded -> Steady
//
// The first index payload resolves the display name and feed container id.
// The first card list for that container seeds the watermark without
// notifying, so a fresh watch never replays history. Every later card list is
// diffed against the watermark.
//
// `FeedWatch::step` is the whole state machine: (state, response) in,
// (state, notifications) out. No browser needed to exercise it.

use std::fmt;

use chrono::{DateTime, Utc};

use super::classify::{batch_max, classify_batch};
use crate::notify::Notification;
use crate::weibo::request_targets_container;
use crate::weibo::schema::{self, Card, SchemaError};

/// Who we are watching. Frozen once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountIdentity {
    pub uid: String,
    pub display_name: String,
    pub feed_container_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchPhase {
    Uninitialized,
    /// An index payload arrived but listed no feed tab. The watch can't make
    /// progress until an index payload with one shows up.
    Unresolvable { display_name: String },
    IdentityResolved(AccountIdentity),
    WatermarkSeeded(AccountIdentity, DateTime<Utc>),
    Steady(AccountIdentity, DateTime<Utc>),
}

/// Field-less view of [`WatchPhase`] for status checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Uninitialized,
    Unresolvable,
    IdentityResolved,
    WatermarkSeeded,
    Steady,
}

/// One intercepted response from the feed index endpoint.
#[derive(Debug, Clone, Copy)]
pub struct FeedResponse<'a> {
    pub request_url: &'a str,
    pub body: &'a str,
}

/// What a single step did.
#[derive(Debug)]
pub enum Outcome {
    /// Not valid JSON, or not the shape expected in this phase.
    Rejected(SchemaError),
    /// A card list for some other container (comments, other tabs).
    OtherContainer,
    IdentityResolved,
    /// Index payload without a `weibo` tab.
    IdentityUnresolvable,
    /// First batch for the container: watermark set, nothing emitted.
    Seeded { watermark: DateTime<Utc> },
    /// A matching batch with no datable cards; nothing changed.
    Empty,
    Processed {
        candidates: usize,
        watermark: DateTime<Utc>,
    },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Rejected(e) => write!(f, "rejected ({e})"),
            Outcome::OtherContainer => write!(f, "card list for another container"),
            Outcome::IdentityResolved => write!(f, "identity resolved"),
            Outcome::IdentityUnresolvable => write!(f, "index has no post feed tab"),
            Outcome::Seeded { watermark } => write!(f, "watermark seeded at {watermark}"),
            Outcome::Empty => write!(f, "no datable cards"),
            Outcome::Processed {
                candidates,
                watermark,
            } => write!(f, "{candidates} new post(s), watermark {watermark}"),
        }
    }
}

#[derive(Debug)]
pub struct Step {
    pub outcome: Outcome,
    pub notifications: Vec<Notification>,
}

impl Step {
    fn quiet(outcome: Outcome) -> Self {
        Self {
            outcome,
            notifications: Vec::new(),
        }
    }
}

/// Watch state for one account.
#[derive(Debug, Clone)]
pub struct FeedWatch {
    uid: String,
    phase: WatchPhase,
}

impl FeedWatch {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            phase: WatchPhase::Uninitialized,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn phase(&self) -> &WatchPhase {
        &self.phase
    }

    pub fn phase_kind(&self) -> PhaseKind {
        match self.phase {
            WatchPhase::Uninitialized => PhaseKind::Uninitialized,
            WatchPhase::Unresolvable { .. } => PhaseKind::Unresolvable,
            WatchPhase::IdentityResolved(_) => PhaseKind::IdentityResolved,
            WatchPhase::WatermarkSeeded(..) => PhaseKind::WatermarkSeeded,
            WatchPhase::Steady(..) => PhaseKind::Steady,
        }
    }

    pub fn identity(&self) -> Option<&AccountIdentity> {
        match &self.phase {
            WatchPhase::IdentityResolved(identity)
            | WatchPhase::WatermarkSeeded(identity, _)
            | WatchPhase::Steady(identity, _) => Some(identity),
            WatchPhase::Uninitialized | WatchPhase::Unresolvable { .. } => None,
        }
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        match self.phase {
            WatchPhase::WatermarkSeeded(_, watermark) | WatchPhase::Steady(_, watermark) => {
                Some(watermark)
            }
            _ => None,
        }
    }

    /// The transition function: consume the state, return the next one.
    pub fn step(mut self, response: FeedResponse<'_>) -> (Self, Step) {
        let step = self.apply(response);
        (self, step)
    }

    /// In-place form of [`FeedWatch::step`].
    pub fn apply(&mut self, response: FeedResponse<'_>) -> Step {
        let phase = std::mem::replace(&mut self.phase, WatchPhase::Uninitialized);
        let (phase, step) = advance(&self.uid, phase, response);
        self.phase = phase;
        step
    }
}

fn advance(uid: &str, phase: WatchPhase, response: FeedResponse<'_>) -> (WatchPhase, Step) {
    let value = match schema::decode(response.body) {
        Ok(value) => value,
        Err(e) => return (phase, Step::quiet(Outcome::Rejected(e))),
    };

    match phase {
        WatchPhase::Uninitialized | WatchPhase::Unresolvable { .. } => {
            let index = match schema::validate_index(&value) {
                Ok(index) => index,
                Err(e) => return (phase, Step::quiet(Outcome::Rejected(e))),
            };
            let display_name = index.screen_name().to_string();
            match index.feed_container_id() {
                Some(container_id) => {
                    let identity = AccountIdentity {
                        uid: uid.to_string(),
                        display_name,
                        feed_container_id: container_id.to_string(),
                    };
                    (
                        WatchPhase::IdentityResolved(identity),
                        Step::quiet(Outcome::IdentityResolved),
                    )
                }
                None => (
                    WatchPhase::Unresolvable { display_name },
                    Step::quiet(Outcome::IdentityUnresolvable),
                ),
            }
        }

        WatchPhase::IdentityResolved(identity) => {
            let cards = match card_list_for(&identity, &value, response.request_url) {
                Ok(cards) => cards,
                Err(outcome) => return (WatchPhase::IdentityResolved(identity), Step::quiet(outcome)),
            };
            match batch_max(&cards) {
                Some(watermark) => (
                    WatchPhase::WatermarkSeeded(identity, watermark),
                    Step::quiet(Outcome::Seeded { watermark }),
                ),
                None => (WatchPhase::IdentityResolved(identity), Step::quiet(Outcome::Empty)),
            }
        }

        WatchPhase::WatermarkSeeded(identity, watermark) => {
            diff_batch(identity, watermark, false, &value, response.request_url)
        }
        WatchPhase::Steady(identity, watermark) => {
            diff_batch(identity, watermark, true, &value, response.request_url)
        }
    }
}

/// Diff a card list against the watermark. Anything that isn't a batch for
/// our container leaves the phase exactly as it was.
fn diff_batch(
    identity: AccountIdentity,
    watermark: DateTime<Utc>,
    steady: bool,
    value: &serde_json::Value,
    request_url: &str,
) -> (WatchPhase, Step) {
    let cards = match card_list_for(&identity, value, request_url) {
        Ok(cards) => cards,
        Err(outcome) => {
            let phase = if steady {
                WatchPhase::Steady(identity, watermark)
            } else {
                WatchPhase::WatermarkSeeded(identity, watermark)
            };
            return (phase, Step::quiet(outcome));
        }
    };

    let batch = classify_batch(&cards, watermark, &identity.display_name);
    let step = Step {
        outcome: Outcome::Processed {
            candidates: batch.candidates,
            watermark: batch.watermark,
        },
        notifications: batch.notifications,
    };
    (WatchPhase::Steady(identity, batch.watermark), step)
}

/// Validate a card list and check it belongs to the watched feed container.
fn card_list_for(
    identity: &AccountIdentity,
    value: &serde_json::Value,
    request_url: &str,
) -> Result<Vec<Card>, Outcome> {
    let payload = schema::validate_card_list(value).map_err(Outcome::Rejected)?;
    if !request_targets_container(request_url, &identity.feed_container_id) {
        return Err(Outcome::OtherContainer);
    }
    Ok(payload.data.cards)
}
