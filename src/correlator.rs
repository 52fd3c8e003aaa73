//! Request correlation: which UI slot does a response belong to, and is it still wanted?
//!
//! The two format previews own stable correlation ids (`1`, `2`). Everything else
//! goes to the single unlabelled calculation slot and is matched by request kind.
//!
//! Every slot keeps a ledger of sent-but-unresolved requests in send order. The
//! runtime answers strictly FIFO, so a response always resolves the ledger's front
//! entry; it is `Current` only if that entry carries the slot's latest generation.

use std::collections::VecDeque;
use std::fmt;

use crate::config::limits::FORMAT_SLOT_COUNT;
use crate::protocol::{CorrelationId, RequestKind};
use crate::runtime::DispatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatSlot {
    First,
    Second,
}

impl FormatSlot {
    pub const ALL: [FormatSlot; FORMAT_SLOT_COUNT] = [FormatSlot::First, FormatSlot::Second];

    pub fn index(self) -> usize {
        match self {
            FormatSlot::First => 0,
            FormatSlot::Second => 1,
        }
    }

    pub fn from_correlation_id(id: CorrelationId) -> Option<Self> {
        match id {
            1 => Some(FormatSlot::First),
            2 => Some(FormatSlot::Second),
            _ => None,
        }
    }
}

/// A logical UI destination for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Format(FormatSlot),
    Calculation,
}

impl Slot {
    pub fn as_str(self) -> &'static str {
        match self {
            Slot::Format(FormatSlot::First) => "format-1",
            Slot::Format(FormatSlot::Second) => "format-2",
            Slot::Calculation => "calculation",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle for one sent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub slot: Slot,
    pub generation: u64,
    pub kind: RequestKind,
}

/// What to do with an incoming response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Answers the newest request for its slot: apply it.
    Current(Ticket),
    /// Answers a request that has since been superseded: discard.
    Stale(Ticket),
    /// Answers a request that already timed out: discard.
    Expired(Ticket),
    /// No pending request matches: protocol defect.
    Unmatched,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    generation: u64,
    kind: RequestKind,
    timed_out: bool,
}

#[derive(Debug, Default)]
struct Ledger {
    latest: u64,
    in_flight: VecDeque<InFlight>,
}

impl Ledger {
    fn next_generation(&mut self) -> u64 {
        self.latest += 1;
        self.latest
    }

    fn live(&self) -> usize {
        self.in_flight.iter().filter(|e| !e.timed_out).count()
    }
}

#[derive(Debug, Default)]
pub struct Correlator {
    formats: [Ledger; FORMAT_SLOT_COUNT],
    calculation: Ledger,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stable correlation id for a format stream. The same id for its whole lifetime.
    pub fn allocate(&self, slot: FormatSlot) -> CorrelationId {
        (slot.index() + 1) as CorrelationId
    }

    pub fn slot_for(&self, id: CorrelationId) -> Option<Slot> {
        FormatSlot::from_correlation_id(id).map(Slot::Format)
    }

    fn ledger(&self, slot: Slot) -> &Ledger {
        match slot {
            Slot::Format(f) => &self.formats[f.index()],
            Slot::Calculation => &self.calculation,
        }
    }

    fn ledger_mut(&mut self, slot: Slot) -> &mut Ledger {
        match slot {
            Slot::Format(f) => &mut self.formats[f.index()],
            Slot::Calculation => &mut self.calculation,
        }
    }

    /// True while a calculation is awaiting its response.
    pub fn is_busy(&self) -> bool {
        self.calculation.live() > 0
    }

    pub fn latest_generation(&self, slot: Slot) -> u64 {
        self.ledger(slot).latest
    }

    /// Number of sent requests still waiting on a response (timed-out ones excluded).
    pub fn outstanding(&self) -> usize {
        self.formats.iter().map(Ledger::live).sum::<usize>() + self.calculation.live()
    }

    /// Record a request about to be sent and make it the slot's latest generation.
    ///
    /// The calculation slot admits one live request at a time.
    pub fn begin(&mut self, slot: Slot, kind: RequestKind) -> Result<Ticket, DispatchError> {
        if slot == Slot::Calculation && self.is_busy() {
            return Err(DispatchError::Busy);
        }
        let ledger = self.ledger_mut(slot);
        let generation = ledger.next_generation();
        ledger.in_flight.push_back(InFlight {
            generation,
            kind,
            timed_out: false,
        });
        Ok(Ticket {
            slot,
            generation,
            kind,
        })
    }

    /// Consume a generation for a request rejected before it was sent, so any
    /// response still in flight for the slot becomes stale.
    pub fn fail_local(&mut self, slot: Slot) -> u64 {
        self.ledger_mut(slot).next_generation()
    }

    /// Forget a ticket whose request never reached the runtime.
    pub fn abandon(&mut self, ticket: &Ticket) {
        let ledger = self.ledger_mut(ticket.slot);
        ledger
            .in_flight
            .retain(|e| e.generation != ticket.generation);
    }

    /// Mark a request as timed out. Returns `Some(true)` when it was the slot's
    /// latest generation, `Some(false)` when superseded, `None` when it had already
    /// been resolved.
    pub fn expire(&mut self, slot: Slot, generation: u64) -> Option<bool> {
        let ledger = self.ledger_mut(slot);
        let latest = ledger.latest;
        let entry = ledger
            .in_flight
            .iter_mut()
            .find(|e| e.generation == generation && !e.timed_out)?;
        entry.timed_out = true;
        Some(generation == latest)
    }

    /// Drop every unresolved, unexpired entry. Each ticket comes with whether it
    /// was its slot's latest generation.
    pub fn drain_in_flight(&mut self) -> Vec<(Ticket, bool)> {
        let slots = FormatSlot::ALL
            .into_iter()
            .map(Slot::Format)
            .chain(std::iter::once(Slot::Calculation));
        let mut drained = Vec::new();
        for slot in slots {
            let ledger = self.ledger_mut(slot);
            let latest = ledger.latest;
            for entry in ledger.in_flight.drain(..).filter(|e| !e.timed_out) {
                let ticket = Ticket {
                    slot,
                    generation: entry.generation,
                    kind: entry.kind,
                };
                drained.push((ticket, entry.generation == latest));
            }
        }
        drained
    }

    /// Match a response to the request it answers and consume that request.
    pub fn resolve(&mut self, id: Option<CorrelationId>, kind: Option<RequestKind>) -> Resolution {
        let slot = match (id, kind) {
            (Some(id), None | Some(RequestKind::Format)) => match self.slot_for(id) {
                Some(slot) => slot,
                None => return Resolution::Unmatched,
            },
            (Some(_), Some(_)) => return Resolution::Unmatched,
            (None, None | Some(RequestKind::Format)) => return Resolution::Unmatched,
            (None, Some(_)) => Slot::Calculation,
        };

        let ledger = self.ledger_mut(slot);
        let Some(front) = ledger.in_flight.front().copied() else {
            return Resolution::Unmatched;
        };
        if let Some(kind) = kind {
            if front.kind != kind {
                return Resolution::Unmatched;
            }
        }
        ledger.in_flight.pop_front();
        let ticket = Ticket {
            slot,
            generation: front.generation,
            kind: front.kind,
        };
        if front.timed_out {
            Resolution::Expired(ticket)
        } else if front.generation == ledger.latest {
            Resolution::Current(ticket)
        } else {
            Resolution::Stale(ticket)
        }
    }
}
