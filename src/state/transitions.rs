//! The `VALID_TRANSITIONS` DAG (§3 lifecycles, §4.2): a static edge list
//! keyed by `(from, to)`, checked with a linear scan rather than a hash
//! table — the table has a few dozen entries and is read on every
//! transition, so a `const` slice the compiler can inline beats the
//! allocation of a `HashMap` built at startup.

use crate::types::MemoryState;
use MemoryState::*;

/// `(from, to)` edges that a `transition` call may take directly, plus the
/// FAILED escape hatch reachable from every non-terminal state and its two
/// recovery targets.
pub const VALID_TRANSITIONS: &[(MemoryState, MemoryState)] = &[
    (Pending, Processing),
    (Processing, Processed),
    (Processed, ConsciousPending),
    (ConsciousPending, ConsciousProcessing),
    (ConsciousProcessing, ConsciousProcessed),
    (ConsciousProcessed, DuplicateCheckPending),
    (Processed, DuplicateCheckPending),
    (DuplicateCheckPending, DuplicateCheckProcessing),
    (DuplicateCheckProcessing, ConsolidationPending),
    (DuplicateCheckProcessing, Processed),
    (ConsolidationPending, ConsolidationProcessing),
    (ConsolidationProcessing, Consolidated),
    (Consolidated, CleanupPending),
    (CleanupPending, CleanupProcessing),
    (CleanupProcessing, Cleaned),
    // FAILED is reachable from every non-terminal state.
    (Pending, Failed),
    (Processing, Failed),
    (Processed, Failed),
    (ConsciousPending, Failed),
    (ConsciousProcessing, Failed),
    (ConsciousProcessed, Failed),
    (DuplicateCheckPending, Failed),
    (DuplicateCheckProcessing, Failed),
    (ConsolidationPending, Failed),
    (ConsolidationProcessing, Failed),
    (CleanupPending, Failed),
    (CleanupProcessing, Failed),
    // FAILED re-enters at PENDING or CLEANUP_PENDING.
    (Failed, Pending),
    (Failed, CleanupPending),
];

/// Terminal states have no outgoing edges in [`VALID_TRANSITIONS`].
pub fn is_terminal(state: MemoryState) -> bool {
    !VALID_TRANSITIONS.iter().any(|(from, _)| *from == state)
}

pub fn is_valid(from: MemoryState, to: MemoryState) -> bool {
    VALID_TRANSITIONS.iter().any(|edge| *edge == (from, to))
}

/// Every state reachable directly from `from`, in table order.
pub fn successors(from: MemoryState) -> Vec<MemoryState> {
    VALID_TRANSITIONS
        .iter()
        .filter(|(f, _)| *f == from)
        .map(|(_, to)| *to)
        .collect()
}
