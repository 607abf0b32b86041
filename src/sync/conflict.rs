//! Last-Writer-Wins conflict resolution between local and remote state.

use super::record::StateRecord;

/// Decide whether `candidate` should replace `current`.
///
/// Higher timestamp wins; nothing yet known means any candidate wins.
/// The comparison is strict, so an equal timestamp never replaces the
/// current record and duplicate deliveries of the same datagram are inert.
///
/// There is deliberately no tiebreaker between peers and no skew
/// compensation: two peers stamping the same millisecond keep their own
/// view, and a peer whose clock runs ahead can mask later edits from a
/// peer whose clock runs behind.
pub fn is_newer(candidate: &StateRecord, current: Option<&StateRecord>) -> bool {
    match current {
        None => true,
        Some(current) => candidate.timestamp() > current.timestamp(),
    }
}
