//! Subscriber lists for a single message type.

use crate::bus::WorkerId;

/// Ordered set of workers subscribed to one message type, with a round-robin cursor.
///
/// Broadcast rosters simply never advance the cursor.
#[derive(Debug, Default, Clone)]
pub(crate) struct Roster {
    members: Vec<WorkerId>,
    /// Index of the member that receives the next event.
    cursor: usize,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member at the end of the rotation. Returns `false` if it was already present.
    pub fn insert(&mut self, id: WorkerId) -> bool {
        if self.members.contains(&id) {
            return false;
        }
        self.members.push(id);
        true
    }

    /// Remove a member, keeping the rotation order of everyone else intact.
    pub fn remove(&mut self, id: WorkerId) -> bool {
        let Some(position) = self.members.iter().position(|member| *member == id) else {
            return false;
        };
        self.members.remove(position);
        if position < self.cursor {
            self.cursor -= 1;
        }
        if self.cursor >= self.members.len() {
            self.cursor = 0;
        }
        true
    }

    /// The member whose turn it is, advancing the cursor past it.
    pub fn advance(&mut self) -> Option<WorkerId> {
        if self.members.is_empty() {
            return None;
        }
        let index = self.cursor % self.members.len();
        self.cursor = (index + 1) % self.members.len();
        Some(self.members[index])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[inline]
    pub fn members(&self) -> &[WorkerId] {
        &self.members
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u32]) -> Vec<WorkerId> {
        raw.iter().copied().map(WorkerId::new).collect()
    }

    fn roster(raw: &[u32]) -> Roster {
        let mut roster = Roster::new();
        for id in ids(raw) {
            roster.insert(id);
        }
        roster
    }

    #[test]
    fn empty_roster_has_no_turn() {
        let mut roster = Roster::new();

        assert!(roster.is_empty());
        assert_eq!(roster.advance(), None);
    }

    #[test]
    fn insert_ignores_duplicates() {
        let mut roster = roster(&[1, 2]);

        assert!(!roster.insert(WorkerId::new(1)));
        assert_eq!(roster.members(), ids(&[1, 2]).as_slice());
    }

    #[test]
    fn advance_rotates_through_members() {
        let mut roster = roster(&[1, 2, 3]);

        let turns: Vec<_> = (0..7).filter_map(|_| roster.advance()).collect();

        assert_eq!(turns, ids(&[1, 2, 3, 1, 2, 3, 1]));
    }

    #[test]
    fn removing_an_earlier_member_keeps_the_next_turn() {
        let mut roster = roster(&[1, 2, 3]);
        roster.advance();
        roster.advance();

        // Worker 3 is next; dropping worker 1 must not skip it.
        assert!(roster.remove(WorkerId::new(1)));

        assert_eq!(roster.advance(), Some(WorkerId::new(3)));
        assert_eq!(roster.advance(), Some(WorkerId::new(2)));
    }

    #[test]
    fn removing_the_next_member_passes_the_turn_on() {
        let mut roster = roster(&[1, 2, 3]);
        roster.advance();

        assert!(roster.remove(WorkerId::new(2)));

        assert_eq!(roster.advance(), Some(WorkerId::new(3)));
        assert_eq!(roster.advance(), Some(WorkerId::new(1)));
    }

    #[test]
    fn removing_the_last_member_wraps_the_cursor() {
        let mut roster = roster(&[1, 2, 3]);
        roster.advance();
        roster.advance();

        assert!(roster.remove(WorkerId::new(3)));

        assert_eq!(roster.advance(), Some(WorkerId::new(1)));
    }

    #[test]
    fn remove_unknown_member_is_a_no_op() {
        let mut roster = roster(&[1]);

        assert!(!roster.remove(WorkerId::new(9)));
        assert_eq!(roster.len(), 1);
    }
}
