//! Canonical-row selection for natural-keyed tables.
//!
//! The store cannot enforce uniqueness, so a natural-key lookup may return
//! zero, one, or several rows. Every reader funnels the lookup result through
//! [`resolve`], which picks the same row regardless of the order rows arrive
//! in. Writers use [`split_canonical`] (via the janitor) to also learn which
//! rows lost and should be deleted.

use std::cmp::Ordering;

use crate::models::{AuthAccountRow, ChannelRow, FriendshipRow, RateLimitRow, SessionRow, UserRow};

/// A row that can stand in for its natural key.
pub trait Reconcilable {
    /// Table the row lives in; used by the janitor to delete losers.
    const TABLE: &'static str;

    fn id(&self) -> &str;

    /// Store-assigned insertion sequence.
    fn seq(&self) -> i64;

    /// Freshest-intent attributes, compared lexicographically, larger wins.
    fn freshness(&self) -> (i64, i64);
}

/// Total order over candidate rows: freshness, then insertion sequence,
/// then id so that even pathological inputs compare unequal.
pub fn compare<T: Reconcilable>(a: &T, b: &T) -> Ordering {
    a.freshness()
        .cmp(&b.freshness())
        .then_with(|| a.seq().cmp(&b.seq()))
        .then_with(|| a.id().cmp(b.id()))
}

/// Pick the canonical row, or `None` when the lookup found nothing.
pub fn resolve<T: Reconcilable>(rows: &[T]) -> Option<&T> {
    rows.iter().max_by(|a, b| compare(*a, *b))
}

/// Split a lookup result into the canonical row and the rows that lost.
pub fn split_canonical<T: Reconcilable>(mut rows: Vec<T>) -> Option<(T, Vec<T>)> {
    let winner = resolve(&rows)?;
    let idx = rows.iter().position(|row| std::ptr::eq(row, winner))?;
    let canonical = rows.swap_remove(idx);
    Some((canonical, rows))
}

/// Owned variant of [`resolve`] for readers that discard the scan.
pub fn into_canonical<T: Reconcilable>(rows: Vec<T>) -> Option<T> {
    split_canonical(rows).map(|(canonical, _)| canonical)
}

// -- Per-entity ordering --

impl Reconcilable for SessionRow {
    const TABLE: &'static str = "sessions";

    fn id(&self) -> &str {
        &self.id
    }

    fn seq(&self) -> i64 {
        self.seq
    }

    fn freshness(&self) -> (i64, i64) {
        (self.expires_at, self.created_at)
    }
}

impl Reconcilable for UserRow {
    const TABLE: &'static str = "users";

    fn id(&self) -> &str {
        &self.id
    }

    fn seq(&self) -> i64 {
        self.seq
    }

    fn freshness(&self) -> (i64, i64) {
        (self.created_at, 0)
    }
}

impl Reconcilable for AuthAccountRow {
    const TABLE: &'static str = "auth_accounts";

    fn id(&self) -> &str {
        &self.id
    }

    fn seq(&self) -> i64 {
        self.seq
    }

    fn freshness(&self) -> (i64, i64) {
        (self.last_used_at, self.created_at)
    }
}

impl Reconcilable for RateLimitRow {
    const TABLE: &'static str = "rate_limits";

    fn id(&self) -> &str {
        &self.id
    }

    fn seq(&self) -> i64 {
        self.seq
    }

    fn freshness(&self) -> (i64, i64) {
        (self.updated_at, self.window_start)
    }
}

impl Reconcilable for FriendshipRow {
    const TABLE: &'static str = "friendships";

    fn id(&self) -> &str {
        &self.id
    }

    fn seq(&self) -> i64 {
        self.seq
    }

    fn freshness(&self) -> (i64, i64) {
        (self.created_at, 0)
    }
}

impl Reconcilable for ChannelRow {
    const TABLE: &'static str = "channels";

    fn id(&self) -> &str {
        &self.id
    }

    fn seq(&self) -> i64 {
        self.seq
    }

    fn freshness(&self) -> (i64, i64) {
        (self.created_at, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str, seq: i64, expires_at: i64, created_at: i64) -> SessionRow {
        SessionRow {
            id: id.to_string(),
            seq,
            user_id: "u1".to_string(),
            token_hash: "h".to_string(),
            expires_at,
            created_at,
        }
    }

    fn user(id: &str, seq: i64, created_at: i64) -> UserRow {
        UserRow {
            id: id.to_string(),
            seq,
            username: "Alice".to_string(),
            username_normalized: "alice".to_string(),
            password: String::new(),
            created_at,
        }
    }

    /// Heap's algorithm; small N only.
    fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
        fn heap<T: Clone>(k: usize, items: &mut Vec<T>, out: &mut Vec<Vec<T>>) {
            if k <= 1 {
                out.push(items.clone());
                return;
            }
            heap(k - 1, items, out);
            for i in 0..k - 1 {
                let j = if k % 2 == 0 { i } else { 0 };
                items.swap(j, k - 1);
                heap(k - 1, items, out);
            }
        }
        let mut items = items.to_vec();
        let mut out = Vec::new();
        let n = items.len();
        heap(n, &mut items, &mut out);
        out
    }

    #[test]
    fn test_empty_input_has_no_canonical_row() {
        let rows: Vec<UserRow> = vec![];
        assert!(resolve(&rows).is_none());
        assert!(split_canonical(rows).is_none());
    }

    #[test]
    fn test_single_row_is_canonical() {
        let rows = vec![user("a", 1, 10)];
        assert_eq!(resolve(&rows).unwrap().id, "a");
        let (canonical, losers) = split_canonical(rows).unwrap();
        assert_eq!(canonical.id, "a");
        assert!(losers.is_empty());
    }

    #[test]
    fn test_resolution_is_order_independent() {
        let rows = vec![
            session("s1", 1, 500, 10),
            session("s2", 2, 900, 20),
            session("s3", 3, 700, 30),
            session("s4", 4, 100, 40),
        ];

        for perm in permutations(&rows) {
            assert_eq!(resolve(&perm).unwrap().id, "s2");
            let (canonical, losers) = split_canonical(perm).unwrap();
            assert_eq!(canonical.id, "s2");
            assert_eq!(losers.len(), 3);
            assert!(losers.iter().all(|r| r.id != "s2"));
        }
    }

    #[test]
    fn test_secondary_attribute_breaks_primary_tie() {
        // Same expiry; later creation wins.
        let rows = vec![session("old", 9, 500, 10), session("new", 1, 500, 20)];
        assert_eq!(resolve(&rows).unwrap().id, "new");
    }

    #[test]
    fn test_insertion_sequence_is_final_tiebreak() {
        let rows = vec![user("b", 7, 100), user("a", 3, 100), user("c", 5, 100)];
        for perm in permutations(&rows) {
            assert_eq!(resolve(&perm).unwrap().id, "b");
        }
    }

    #[test]
    fn test_rate_limit_prefers_latest_update() {
        let row = |id: &str, seq, window_start, updated_at| RateLimitRow {
            id: id.to_string(),
            seq,
            action: "login".to_string(),
            key: "alice".to_string(),
            window_start,
            count: 1,
            updated_at,
        };
        let rows = vec![row("a", 1, 1_000, 5_000), row("b", 2, 2_000, 4_000)];
        assert_eq!(resolve(&rows).unwrap().id, "a");
    }

    #[test]
    fn test_provider_link_prefers_last_used() {
        let row = |id: &str, seq, last_used_at, created_at| AuthAccountRow {
            id: id.to_string(),
            seq,
            user_id: "u1".to_string(),
            provider: "github".to_string(),
            provider_account_id: "42".to_string(),
            last_used_at,
            created_at,
        };
        let rows = vec![row("a", 1, 50, 10), row("b", 2, 40, 90), row("c", 3, 50, 5)];
        assert_eq!(resolve(&rows).unwrap().id, "a");
    }
}
