//! Per-board ordering point for position changes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as SyncMutex, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::foundation::BoardId;

type LockTable = Arc<SyncMutex<HashMap<BoardId, Arc<Mutex<()>>>>>;

/// One async mutex per board.
///
/// Operations touching several boards lock them in ascending id order, so
/// two cross-board moves in opposite directions cannot deadlock. An entry
/// lives only while some operation holds or waits for it.
#[derive(Default)]
pub struct BoardLocks {
    locks: LockTable,
}

/// Guards held for the duration of one operation.
pub struct BoardGuard {
    table: LockTable,
    boards: Vec<BoardId>,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl BoardLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks every board in `boards`, deduplicated, in sorted order.
    pub async fn lock(&self, boards: &[BoardId]) -> BoardGuard {
        let mut ids = boards.to_vec();
        ids.sort();
        ids.dedup();

        let mutexes: Vec<_> = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            ids.iter()
                .map(|id| Arc::clone(locks.entry(*id).or_default()))
                .collect()
        };

        let mut guard = BoardGuard {
            table: Arc::clone(&self.locks),
            boards: ids,
            guards: Vec::with_capacity(mutexes.len()),
        };
        for mutex in mutexes {
            guard.guards.push(mutex.lock_owned().await);
        }
        guard
    }

    /// Boards with a live entry.
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for BoardGuard {
    fn drop(&mut self) {
        self.guards.clear();
        let mut locks = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        for id in &self.boards {
            // Only the table's own reference left: nobody holds or waits.
            if locks.get(id).is_some_and(|mutex| Arc::strong_count(mutex) == 1) {
                locks.remove(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_board_is_serialized() {
        let locks = Arc::new(BoardLocks::new());
        let board = BoardId::new();

        let guard = locks.lock(&[board]).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&[board]).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn opposite_order_cross_board_locks_do_not_deadlock() {
        let locks = Arc::new(BoardLocks::new());
        let a = BoardId::new();
        let b = BoardId::new();

        let mut tasks = Vec::new();
        for i in 0..20 {
            let locks = locks.clone();
            let boards = if i % 2 == 0 { [a, b] } else { [b, a] };
            tasks.push(tokio::spawn(async move {
                let _guard = locks.lock(&boards).await;
                tokio::task::yield_now().await;
            }));
        }

        let all = futures::future::join_all(tasks);
        let results = tokio::time::timeout(Duration::from_secs(5), all)
            .await
            .expect("cross-board locking deadlocked");
        assert!(results.into_iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn duplicate_ids_lock_once() {
        let locks = BoardLocks::new();
        let board = BoardId::new();
        let _guard = locks.lock(&[board, board]).await;
    }

    #[tokio::test]
    async fn released_boards_leave_no_entries() {
        let locks = BoardLocks::new();
        let a = BoardId::new();
        let b = BoardId::new();

        let first = locks.lock(&[a, b]).await;
        let second = locks.lock(&[BoardId::new()]).await;
        assert_eq!(locks.tracked(), 3);

        drop(first);
        assert_eq!(locks.tracked(), 1);
        drop(second);
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn entry_survives_while_someone_waits() {
        let locks = Arc::new(BoardLocks::new());
        let board = BoardId::new();
        let guard = locks.lock(&[board]).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&[board]).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        assert_eq!(locks.tracked(), 1);
        waiter.await.unwrap();
        assert_eq!(locks.tracked(), 0);
    }
}
