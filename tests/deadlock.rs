//! Integration-level scenarios from the testable-properties list: a
//! two-party deadlock under concurrent retrying clients, driven entirely
//! through [`MemoryStore`] so the test needs no external process.

use redisrwlock::{Mode, MemoryStore, RwlockClient, Status, FOREVER};

const RETRY_INTERVAL: f64 = 0.02;

#[tokio::test]
async fn two_party_deadlock_has_exactly_one_victim() {
    let store = MemoryStore::new();
    let a = RwlockClient::new(store.clone(), "", "node-a", 1).await.unwrap();
    let b = RwlockClient::new(store.clone(), "", "node-b", 2).await.unwrap();

    // A holds N-DL1 W; B holds N-DL2 W.
    let a_first = a.lock("N-DL1", Mode::Write, 0.0, RETRY_INTERVAL).await.unwrap();
    assert_eq!(a_first.status, Status::Ok);
    let b_first = b.lock("N-DL2", Mode::Write, 0.0, RETRY_INTERVAL).await.unwrap();
    assert_eq!(b_first.status, Status::Ok);

    // Now cross-acquire: B wants N-DL1 (held by A), A wants N-DL2 (held by B).
    // Whichever call is elected the deadlock victim must back out the work
    // it was already holding, so its peer's retry can observe the freed
    // grant and proceed.
    let b_second = tokio::spawn(async move {
        let token = b.lock("N-DL1", Mode::Write, FOREVER, RETRY_INTERVAL).await.unwrap();
        if token.status == Status::Deadlock {
            b.unlock(&b_first).await.unwrap();
        }
        token
    });
    let a_second = tokio::spawn(async move {
        let token = a.lock("N-DL2", Mode::Read, 2.0, RETRY_INTERVAL).await.unwrap();
        if token.status == Status::Deadlock {
            a.unlock(&a_first).await.unwrap();
        }
        token
    });

    let (b_result, a_result) = tokio::join!(b_second, a_second);
    let b_token = b_result.unwrap();
    let a_token = a_result.unwrap();

    let statuses = [a_token.status, b_token.status];
    let deadlocks = statuses.iter().filter(|s| **s == Status::Deadlock).count();
    let oks = statuses.iter().filter(|s| **s == Status::Ok).count();

    assert_eq!(deadlocks, 1, "exactly one participant should self-abort");
    assert_eq!(oks, 1, "the other participant should proceed once the victim backs out");
}
