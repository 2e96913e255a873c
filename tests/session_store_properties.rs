use std::collections::HashMap;

use consult_engine::domain::{ExpertName, Recommendation, Session, Turn};
use consult_engine::session_store::{AppendOutcome, MemoryBackend, SessionBackend};
use proptest::prelude::*;

fn sample_turn(confidence: f64) -> Turn {
    let rec = Recommendation::diagnostic();
    Turn {
        user_message: "question".to_string(),
        reply: "reply".to_string(),
        at: chrono::Utc::now(),
        participating_experts: vec![ExpertName::A],
        expert_processing_time: HashMap::new(),
        confidence_level: confidence,
        moderator_record: rec.provenance,
    }
}

proptest! {
    /// Spec §8 invariant 1: `conversation_count == history.len()` after
    /// every successful turn, as long as eviction never kicks in.
    #[test]
    fn counter_tracks_history_len_below_eviction_cap(turn_count in 1u32..10) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = MemoryBackend::new();
            let session = store.create("owner".to_string(), None).await.unwrap();
            let mut expected = 0u64;
            for i in 0..turn_count {
                let outcome = store
                    .append_turn(&session.id, expected, sample_turn(0.5), 1000)
                    .await
                    .unwrap();
                let AppendOutcome::Committed(updated) = outcome else {
                    panic!("expected commit at turn {i}");
                };
                prop_assert_eq!(updated.conversation_count, updated.history.len() as u64);
                expected = updated.conversation_count;
            }
            Ok(())
        })?;
    }

    /// Spec §8 invariant 5: idempotence of fetch — two sequential `get`
    /// calls with no intervening mutation return equal documents.
    #[test]
    fn sequential_get_without_mutation_is_idempotent(_seed in 0u32..5) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = MemoryBackend::new();
            let session = store.create("owner".to_string(), None).await.unwrap();
            store
                .append_turn(&session.id, 0, sample_turn(0.6), 50)
                .await
                .unwrap();

            let first = store.get(&session.id).await.unwrap();
            let second = store.get(&session.id).await.unwrap();
            prop_assert_eq!(
                serde_json::to_string(&first).unwrap(),
                serde_json::to_string(&second).unwrap()
            );
            Ok(())
        })?;
    }

    /// Spec §8 invariant 6: round-trip of session serialization.
    #[test]
    fn session_round_trips_through_json(confidence in 0.3f64..0.95) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = MemoryBackend::new();
            let session = store.create("owner".to_string(), None).await.unwrap();
            let outcome = store
                .append_turn(&session.id, 0, sample_turn(confidence), 50)
                .await
                .unwrap();
            let AppendOutcome::Committed(committed) = outcome else {
                panic!("expected commit");
            };

            let json = serde_json::to_string(&committed).unwrap();
            let roundtripped: Session = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(roundtripped.id, committed.id);
            prop_assert_eq!(roundtripped.conversation_count, committed.conversation_count);
            prop_assert_eq!(roundtripped.history.len(), committed.history.len());
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn stale_expected_count_never_mutates_state() {
    let store = MemoryBackend::new();
    let session = store.create("owner".to_string(), None).await.unwrap();
    store.append_turn(&session.id, 0, sample_turn(0.5), 50).await.unwrap();

    let before = store.get(&session.id).await.unwrap();
    let outcome = store.append_turn(&session.id, 0, sample_turn(0.5), 50).await.unwrap();
    assert!(matches!(outcome, AppendOutcome::Conflict));

    let after = store.get(&session.id).await.unwrap();
    assert_eq!(before.conversation_count, after.conversation_count);
    assert_eq!(before.history.len(), after.history.len());
}

#[tokio::test]
async fn append_to_missing_session_returns_not_found() {
    let store = MemoryBackend::new();
    let outcome = store
        .append_turn("sess_doesnotexist", 0, sample_turn(0.5), 50)
        .await
        .unwrap();
    assert!(matches!(outcome, AppendOutcome::NotFound));
}
