//! Property-based tests for the pending action queue

use community_sync::client::offline::{Action, DrainDecision, PendingActionQueue};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn like(n: usize) -> Action {
    Action::LikePost {
        post_id: format!("p{}", n),
        liked: true,
    }
}

proptest! {
    #[test]
    fn test_drain_visits_actions_in_enqueue_order(count in 0usize..40) {
        let visited = runtime().block_on(async {
            let queue = PendingActionQueue::new();
            for n in 0..count {
                queue.enqueue(like(n)).await;
            }

            let mut visited = Vec::new();
            let report = queue
                .drain(|pending| {
                    visited.push(pending.action.clone());
                    async { DrainDecision::Completed }
                })
                .await;
            assert_eq!(report.completed, count);
            assert!(queue.is_empty().await);
            visited
        });

        let expected: Vec<Action> = (0..count).map(like).collect();
        prop_assert_eq!(visited, expected);
    }

    #[test]
    fn test_requeued_actions_keep_relative_order(decisions in prop::collection::vec(0u8..4, 0..40)) {
        let (remaining, report) = runtime().block_on(async {
            let queue = PendingActionQueue::new();
            for n in 0..decisions.len() {
                queue.enqueue(like(n)).await;
            }

            let mut index = 0;
            let report = queue
                .drain(|_| {
                    let decision = match decisions[index] {
                        0 => DrainDecision::Completed,
                        1 => DrainDecision::Retry,
                        2 => DrainDecision::Defer,
                        _ => DrainDecision::Discard,
                    };
                    index += 1;
                    async move { decision }
                })
                .await;

            let remaining: Vec<Action> = queue
                .snapshot()
                .await
                .into_iter()
                .map(|pending| pending.action)
                .collect();
            (remaining, report)
        });

        let expected: Vec<Action> = decisions
            .iter()
            .enumerate()
            .filter(|(_, decision)| matches!(**decision, 1 | 2))
            .map(|(n, _)| like(n))
            .collect();
        prop_assert_eq!(report.processed, decisions.len());
        prop_assert_eq!(report.retried + report.deferred, expected.len());
        prop_assert_eq!(remaining, expected);
    }
}
