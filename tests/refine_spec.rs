mod common;

use common::*;
use matseg::client::ClientError;
use matseg::models::*;
use matseg::prompts::PromptStore;
use matseg::refine::{RefineRequest, RefinementOrchestrator, RefinementOutcome, RefinementReply};
use matseg::stats::StatsReducer;
use speculate2::speculate;

const SIZE: u32 = 20;

fn session(id: &str) -> Session {
    Session {
        id: id.to_string(),
        image_url: format!("/static/uploads/{}.png", id),
        native_width: SIZE,
        native_height: SIZE,
        state: SessionState::Active,
    }
}

fn bound(id: &str) -> RefinementOrchestrator {
    let mut orchestrator = RefinementOrchestrator::new(StatsReducer::default());
    orchestrator.reset(&session(id));
    orchestrator
}

/// Issue `n` point additions and return the requests in version order.
fn issue(orchestrator: &mut RefinementOrchestrator, store: &mut PromptStore, n: u64) -> Vec<RefineRequest> {
    (0..n)
        .map(|i| {
            let snapshot = store.add_point(ImagePoint::new(i as f64, 1.0), PromptLabel::Positive);
            orchestrator
                .on_snapshot(&snapshot)
                .expect("non-empty snapshot issues a request")
        })
        .collect()
}

/// Mask for `version` with `version` foreground rows, so each is distinguishable.
fn mask_for(version: u64) -> Mask {
    rows_mask(SIZE, SIZE, version as u32, version)
}

const PERMUTATIONS: [[u64; 3]; 6] = [
    [1, 2, 3],
    [1, 3, 2],
    [2, 1, 3],
    [2, 3, 1],
    [3, 1, 2],
    [3, 2, 1],
];

speculate! {
    before {
        let mut store = PromptStore::new();
        let mut orchestrator = bound("s1");
    }

    describe "on_snapshot" {
        it "builds a point click request carrying every live prompt" {
            let requests = issue(&mut orchestrator, &mut store, 2);
            let body = &requests[1].body;

            assert_eq!(body.session_id, "s1");
            assert_eq!(body.interaction_type, POINT_CLICK);
            assert_eq!(body.version, 2);
            assert_eq!(body.points.len(), 2);
            assert_eq!(body.points[1].label, 1);
            assert_eq!(orchestrator.last_issued_version(), 2);
        }

        it "ignores snapshots that are not newer than the last issued" {
            let first = store.add_point(ImagePoint::new(1.0, 1.0), PromptLabel::Positive);
            assert!(orchestrator.on_snapshot(&first).is_some());
            assert!(orchestrator.on_snapshot(&first).is_none());
        }

        it "issues nothing without a session" {
            orchestrator.detach();
            let snapshot = store.add_point(ImagePoint::new(1.0, 1.0), PromptLabel::Positive);
            assert!(orchestrator.on_snapshot(&snapshot).is_none());
        }

        it "clears the display locally when no prompts remain" {
            let requests = issue(&mut orchestrator, &mut store, 1);
            orchestrator.on_response("s1", 1, refinement(&mask_for(1)));
            assert!(orchestrator.mask().is_some());

            let empty = store.undo_last().expect("one live prompt");
            assert!(orchestrator.on_snapshot(&empty).is_none());

            assert!(orchestrator.mask().is_none());
            assert!(orchestrator.stats().is_none());
            assert_eq!(orchestrator.last_applied_version(), 2);
            assert_eq!(requests.len(), 1);
        }
    }

    describe "on_response" {
        it "never moves the displayed version backwards in any arrival order" {
            for order in PERMUTATIONS {
                let mut store = PromptStore::new();
                let mut orchestrator = bound("s1");
                issue(&mut orchestrator, &mut store, 3);

                let mut shown = 0;
                for version in order {
                    orchestrator.on_response("s1", version, refinement(&mask_for(version)));
                    let applied = orchestrator.last_applied_version();
                    assert!(applied >= shown, "order {:?} went back to {}", order, applied);
                    shown = applied;
                }

                assert_eq!(shown, 3, "order {:?}", order);
                let mask = orchestrator.mask().expect("a mask is displayed");
                assert_eq!(mask.version(), 3);
                assert_eq!(mask, &mask_for(3));
            }
        }

        it "discards a stale response without touching the stats" {
            issue(&mut orchestrator, &mut store, 2);

            let applied = orchestrator.on_response("s1", 2, refinement(&rows_mask(SIZE, SIZE, 6, 2)));
            assert!(matches!(applied, RefinementOutcome::Applied { version: 2, .. }));
            let before = *orchestrator.stats().expect("stats after apply");

            let stale = orchestrator.on_response("s1", 1, refinement(&rows_mask(SIZE, SIZE, 2, 1)));
            assert!(matches!(
                stale,
                RefinementOutcome::StaleDiscarded { version: 1, last_applied: 2 }
            ));
            assert!(!stale.changed_display());
            assert_eq!(orchestrator.stats(), Some(&before));
            assert_eq!(before.area_fraction_percent, 30.0);
        }

        it "reapplies a response for the version already shown" {
            issue(&mut orchestrator, &mut store, 1);
            orchestrator.on_response("s1", 1, refinement(&mask_for(1)));
            let again = orchestrator.on_response("s1", 1, refinement(&mask_for(1)));
            assert!(matches!(again, RefinementOutcome::Applied { version: 1, .. }));
        }

        it "rejects responses from a replaced session" {
            issue(&mut orchestrator, &mut store, 1);
            orchestrator.reset(&session("s2"));
            let mut fresh = PromptStore::new();
            issue(&mut orchestrator, &mut fresh, 1);

            let outcome = orchestrator.on_response("s1", 1, refinement(&mask_for(1)));

            assert!(matches!(outcome, RefinementOutcome::SessionMismatch { version: 1 }));
            assert!(orchestrator.mask().is_none());
            assert_eq!(orchestrator.last_applied_version(), 0);
        }

        it "rejects completions from an earlier binding with the same session id" {
            let request = issue(&mut orchestrator, &mut store, 1).remove(0);
            let before = orchestrator.epoch();
            orchestrator.reset(&session("s1"));
            assert!(orchestrator.epoch() > before);

            let reply = RefinementReply::Response(refinement(&mask_for(1)));
            let outcome = orchestrator.on_completion(request.complete(reply));

            assert!(matches!(outcome, RefinementOutcome::SessionMismatch { version: 1 }));
            assert!(orchestrator.mask().is_none());
            assert_eq!(orchestrator.last_applied_version(), 0);
        }

        it "applies completions from the current binding" {
            let request = issue(&mut orchestrator, &mut store, 1).remove(0);
            assert_eq!(request.epoch, orchestrator.epoch());

            let reply = RefinementReply::Response(refinement(&mask_for(1)));
            let outcome = orchestrator.on_completion(request.complete(reply));

            assert!(matches!(outcome, RefinementOutcome::Applied { version: 1, .. }));
        }

        it "marks pending requests superseded when detached" {
            let request = issue(&mut orchestrator, &mut store, 1).remove(0);
            assert!(!request.is_superseded());

            orchestrator.detach();

            assert!(request.is_superseded());
        }

        it "surfaces a failure only for the latest issued version" {
            issue(&mut orchestrator, &mut store, 2);

            let old = orchestrator.on_response("s1", 1, Err(ClientError::Server("boom".into())));
            let latest = orchestrator.on_response("s1", 2, Err(ClientError::Server("boom".into())));

            assert!(matches!(old, RefinementOutcome::Failed { version: 1, surfaced: false, .. }));
            assert!(matches!(latest, RefinementOutcome::Failed { version: 2, surfaced: true, .. }));
            assert!(orchestrator.mask().is_none());
        }

        it "keeps the displayed mask when the latest request fails" {
            issue(&mut orchestrator, &mut store, 2);
            orchestrator.on_response("s1", 1, refinement(&mask_for(1)));
            orchestrator.on_response("s1", 2, Err(ClientError::Server("boom".into())));

            assert_eq!(orchestrator.mask().map(Mask::version), Some(1));
            assert_eq!(orchestrator.last_applied_version(), 1);
        }

        it "treats a mismatched echoed version as a failure" {
            issue(&mut orchestrator, &mut store, 2);
            let outcome = orchestrator.on_response("s1", 2, refinement(&mask_for(1)));
            assert!(matches!(outcome, RefinementOutcome::Failed { version: 2, surfaced: true, .. }));
        }

        it "accepts a response that does not echo the version" {
            issue(&mut orchestrator, &mut store, 1);
            let response = RefinementResponse {
                mask: MaskPayload::encode(&mask_for(1)),
                version: None,
                message: None,
            };
            let outcome = orchestrator.on_response("s1", 1, Ok(response));
            assert!(matches!(outcome, RefinementOutcome::Applied { version: 1, .. }));
        }

        it "rejects a mask that does not match the image size" {
            issue(&mut orchestrator, &mut store, 1);
            let wrong = rows_mask(SIZE / 2, SIZE, 3, 1);
            let outcome = orchestrator.on_response("s1", 1, refinement(&wrong));
            assert!(matches!(outcome, RefinementOutcome::Failed { surfaced: true, .. }));
            assert!(orchestrator.mask().is_none());
        }
    }
}

mod spawned {
    use super::*;
    use std::time::Duration;

    use matseg::config::Config;
    use matseg::workbench::Update;

    #[tokio::test]
    async fn debounced_requests_coalesce_into_the_latest() {
        let service = ScriptedService::new();
        let config = Config::default().with_debounce(Duration::from_millis(20));
        let mut workbench = workbench_with(&service, &config);
        workbench.upload_image("a.png", png(SIZE, SIZE)).await.unwrap();

        let release = service.gate_refinement(3);
        for i in 0..3 {
            workbench
                .add_point(ImagePoint::new(i as f64, 1.0), PromptLabel::Positive)
                .unwrap();
        }
        release.send(refinement(&mask_for(3))).unwrap();

        let mut outcomes = Vec::new();
        for _ in 0..3 {
            match workbench.next_update().await {
                Some(Update::Refinement { outcome, .. }) => outcomes.push(outcome),
                other => panic!("unexpected update {:?}", other),
            }
        }

        assert_eq!(service.refine_versions(), vec![3]);
        let superseded = outcomes
            .iter()
            .filter(|o| matches!(o, RefinementOutcome::Superseded { .. }))
            .count();
        assert_eq!(superseded, 2);
        assert_eq!(workbench.last_applied_version(), 3);
    }

    #[tokio::test]
    async fn debounced_request_is_dropped_by_a_new_upload() {
        let service = ScriptedService::new();
        let config = Config::default().with_debounce(Duration::from_millis(20));
        let mut workbench = workbench_with(&service, &config);
        workbench.upload_image("a.png", png(SIZE, SIZE)).await.unwrap();

        workbench
            .add_point(ImagePoint::new(1.0, 1.0), PromptLabel::Positive)
            .unwrap();
        workbench.upload_image("b.png", png(SIZE, SIZE)).await.unwrap();

        let Some(Update::Refinement { outcome, .. }) = workbench.next_update().await else {
            panic!("expected a refinement update");
        };
        assert!(matches!(outcome, RefinementOutcome::SessionMismatch { version: 1 }));
        assert!(service.refine_versions().is_empty());
    }

    #[tokio::test]
    async fn zero_debounce_sends_every_version() {
        let service = ScriptedService::new();
        let mut workbench = workbench(&service);
        workbench.upload_image("a.png", png(SIZE, SIZE)).await.unwrap();

        let gates: Vec<_> = (1..=2).map(|v| service.gate_refinement(v)).collect();
        for i in 0..2 {
            workbench
                .add_point(ImagePoint::new(i as f64, 1.0), PromptLabel::Positive)
                .unwrap();
        }
        for (gate, version) in gates.into_iter().zip(1..) {
            gate.send(refinement(&mask_for(version))).unwrap();
        }
        for _ in 0..2 {
            workbench.next_update().await.unwrap();
        }

        let mut versions = service.refine_versions();
        versions.sort_unstable();
        assert_eq!(versions, vec![1, 2]);
        assert_eq!(workbench.last_applied_version(), 2);
    }
}
