use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use sitequote_core::{
    AppConfig, EstimationService, ExtractionUnavailable, FieldExtractor, FieldValue, ImageRef,
    Node, TurnInput,
};

/// Scripted collaborator: each message spells out what extraction would have
/// found, as `field=value` pairs. Keeps multi-turn tests deterministic.
struct PairExtractor;

#[async_trait]
impl FieldExtractor for PairExtractor {
    async fn extract(
        &self,
        text: &str,
        recognized: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, FieldValue>, ExtractionUnavailable> {
        let mut fields = BTreeMap::new();
        for pair in text.split(';') {
            let Some((field, value)) = pair.split_once('=') else { continue };
            let field = field.trim().to_string();
            if !recognized.contains(&field) {
                continue;
            }
            let value = value.trim();
            let value = match value.parse::<f64>() {
                Ok(number) => FieldValue::Number(number),
                Err(_) => FieldValue::Text(value.to_string()),
            };
            fields.insert(field, value);
        }
        Ok(fields)
    }
}

/// Never resolves; used to drive the turn down the timeout path.
struct StalledExtractor;

#[async_trait]
impl FieldExtractor for StalledExtractor {
    async fn extract(
        &self,
        _text: &str,
        _recognized: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, FieldValue>, ExtractionUnavailable> {
        std::future::pending().await
    }
}

fn service() -> EstimationService<PairExtractor> {
    EstimationService::new(Arc::new(AppConfig::default()), PairExtractor)
}

fn assert_single_pass(trace: &[Node]) {
    assert!(trace.len() <= 5, "trace too long: {trace:?}");
    assert!(!trace.contains(&Node::InputRouter), "router revisited: {trace:?}");
    assert!(!trace.contains(&Node::Start), "start revisited: {trace:?}");
}

#[tokio::test]
async fn guided_conversation_reaches_an_estimate() {
    let service = service();
    let (session_id, greeting) = service.create_session().await.expect("session created");
    assert!(greeting.contains("type of service"));

    let turns = [
        ("service_type=roofing", "square footage"),
        ("square_footage=2000", "region"),
        ("location=west", "material"),
        ("material_type=tile", "timeline"),
    ];
    for (message, expected_followup) in turns {
        let (outcome, state) = service
            .process_turn(&session_id, TurnInput::Text(message.to_string()))
            .await
            .expect("turn succeeds");
        assert_single_pass(&outcome.trace);
        assert!(
            outcome.response.to_lowercase().contains(expected_followup),
            "after `{message}` expected a question about {expected_followup}, got: {}",
            outcome.response
        );
        assert!(state.final_estimate.is_none());
    }

    let (outcome, state) = service
        .process_turn(&session_id, TurnInput::Text("timeline=standard".to_string()))
        .await
        .expect("final turn succeeds");

    assert_single_pass(&outcome.trace);
    assert!(outcome.trace.contains(&Node::Estimator));
    let estimate = state.final_estimate.clone().expect("estimate present");
    assert_eq!(estimate.total, rust_decimal::Decimal::from(15250));
    assert!(outcome.response.contains("$15,250.00"));
    assert!(outcome.response.contains("$13,725.00"));
    assert!(outcome.response.contains("$16,775.00"));
    assert!(service.missing_fields(&state).is_empty());
}

#[tokio::test]
async fn missing_only_timeline_asks_about_timeline() {
    let service = service();
    let (session_id, _) = service.create_session().await.expect("session created");

    let (outcome, state) = service
        .process_turn(
            &session_id,
            TurnInput::Text(
                "service_type=roofing; square_footage=1500; location=south; material_type=metal"
                    .to_string(),
            ),
        )
        .await
        .expect("turn succeeds");

    assert_eq!(*outcome.trace.last().expect("non-empty trace"), Node::QuestionGenerator);
    assert_eq!(state.pending_question_field.as_deref(), Some("timeline"));
    assert!(outcome.response.to_lowercase().contains("timeline"));
    // Must not re-ask anything already captured.
    assert!(!outcome.response.to_lowercase().contains("square footage"));
}

#[tokio::test]
async fn cached_estimate_is_rerendered_not_recomputed() {
    let service = service();
    let (session_id, _) = service.create_session().await.expect("session created");

    let (first, state_after_estimate) = service
        .process_turn(
            &session_id,
            TurnInput::Text(
                "service_type=roofing; square_footage=2000; location=west; \
                 material_type=tile; timeline=standard"
                    .to_string(),
            ),
        )
        .await
        .expect("estimate turn");
    assert!(first.trace.contains(&Node::Estimator));
    let original = state_after_estimate.final_estimate.clone().expect("estimate present");

    let (second, state_after_followup) = service
        .process_turn(&session_id, TurnInput::Text("sounds good, thanks!".to_string()))
        .await
        .expect("follow-up turn");

    assert!(!second.trace.contains(&Node::Estimator), "estimator ran twice: {:?}", second.trace);
    assert_eq!(
        second.trace,
        vec![Node::InformationExtractor, Node::StateUpdater, Node::ResponseGenerator]
    );
    assert_eq!(state_after_followup.final_estimate, Some(original));
    assert!(second.response.contains("$15,250.00"));
}

#[tokio::test]
async fn reset_message_clears_completion_but_keeps_the_transcript() {
    let service = service();
    let (session_id, _) = service.create_session().await.expect("session created");

    let (_, with_estimate) = service
        .process_turn(
            &session_id,
            TurnInput::Text(
                "service_type=roofing; square_footage=2000; location=west; \
                 material_type=tile; timeline=standard"
                    .to_string(),
            ),
        )
        .await
        .expect("estimate turn");
    assert!(with_estimate.final_estimate.is_some());

    let (outcome, after_reset) = service
        .process_turn(&session_id, TurnInput::Text("let's start over".to_string()))
        .await
        .expect("reset turn");

    assert_eq!(after_reset.session_id, session_id);
    assert!(after_reset.final_estimate.is_none());
    assert!(after_reset.extracted_fields.is_empty());
    assert!(after_reset.service_type.is_none());
    // Transcript grew (user message + response), never shrank.
    assert!(after_reset.history.len() > with_estimate.history.len());
    assert_eq!(after_reset.pending_question_field.as_deref(), Some("service_type"));
    assert!(outcome.response.contains("type of service"));
}

#[tokio::test]
async fn image_with_caption_feeds_extraction_and_is_attached_to_the_estimate() {
    let service = service();
    let (session_id, _) = service.create_session().await.expect("session created");

    let (outcome, state) = service
        .process_turn(
            &session_id,
            TurnInput::Image {
                reference: ImageRef("roof-photo-1".to_string()),
                caption: Some("service_type=roofing; square_footage=2000".to_string()),
            },
        )
        .await
        .expect("image turn");

    assert_single_pass(&outcome.trace);
    assert_eq!(
        outcome.trace,
        vec![
            Node::ImageHandler,
            Node::InformationExtractor,
            Node::StateUpdater,
            Node::QuestionGenerator
        ]
    );
    assert_eq!(state.image_refs, vec![ImageRef("roof-photo-1".to_string())]);
    assert_eq!(state.service_type.as_deref(), Some("roofing"));

    let (_, state) = service
        .process_turn(
            &session_id,
            TurnInput::Text("location=west; material_type=tile; timeline=standard".to_string()),
        )
        .await
        .expect("completion turn");

    let estimate = state.final_estimate.expect("estimate present");
    assert_eq!(estimate.image_refs.len(), 1);
}

#[tokio::test]
async fn stalled_extraction_times_out_and_the_turn_still_answers() {
    let mut config = AppConfig::default();
    config.workflow.extraction_timeout_secs = 1;
    let service = EstimationService::new(Arc::new(config), StalledExtractor);
    let (session_id, _) = service.create_session().await.expect("session created");

    let started = std::time::Instant::now();
    let (outcome, state) = service
        .process_turn(&session_id, TurnInput::Text("I want a roof quote".to_string()))
        .await
        .expect("turn survives the timeout");

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(state.extracted_fields.is_empty());
    assert!(outcome.response.contains("type of service"));
}

#[tokio::test]
async fn independent_sessions_run_concurrently() {
    let service = Arc::new(service());
    let (first, _) = service.create_session().await.expect("first session");
    let (second, _) = service.create_session().await.expect("second session");

    let (a, b) = tokio::join!(
        service.process_turn(&first, TurnInput::Text("service_type=roofing".to_string())),
        service.process_turn(&second, TurnInput::Text("square_footage=800".to_string())),
    );
    let (_, state_a) = a.expect("first session turn");
    let (_, state_b) = b.expect("second session turn");

    assert_eq!(state_a.service_type.as_deref(), Some("roofing"));
    assert!(state_b.service_type.is_none());
    assert!(state_b.extracted_fields.contains_key("square_footage"));
}

#[tokio::test]
async fn interleaved_turns_on_one_session_never_lose_history() {
    let service = Arc::new(service());
    let (session_id, _) = service.create_session().await.expect("session created");
    let base_len = service.conversation(&session_id).expect("state").history.len();

    let mut handles = Vec::new();
    for turn in 0..4u32 {
        let service = Arc::clone(&service);
        let session_id = session_id.clone();
        handles.push(tokio::spawn(async move {
            service
                .process_turn(&session_id, TurnInput::Text(format!("message {turn}")))
                .await
        }));
    }
    for handle in handles {
        handle.await.expect("task completes").expect("turn succeeds");
    }

    let state = service.conversation(&session_id).expect("state");
    // Each turn appends exactly one user and one assistant entry.
    assert_eq!(state.history.len(), base_len + 8);
}

#[tokio::test]
async fn conversation_state_round_trips_through_snapshots() {
    let service = service();
    let (session_id, _) = service.create_session().await.expect("session created");

    let (_, state) = service
        .process_turn(
            &session_id,
            TurnInput::Text(
                "service_type=roofing; square_footage=2000; location=west; \
                 material_type=tile; timeline=standard"
                    .to_string(),
            ),
        )
        .await
        .expect("estimate turn");

    let encoded = serde_json::to_string(&state).expect("state serializes");
    let decoded: sitequote_core::ConversationState =
        serde_json::from_str(&encoded).expect("state parses");
    assert_eq!(state, decoded);
}
