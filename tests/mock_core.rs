//! End-to-end behavior of the discovery cascade and the interaction
//! executor against an in-memory page handle.

mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use quiethand::config::{DelayDistribution, TimingConfig};
use quiethand::page::MouseEventKind;
use quiethand::{
    Action, ActionOutcome, DiscoveryError, ExecutionError, ExtractedValue, ExtractionSpec,
    FieldSpec, LocatorSpec, QuiethandConfig, SemanticRole, Session, SessionError, Strategy,
};

use common::{el, MockPage};

fn fast_config() -> QuiethandConfig {
    let mut config = QuiethandConfig::default();
    let quick = DelayDistribution::new(2.0, 1.0, 1, 5);
    config.timing = TimingConfig {
        pre_click: quick.clone(),
        post_click: quick.clone(),
        pre_type: quick.clone(),
        scroll_pause: quick.clone(),
        thinking_pause: quick,
    };
    config.motion.min_duration_ms = 30;
    config.motion.max_duration_ms = 60;
    config.typing.base_delay_ms = 2.0;
    config.typing.min_char_delay_ms = 1;
    config.typing.max_char_delay_ms = 5;
    config.typing.think_pause_probability = 0.0;
    config.retry_pause_ms = 20;
    config
}

fn session(page: &Arc<MockPage>) -> Session {
    let handle: Arc<dyn quiethand::PageHandle> = page.clone();
    Session::new(handle, fast_config()).seed_entropy(7)
}

#[tokio::test]
async fn direct_selector_resolves_with_full_confidence() -> Result<()> {
    let page = Arc::new(MockPage::new(vec![el("q1", "input").attr("id", "q")]));
    let session = session(&page);

    let resolved = session.resolve(&LocatorSpec::selector("#q")).await?;
    assert_eq!(resolved.strategy, Strategy::Direct);
    assert_eq!(resolved.confidence, 1.0);
    assert!(resolved.provenance.as_deref().unwrap_or("").contains("#q"));
    Ok(())
}

#[tokio::test]
async fn empty_spec_fails_without_touching_the_page() {
    let page = Arc::new(MockPage::new(vec![el("q1", "input").attr("id", "q")]));
    let session = session(&page);

    let err = session
        .resolve(&LocatorSpec::default())
        .await
        .expect_err("empty spec must be rejected");
    assert!(matches!(err, DiscoveryError::Configuration(_)));
    assert!(!page.page_touched(), "page must not be queried");
}

#[tokio::test]
async fn cascade_tries_smart_attribute_before_content_match() -> Result<()> {
    // No direct match and no useful attributes, so the content strategy is
    // the first to qualify; the heuristic rung must never run.
    let page = Arc::new(MockPage::new(vec![el("d1", "div").text("Submit now")]));
    let session = session(&page);

    let spec = LocatorSpec::selector("#nope")
        .with_role(SemanticRole::Button)
        .with_text_hint("submit");
    let resolved = session.resolve(&spec).await?;

    assert_eq!(resolved.strategy, Strategy::ContentMatch);
    assert_eq!(page.query_calls(), 1, "one direct selector probe");
    assert_eq!(
        page.snapshot_calls(),
        2,
        "smart-attribute and content each scan once; heuristic never runs"
    );
    Ok(())
}

#[tokio::test]
async fn testid_div_resolves_without_heuristic() -> Result<()> {
    // <div class="btn" data-testid="submit-btn">Submit</div>, no <button>.
    let page = Arc::new(MockPage::new(vec![el("b1", "div")
        .attr("class", "btn")
        .attr("data-testid", "submit-btn")
        .text("Submit")]));
    let session = session(&page);

    let spec = LocatorSpec::default()
        .with_role(SemanticRole::Button)
        .with_text_hint("submit");
    let resolved = session.resolve(&spec).await?;

    assert_ne!(resolved.strategy, Strategy::HeuristicRole);
    assert!(resolved.confidence >= 0.5);
    Ok(())
}

#[tokio::test]
async fn heuristic_rung_accepts_plausible_button() -> Result<()> {
    let page = Arc::new(MockPage::new(vec![
        el("p1", "div").text("side panel"),
        el("go", "button").text("Go"),
    ]));
    let session = session(&page);

    let resolved = session
        .resolve(&LocatorSpec::for_role(SemanticRole::Button))
        .await?;
    assert_eq!(resolved.strategy, Strategy::HeuristicRole);
    assert!(resolved.confidence >= 0.6);
    assert_eq!(resolved.id.as_str(), "go");
    Ok(())
}

#[tokio::test]
async fn not_found_reports_only_strategies_with_a_basis() {
    let page = Arc::new(MockPage::new(vec![el("d1", "div").text("unrelated")]));
    let session = session(&page);

    let err = session
        .resolve(&LocatorSpec::selector("#missing"))
        .await
        .expect_err("selector matches nothing");
    match err {
        DiscoveryError::ElementNotFound { attempts } => {
            assert_eq!(attempts.len(), 1);
            assert_eq!(attempts[0].strategy, Strategy::Direct);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn repeated_resolution_is_idempotent() -> Result<()> {
    let page = Arc::new(MockPage::new(vec![el("b1", "div")
        .attr("data-testid", "submit-btn")
        .text("Submit")]));
    let session = session(&page);

    let spec = LocatorSpec::default()
        .with_role(SemanticRole::Button)
        .with_text_hint("submit");
    let first = session.resolve(&spec).await?;
    let second = session.resolve(&spec).await?;

    assert_eq!(first.strategy, second.strategy);
    assert!(second.confidence >= first.confidence);
    assert_eq!(first.id, second.id);
    Ok(())
}

#[tokio::test]
async fn typing_dispatches_five_verified_keystrokes() -> Result<()> {
    let page = Arc::new(MockPage::new(vec![el("q1", "input").attr("id", "q")]));
    let session = session(&page);

    let resolved = session
        .resolve(&LocatorSpec::selector("#q").with_role(SemanticRole::TextInput))
        .await?;
    assert_eq!(resolved.strategy, Strategy::Direct);
    assert_eq!(resolved.confidence, 1.0);

    let outcome = session
        .perform(
            &resolved,
            Action::Type {
                text: "hello".to_string(),
            },
        )
        .await
        .map_err(|err| anyhow!("type failed: {err}"))?;

    match outcome {
        ActionOutcome::Completed(report) => assert_eq!(report.steps, 5),
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(page.typed_key_downs(), 5);
    assert_eq!(page.value_of("q1").as_deref(), Some("hello"));
    Ok(())
}

#[tokio::test]
async fn dropped_keystroke_triggers_one_clear_and_retry() -> Result<()> {
    let page = Arc::new(MockPage::new(vec![el("q1", "input").attr("id", "q")]));
    page.drop_keystroke(3);
    let session = session(&page);

    let resolved = session.resolve(&LocatorSpec::selector("#q")).await?;
    let outcome = session
        .perform(
            &resolved,
            Action::Type {
                text: "hello".to_string(),
            },
        )
        .await
        .map_err(|err| anyhow!("type failed: {err}"))?;

    assert!(matches!(outcome, ActionOutcome::Completed(_)));
    assert_eq!(page.value_of("q1").as_deref(), Some("hello"));
    Ok(())
}

#[tokio::test]
async fn persistent_input_loss_fails_verification() -> Result<()> {
    let page = Arc::new(MockPage::new(vec![el("q1", "input").attr("id", "q")]));
    for nth in 1..=40 {
        page.drop_keystroke(nth);
    }
    let session = session(&page);

    let resolved = session.resolve(&LocatorSpec::selector("#q")).await?;
    let err = session
        .perform(
            &resolved,
            Action::Type {
                text: "hi".to_string(),
            },
        )
        .await
        .expect_err("input never sticks");
    assert!(matches!(
        err,
        SessionError::Execution(ExecutionError::InputVerificationFailed { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn cancellation_halts_before_the_click_lands() -> Result<()> {
    let page = Arc::new(MockPage::new(vec![
        el("q1", "input").attr("id", "q").at(900.0, 600.0, 120.0, 30.0)
    ]));
    let session = session(&page);

    let resolved = session.resolve(&LocatorSpec::selector("#q")).await?;
    let token = session.cancellation();

    let (outcome, _) = tokio::join!(session.perform(&resolved, Action::Click), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
    });

    let outcome = outcome.map_err(|err| anyhow!("click errored: {err}"))?;
    assert!(matches!(outcome, ActionOutcome::Cancelled));
    assert_eq!(page.pressed_count(), 0, "no click after cancellation");
    Ok(())
}

#[tokio::test]
async fn click_travels_a_path_then_presses_once() -> Result<()> {
    let page = Arc::new(MockPage::new(vec![
        el("q1", "input").attr("id", "q").at(600.0, 400.0, 120.0, 30.0)
    ]));
    let session = session(&page);

    let resolved = session.resolve(&LocatorSpec::selector("#q")).await?;
    let outcome = session
        .perform(&resolved, Action::Click)
        .await
        .map_err(|err| anyhow!("click failed: {err}"))?;
    assert!(matches!(outcome, ActionOutcome::Completed(_)));

    let events = page.mouse_events();
    let moves = events
        .iter()
        .filter(|e| e.kind == MouseEventKind::Moved)
        .count();
    assert!(moves >= 8, "expected a multi-waypoint approach, got {moves}");
    assert_eq!(page.pressed_count(), 1);

    // The click lands inside the box, not at its exact center.
    let press = events
        .iter()
        .find(|e| e.kind == MouseEventKind::Pressed)
        .expect("press recorded");
    assert!(press.x > 600.0 && press.x < 720.0);
    assert!(press.y > 400.0 && press.y < 430.0);
    assert_ne!((press.x, press.y), (660.0, 415.0));
    Ok(())
}

#[tokio::test]
async fn disabled_element_is_not_interactable() -> Result<()> {
    let page = Arc::new(MockPage::new(vec![el("q1", "input").attr("id", "q")]));
    let session = session(&page);
    let resolved = session.resolve(&LocatorSpec::selector("#q")).await?;

    page.set_enabled("q1", false);
    let err = session
        .perform(&resolved, Action::Click)
        .await
        .expect_err("disabled element must not be clickable");
    assert!(matches!(
        err,
        SessionError::Execution(ExecutionError::NotInteractable(_))
    ));
    Ok(())
}

#[tokio::test]
async fn stale_handle_is_re_resolved_once() -> Result<()> {
    let page = Arc::new(MockPage::new(vec![el("q1", "input").attr("id", "q")]));
    let session = session(&page);
    let resolved = session.resolve(&LocatorSpec::selector("#q")).await?;

    // The DOM mutates underneath the handle; a fresh node now matches.
    page.detach("q1");
    page.add(el("q2", "input").attr("id", "q"));

    let outcome = session
        .perform(&resolved, Action::Click)
        .await
        .map_err(|err| anyhow!("click after staleness failed: {err}"))?;
    assert!(matches!(outcome, ActionOutcome::Completed(_)));
    assert_eq!(page.pressed_count(), 1);
    Ok(())
}

#[tokio::test]
async fn failed_re_resolution_escalates() -> Result<()> {
    let page = Arc::new(MockPage::new(vec![el("q1", "input").attr("id", "q")]));
    let session = session(&page);
    let resolved = session.resolve(&LocatorSpec::selector("#q")).await?;

    page.detach("q1");
    let err = session
        .perform(&resolved, Action::Click)
        .await
        .expect_err("nothing to re-resolve to");
    assert!(matches!(
        err,
        SessionError::Discovery(DiscoveryError::ElementNotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn resolve_with_retry_finds_late_elements() -> Result<()> {
    let page = Arc::new(MockPage::new(Vec::new()));
    let session = session(&page);

    let late_page = Arc::clone(&page);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        late_page.add(el("q1", "input").attr("id", "q"));
    });

    let resolved = session
        .resolve_with_retry(&LocatorSpec::selector("#q"), Some(5))
        .await?;
    assert_eq!(resolved.strategy, Strategy::Direct);
    Ok(())
}

#[tokio::test]
async fn retry_never_repeats_configuration_errors() {
    let page = Arc::new(MockPage::new(Vec::new()));
    let session = session(&page);

    let err = session
        .resolve_with_retry(&LocatorSpec::default(), Some(3))
        .await
        .expect_err("empty spec is fatal");
    assert!(matches!(err, DiscoveryError::Configuration(_)));
    assert!(!page.page_touched());
}

#[tokio::test]
async fn cached_resolution_survives_until_navigation() -> Result<()> {
    let page = Arc::new(MockPage::new(vec![el("q1", "input").attr("id", "q")]));
    let session = session(&page);
    let spec = LocatorSpec::selector("#q");

    session.resolve_cached(&spec).await?;
    let after_first = page.query_calls();

    session.resolve_cached(&spec).await?;
    assert_eq!(page.query_calls(), after_first, "second hit comes from cache");

    session.note_navigation().await;
    session.resolve_cached(&spec).await?;
    assert!(page.query_calls() > after_first, "navigation invalidates");
    Ok(())
}

#[tokio::test]
async fn scrolling_moves_in_small_increments() -> Result<()> {
    let page = Arc::new(MockPage::new(vec![el("q1", "input").attr("id", "q")]));
    let session = session(&page);
    let resolved = session.resolve(&LocatorSpec::selector("#q")).await?;

    let outcome = session
        .perform(
            &resolved,
            Action::Scroll {
                delta_x: 0.0,
                delta_y: 500.0,
            },
        )
        .await
        .map_err(|err| anyhow!("scroll failed: {err}"))?;
    assert!(matches!(outcome, ActionOutcome::Completed(_)));

    let wheels = page.wheel_events();
    assert_eq!(wheels.len(), 5, "500px at 120px per step");
    for event in &wheels {
        if let MouseEventKind::Wheel { delta_y, .. } = event.kind {
            assert!(delta_y.abs() <= 120.0);
        }
    }
    Ok(())
}

#[tokio::test]
async fn read_action_extracts_text_with_provenance() -> Result<()> {
    let page = Arc::new(MockPage::new(vec![
        el("h1", "h1").attr("id", "title").text("Quiet pages")
    ]));
    let session = session(&page);
    let resolved = session.resolve(&LocatorSpec::selector("#title")).await?;

    let outcome = session
        .perform(&resolved, Action::Read(ExtractionSpec::Text))
        .await
        .map_err(|err| anyhow!("read failed: {err}"))?;
    match outcome {
        ActionOutcome::Extracted(result) => {
            assert_eq!(result.value, ExtractedValue::Text("Quiet pages".into()));
            assert_eq!(result.strategy, Strategy::Direct);
            assert_eq!(result.confidence, 1.0);
        }
        other => panic!("expected extraction, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn item_extraction_applies_fallbacks_and_required_fields() -> Result<()> {
    let page = Arc::new(MockPage::new(vec![
        el("results", "div").attr("id", "results"),
        el("r1", "div").attr("class", "result").parent("results"),
        el("r1-t", "h3").parent("r1").text("First hit"),
        el("r1-a", "a").attr("href", "/one").parent("r1"),
        el("r2", "div").attr("class", "result").parent("results"),
        el("r2-t", "h3").parent("r2").text("Second hit"),
        el("r2-a", "a").attr("href", "/two").parent("r2"),
        // Third container has no title, so the required field drops it.
        el("r3", "div").attr("class", "result").parent("results"),
        el("r3-a", "a").attr("href", "/three").parent("r3"),
    ]));
    let session = session(&page);
    let resolved = session.resolve(&LocatorSpec::selector("#results")).await?;

    let spec = ExtractionSpec::Items {
        container_selectors: vec![".hit".into(), ".result".into()],
        fields: vec![
            FieldSpec::text("title", vec!["h2".into(), "h3".into()]).required(),
            FieldSpec::attribute("url", vec!["a".into()], "href"),
        ],
        max_items: None,
    };
    let result = session.extract(&resolved, &spec).await
        .map_err(|err| anyhow!("extract failed: {err}"))?;

    match &result.value {
        ExtractedValue::Items(items) => {
            assert_eq!(items.len(), 2);
            assert_eq!(items[0]["title"], serde_json::json!("First hit"));
            assert_eq!(items[0]["url"], serde_json::json!("/one"));
            assert_eq!(items[1]["title"], serde_json::json!("Second hit"));
        }
        other => panic!("expected items, got {other:?}"),
    }
    assert_eq!(result.metadata["containerSelector"], serde_json::json!(".result"));
    assert_eq!(result.metadata["itemCount"], serde_json::json!(2));
    Ok(())
}

#[tokio::test]
async fn empty_extraction_is_valid_and_keeps_confidence() -> Result<()> {
    let page = Arc::new(MockPage::new(vec![
        el("results", "div").attr("id", "results"),
    ]));
    let session = session(&page);
    let resolved = session.resolve(&LocatorSpec::selector("#results")).await?;

    let spec = ExtractionSpec::Items {
        container_selectors: vec!["li".into()],
        fields: vec![FieldSpec::text("title", vec!["h3".into()])],
        max_items: None,
    };
    let result = session.extract(&resolved, &spec).await
        .map_err(|err| anyhow!("extract failed: {err}"))?;

    assert!(result.value.is_empty());
    assert_eq!(result.confidence, 1.0, "confidence present even when empty");
    Ok(())
}
