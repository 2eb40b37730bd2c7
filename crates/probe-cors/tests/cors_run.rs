//! End-to-end CORS runs driven by the scripted engine.
//!
//! Server-backed scenarios bind the fixed test port and are serialized.

use async_trait::async_trait;
use probe_cors::{
    BrowserEngine, CorsError, CorsTestConfig, CorsTestHandler, EngineClient, ErrorCode,
    FAILURE_MSG, HandlerType, Mismatch, Resource, SUCCESS_MSG, Scenario, ScriptedEngine, Step,
    TestSetup, run_scenario,
};
use probe_server::logging::init_test_logging;
use probe_server::{ServerConfig, ServerContext};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

fn scenario(name: &str) -> Scenario {
    Scenario::by_name(name).unwrap_or_else(|| panic!("unknown scenario {name}"))
}

fn context() -> ServerContext {
    init_test_logging();
    ServerContext::new(ServerConfig::default())
}

fn short_timeout() -> CorsTestConfig {
    CorsTestConfig::default().with_timeout(Duration::from_millis(300))
}

#[tokio::test]
#[serial]
async fn test_xhr_with_header_server_to_server_passes() {
    let scenario = scenario("CorsTest.XhrWithHeaderServerToServer");
    let setup = scenario.build();
    let main_url = setup.resource(0).path_url();
    let sub_url = setup.resource(1).path_url();

    let engine = ScriptedEngine::new(vec![
        Step::request(&sub_url, None),
        Step::query(&main_url, SUCCESS_MSG),
    ]);
    let context = context();

    let outcome = run_scenario(scenario, &context, &engine, &CorsTestConfig::default())
        .await
        .unwrap();

    outcome.assert_passed();
    assert_eq!(outcome.setup().resource(0).response_ct, 1);
    assert_eq!(outcome.setup().resource(1).response_ct, 1);
    assert_eq!(outcome.setup().resource(0).success_query_ct, 1);

    context.teardown().await.unwrap();
}

#[tokio::test]
async fn test_blocked_xhr_across_schemes_passes() {
    let scenario = scenario("CorsTest.XhrNoHeaderHttpSchemeToCustomStandardScheme");
    let setup = scenario.build();
    let main_url = setup.resource(0).path_url();
    let sub_url = setup.resource(1).path_url();
    let blocked = setup.console_messages()[0].clone();

    let engine = ScriptedEngine::new(vec![
        Step::request(&sub_url, Some(HandlerType::HttpScheme.origin())),
        Step::console(blocked),
        Step::query(&main_url, FAILURE_MSG),
    ]);
    let context = context();

    let outcome = run_scenario(scenario, &context, &engine, &CorsTestConfig::default())
        .await
        .unwrap();

    outcome.assert_passed();
    assert!(outcome.setup().console_messages().is_empty());
    assert_eq!(outcome.setup().resource(0).failure_query_ct, 1);

    context.teardown().await.unwrap();
}

#[tokio::test]
async fn test_missing_console_message_fails() {
    let scenario = scenario("CorsTest.XhrNoHeaderHttpSchemeToCustomStandardScheme");
    let setup = scenario.build();
    let main_url = setup.resource(0).path_url();
    let sub_url = setup.resource(1).path_url();
    let blocked = setup.console_messages()[0].clone();

    let engine = ScriptedEngine::new(vec![
        Step::request(&sub_url, Some(HandlerType::HttpScheme.origin())),
        Step::query(&main_url, FAILURE_MSG),
    ]);
    let context = context();

    let outcome = run_scenario(scenario, &context, &engine, &CorsTestConfig::default())
        .await
        .unwrap();

    assert!(!outcome.passed());
    assert_eq!(outcome.failures(), [Mismatch::MissingConsoleMessage(blocked)]);

    context.teardown().await.unwrap();
}

#[tokio::test]
async fn test_unexpected_console_message_and_origin_are_reported() {
    let scenario = scenario("CorsTest.FetchWithHeaderHttpSchemeToCustomStandardScheme");
    let setup = scenario.build();
    let main_url = setup.resource(0).path_url();
    let sub_url = setup.resource(1).path_url();

    let engine = ScriptedEngine::new(vec![
        Step::request(&sub_url, None),
        Step::console("Uncaught ReferenceError: nope"),
        Step::query(&main_url, SUCCESS_MSG),
    ]);
    let context = context();

    let outcome = run_scenario(scenario, &context, &engine, &CorsTestConfig::default())
        .await
        .unwrap();

    assert_eq!(
        outcome.failures(),
        [
            Mismatch::OriginHeader {
                url: sub_url,
                expected: "http://corstest.com".to_string(),
                actual: String::new(),
            },
            Mismatch::UnexpectedConsoleMessage("Uncaught ReferenceError: nope".to_string()),
        ]
    );

    context.teardown().await.unwrap();
}

#[tokio::test]
async fn test_iframe_without_scripts_loads_both_frames() {
    let scenario = scenario("CorsTest.IframeNoneHttpSchemeToCustomStandardScheme");
    let setup = scenario.build();
    let iframe_url = setup.resource(1).path_url();
    let blocked = setup.console_messages()[0].clone();

    let engine = ScriptedEngine::new(vec![Step::console(blocked), Step::navigate(&iframe_url)]);
    let context = context();

    let outcome = run_scenario(scenario, &context, &engine, &CorsTestConfig::default())
        .await
        .unwrap();

    outcome.assert_passed();
    assert_eq!(outcome.setup().resource(1).response_ct, 1);

    context.teardown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_frame_query_is_reported() {
    let mut setup = TestSetup::new();
    setup.add_resource(Resource::new(HandlerType::CustomStandardScheme, "/main.html"));

    let engine = ScriptedEngine::new(vec![Step::query(
        "customstdfetch://corstest/elsewhere.html",
        SUCCESS_MSG,
    )]);
    let context = context();

    let handler = CorsTestHandler::new(setup, context.clone());
    let outcome = handler.execute(&engine, &short_timeout()).await.unwrap();

    // The main page alone satisfies the setup, so the run may finish before
    // the stray query arrives.
    assert!(outcome.failures().iter().all(|failure| matches!(
        failure,
        Mismatch::UnknownUrl(url) if url == "customstdfetch://corstest/elsewhere.html"
    )));

    context.teardown().await.unwrap();
}

#[tokio::test]
async fn test_unfinished_run_times_out() {
    let scenario = scenario("CorsTest.BasicHttpSchemeWithQuery");
    let url = scenario.build().main_url();
    let engine = ScriptedEngine::default();
    let context = context();

    let outcome = run_scenario(scenario, &context, &engine, &short_timeout())
        .await
        .unwrap();

    assert_eq!(
        outcome.failures(),
        [
            Mismatch::Timeout(Duration::from_millis(300)),
            Mismatch::SuccessQueryCount {
                url,
                expected: 1,
                actual: 0,
            },
        ]
    );

    context.teardown().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_timeout_stops_the_test_server() {
    let scenario = scenario("CorsTest.BasicServerWithQuery");
    let engine = ScriptedEngine::default();
    let context = context();

    let outcome = run_scenario(scenario, &context, &engine, &short_timeout())
        .await
        .unwrap();

    assert!(matches!(outcome.failures()[0], Mismatch::Timeout(_)));
    assert_eq!(outcome.setup().resource(0).response_ct, 1);
    assert_eq!(outcome.setup().resource(0).success_query_ct, 0);

    context.teardown().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_non_200_main_status_is_verified() {
    let mut setup = TestSetup::new();
    let mut main = Resource::new(HandlerType::Server, "/CorsTest.WrongStatus");
    main.response.status = 404;
    setup.add_resource(main);

    let engine = ScriptedEngine::default();
    let context = context();

    let handler = CorsTestHandler::new(setup, context.clone());
    let outcome = handler
        .execute(&engine, &CorsTestConfig::default())
        .await
        .unwrap();

    // The server answers with the configured status, so nothing is off.
    outcome.assert_passed();
    assert!(handler.failures().is_empty());

    context.teardown().await.unwrap();
}

#[tokio::test]
async fn test_aborted_load_is_tolerated() {
    let scenario = scenario("CorsTest.BasicHttpSchemeWithQuery");
    let main_url = scenario.build().main_url();

    let engine = ScriptedEngine::new(vec![
        Step::load_error(&main_url, ErrorCode::Aborted),
        Step::query(&main_url, SUCCESS_MSG),
    ]);
    let context = context();

    let outcome = run_scenario(scenario, &context, &engine, &CorsTestConfig::default())
        .await
        .unwrap();

    outcome.assert_passed();
    context.teardown().await.unwrap();
}

#[tokio::test]
async fn test_unexpected_load_error_is_reported() {
    let scenario = scenario("CorsTest.BasicHttpSchemeWithQuery");
    let main_url = scenario.build().main_url();

    let engine = ScriptedEngine::new(vec![
        Step::load_error(&main_url, ErrorCode::BlockedByResponse),
        Step::query(&main_url, SUCCESS_MSG),
    ]);
    let context = context();

    let outcome = run_scenario(scenario, &context, &engine, &CorsTestConfig::default())
        .await
        .unwrap();

    assert_eq!(
        outcome.failures(),
        [Mismatch::LoadError {
            url: main_url,
            expected: ErrorCode::None,
            actual: ErrorCode::BlockedByResponse,
        }]
    );
    context.teardown().await.unwrap();
}

#[tokio::test]
async fn test_wrong_main_status_is_reported() {
    let scenario = scenario("CorsTest.BasicHttpSchemeWithQuery");
    let main_url = scenario.build().main_url();

    let engine = ScriptedEngine::new(vec![
        Step::load_end(&main_url, 500),
        Step::query(&main_url, SUCCESS_MSG),
    ]);
    let context = context();

    let outcome = run_scenario(scenario, &context, &engine, &CorsTestConfig::default())
        .await
        .unwrap();

    assert_eq!(
        outcome.failures(),
        [Mismatch::Status {
            url: main_url,
            expected: 200,
            actual: 500,
        }]
    );
    context.teardown().await.unwrap();
}

#[tokio::test]
async fn test_sub_resource_success_status_is_not_verified() {
    let scenario = scenario("CorsTest.FetchWithHeaderHttpSchemeToCustomStandardScheme");
    let setup = scenario.build();
    let main_url = setup.resource(0).path_url();
    let sub_url = setup.resource(1).path_url();

    let engine = ScriptedEngine::new(vec![
        Step::request(&sub_url, Some(HandlerType::HttpScheme.origin())),
        Step::load_end(&sub_url, 404),
        Step::query(&main_url, SUCCESS_MSG),
    ]);
    let context = context();

    let outcome = run_scenario(scenario, &context, &engine, &CorsTestConfig::default())
        .await
        .unwrap();

    outcome.assert_passed();
    context.teardown().await.unwrap();
}

/// Engine that cannot open a browser.
struct BrokenEngine;

#[async_trait]
impl BrowserEngine for BrokenEngine {
    async fn create_browser(
        &self,
        _url: &str,
        _client: Arc<dyn EngineClient>,
    ) -> probe_cors::Result<()> {
        Err(CorsError::engine(std::io::Error::other("no display")))
    }

    async fn close_browser(&self) -> probe_cors::Result<()> {
        Ok(())
    }
}

#[tokio::test]
#[serial]
async fn test_browser_failure_releases_the_test_server() {
    let scenario = scenario("CorsTest.BasicServerWithQuery");
    let context = context();

    let result = run_scenario(scenario, &context, &BrokenEngine, &CorsTestConfig::default()).await;
    assert!(matches!(result, Err(CorsError::Engine(_))));

    // Nothing is left registered with the server.
    context.teardown().await.unwrap();
}

#[tokio::test]
async fn test_server_that_never_starts_is_released() {
    init_test_logging();
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let config = ServerConfig {
        port: taken.local_addr().unwrap().port(),
        ..ServerConfig::default()
    };
    let context = ServerContext::new(config);

    let result = run_scenario(
        scenario("CorsTest.BasicServerWithQuery"),
        &context,
        &ScriptedEngine::default(),
        &short_timeout(),
    )
    .await;
    assert!(matches!(result, Err(CorsError::Timeout(_))));

    context.teardown().await.unwrap();
}
