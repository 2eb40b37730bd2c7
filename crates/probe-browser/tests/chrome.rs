//! CORS scenarios in a real Chrome.
//!
//! These tests require Chrome/Chromium to be installed and are marked
//! #[ignore] by default. Run with: cargo test -p probe-browser -- --ignored
//!
//! Only the server and HTTP-scheme origins are exercised; Chrome has no way
//! to register the custom schemes.

use probe_browser::{ChromeEngine, TestBrowserConfig};
use probe_cors::{CorsTestConfig, HandlerType, Scenario, run_scenario};
use probe_server::{ServerConfig, ServerContext};
use serial_test::serial;
use std::time::Duration;

fn runnable_in_chrome(scenario: &Scenario) -> bool {
    let chrome_handler = |handler: HandlerType| {
        matches!(handler, HandlerType::Server | HandlerType::HttpScheme)
    };
    match *scenario {
        Scenario::Basic { handler, .. } => chrome_handler(handler),
        Scenario::Iframe { main, iframe, .. } => chrome_handler(main) && chrome_handler(iframe),
        Scenario::Exec { main, sub, .. } => chrome_handler(main) && chrome_handler(sub),
    }
}

async fn run_named(engine: &ChromeEngine, name: &str) {
    let scenario = Scenario::by_name(name).unwrap();
    let context = ServerContext::new(ServerConfig::default());
    let config = CorsTestConfig::default().with_timeout(Duration::from_secs(10));

    let outcome = run_scenario(scenario, &context, engine, &config)
        .await
        .unwrap_or_else(|e| panic!("{name}: {e}"));

    context.teardown().await.unwrap();
    outcome.assert_passed();
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
#[serial]
async fn test_basic_server_with_query() {
    let engine = ChromeEngine::launch(TestBrowserConfig::default())
        .await
        .expect("failed to launch browser");

    run_named(&engine, "CorsTest.BasicServerWithQuery").await;
    run_named(&engine, "CorsTest.BasicHttpSchemeWithQuery").await;

    engine.shutdown().await.unwrap();
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_xhr_between_server_and_http_scheme() {
    let engine = ChromeEngine::launch(TestBrowserConfig::default())
        .await
        .expect("failed to launch browser");

    for name in [
        "CorsTest.XhrWithHeaderServerToServer",
        "CorsTest.XhrNoHeaderServerToHttpScheme",
        "CorsTest.XhrWithHeaderServerToHttpScheme",
        "CorsTest.FetchNoHeaderHttpSchemeToServer",
        "CorsTest.FetchWithHeaderHttpSchemeToServer",
    ] {
        run_named(&engine, name).await;
    }

    engine.shutdown().await.unwrap();
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_every_chrome_runnable_scenario() {
    let engine = ChromeEngine::launch(TestBrowserConfig::default())
        .await
        .expect("failed to launch browser");

    let scenarios: Vec<Scenario> = Scenario::all()
        .into_iter()
        .filter(runnable_in_chrome)
        .collect();
    assert_eq!(scenarios.len(), 4 + 3 * 4 + 4 * 4);

    for scenario in scenarios {
        run_named(&engine, &scenario.name()).await;
    }

    assert!(engine.console().messages().iter().all(|m| !m.text.is_empty()));
    engine.shutdown().await.unwrap();
}
