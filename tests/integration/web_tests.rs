use crate::common::{started, test_config};
use corpus_tally::dispatcher::JobKind;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html")
        .set_body_string(format!("<html><body>\n{}\n</body></html>", body))
}

async fn mount(server: &MockServer, route: &str, body: &str, expected: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_one_hop_visits_seed_and_its_links_only() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/",
        r#"<p> alpha </p> <a href="/a">a</a> <a href="/b#section">b</a>"#,
        1,
    )
    .await;
    mount(&server, "/a", r#"<p> alpha beta </p> <a href="/c">c</a>"#, 1).await;
    mount(&server, "/b", r#"<p> beta </p> <a href="/">home</a>"#, 1).await;
    mount(&server, "/c", "<p> alpha alpha alpha </p>", 0).await;

    let app = started(test_config(&["alpha", "beta"], 1)).await;
    let seed = format!("{}/", server.uri());

    assert!(app.add_web_page(&seed).await.unwrap());

    let counts = tokio::time::timeout(
        Duration::from_secs(10),
        app.get_summary(JobKind::Web, &seed),
    )
    .await
    .expect("web corpus should complete")
    .unwrap();
    assert_eq!(counts["alpha"], 2);
    assert_eq!(counts["beta"], 2);

    let page = tokio::time::timeout(
        Duration::from_secs(5),
        app.get_summary(JobKind::Web, &format!("{}/a", server.uri())),
    )
    .await
    .expect("linked page should report on its own")
    .unwrap();
    assert_eq!(page["alpha"], 1);
    assert_eq!(page["beta"], 1);

    // /c was discovered with no hops left, so it was never tracked
    let unvisited = app
        .query_summary(JobKind::Web, &format!("{}/c", server.uri()))
        .await;
    assert!(unvisited.unwrap_err().is_missing());

    // re-adding the seed before it expires adds no work
    assert!(!app.add_web_page(&seed).await.unwrap());
    assert_eq!(app.router().queued(JobKind::Web), 0);
    assert_eq!(
        app.query_summary(JobKind::Web, &seed).await.unwrap(),
        Some(counts)
    );

    app.stop().await;
    server.verify().await;
}

#[tokio::test]
async fn test_failed_fetch_completes_with_zero_counts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let app = started(test_config(&["alpha"], 2)).await;
    let seed = format!("{}/gone", server.uri());
    assert!(app.add_web_page(&seed).await.unwrap());

    let counts = tokio::time::timeout(
        Duration::from_secs(10),
        app.get_summary(JobKind::Web, &seed),
    )
    .await
    .expect("failed page should still complete")
    .unwrap();
    assert_eq!(counts["alpha"], 0);

    app.stop().await;
}

#[tokio::test]
async fn test_pages_timing_out_before_a_slot_still_complete_the_corpus() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/",
        r#"<p> alpha </p> <a href="/a">a</a> <a href="/b">b</a>"#,
        1,
    )
    .await;
    for route in ["/a", "/b"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(html("<p> alpha beta </p>").set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;
    }

    // one slot: whichever link runs first outlives its deadline, the other never starts
    let mut config = test_config(&["alpha", "beta"], 1);
    config.engine.workers = 1;
    config.engine.job_timeout = 300;
    let app = started(config).await;
    let seed = format!("{}/", server.uri());
    assert!(app.add_web_page(&seed).await.unwrap());

    let counts = tokio::time::timeout(
        Duration::from_secs(10),
        app.get_summary(JobKind::Web, &seed),
    )
    .await
    .expect("corpus should complete despite timeouts")
    .unwrap();
    assert_eq!(counts["alpha"], 2);
    assert_eq!(counts["beta"], 1);

    let mut visited = 0;
    for link in ["/a", "/b"] {
        let page = tokio::time::timeout(
            Duration::from_secs(5),
            app.get_summary(JobKind::Web, &format!("{}{}", server.uri(), link)),
        )
        .await
        .expect("every followed link should complete")
        .unwrap();
        visited += page["beta"];
    }
    assert_eq!(visited, 1);

    app.stop().await;
}
