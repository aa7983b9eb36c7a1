//! End-to-end pipeline tests against a mocked subs.ro API.

use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use subfetch::config::Config;
use subfetch::error::Error;
use subfetch::provider::SubsroProvider;
use subfetch::service::SubtitleService;
use subfetch::types::{MediaId, SearchQuery};

fn service_for(server: &MockServer) -> SubtitleService {
    let mut config = Config::with_api_key("test-key");
    config.base_url = server.uri();
    SubtitleService::from_config(&config).unwrap()
}

fn zip_with(name: &str, data: &[u8]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(name, zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(data).unwrap();
    writer.finish().unwrap().into_inner()
}

fn search_results(results: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "results": results }))
}

async fn mount_search(
    server: &MockServer,
    field_path: &str,
    language: &str,
    results: serde_json::Value,
    expected_calls: u64,
) {
    Mock::given(method("GET"))
        .and(path(field_path))
        .and(query_param("language", language))
        .respond_with(search_results(results))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_download(server: &MockServer, id: &str, body: Vec<u8>, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/subtitle/{id}/download")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn episodic_search_with_unsupported_language() {
    let server = MockServer::start().await;

    let ro_results = json!([
        { "id": 1, "title": "Show", "release": "Show.S02E05.720p", "language": "ro",
          "season": 2, "episode": 5, "downloads": 100 },
        { "id": 2, "title": "Show", "release": "Show.S02E06.720p", "language": "ro",
          "season": 2, "episode": 6 },
    ]);
    let en_results = json!([
        { "id": 3, "title": "Show", "release": "Show.S02E05.WEB", "language": "en",
          "season": 2, "episode": 5 },
    ]);
    mount_search(&server, "/search/imdbid/tt1234567", "ro", ro_results, 1).await;
    mount_search(&server, "/search/imdbid/tt1234567", "en", en_results, 1).await;
    mount_download(&server, "1", zip_with("Show.S02E05.srt", b"text ro\n"), 1).await;
    mount_download(&server, "3", zip_with("Show.S02E05.srt", b"text en\n"), 1).await;

    let service = service_for(&server);
    // "ru" is not supported by the provider and must be dropped, not fatal.
    let query = SearchQuery::new(
        MediaId::Imdb("tt1234567".into()),
        vec!["ro".into(), "en".into(), "ru".into()],
    )
    .with_episode(2, 5);

    let artifacts = service.find_subtitles(&query).await.unwrap();

    assert_eq!(artifacts.len(), 2);
    // Output follows the caller's language preference order.
    assert_eq!(artifacts[0].language.as_str(), "ro");
    assert_eq!(artifacts[0].text, "text ro\n");
    assert_eq!(artifacts[1].language.as_str(), "en");
    // The S02E06 candidate must never have been downloaded.
    assert!(artifacts.iter().all(|a| a.candidate_id != "2"));
}

#[tokio::test]
async fn repeated_query_hits_cache() {
    let server = MockServer::start().await;

    let results = json!([
        { "id": 9, "title": "Film", "release": "Film.2020.1080p", "language": "ro" },
    ]);
    // expect(1): the second call must be served from cache.
    mount_search(&server, "/search/imdbid/tt42", "ro", results, 1).await;
    mount_download(&server, "9", zip_with("Film.srt", b"cached text\n"), 1).await;

    let service = service_for(&server);
    let query = SearchQuery::new(MediaId::Imdb("tt42".into()), vec!["ro".into()]);

    let first = service.find_subtitles(&query).await.unwrap();
    let second = service.find_subtitles(&query).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first[0].text, "cached text\n");
}

#[tokio::test]
async fn concurrent_identical_queries_fetch_once() {
    let server = MockServer::start().await;

    let results = json!([
        { "id": 5, "title": "Film", "release": "Film.2021", "language": "ro" },
    ]);
    mount_search(&server, "/search/imdbid/tt7", "ro", results, 1).await;
    mount_download(&server, "5", zip_with("Film.srt", b"only fetch\n"), 1).await;

    let service = Arc::new(service_for(&server));
    let query = SearchQuery::new(MediaId::Imdb("tt7".into()), vec!["ro".into()]);

    let mut handles = Vec::new();
    for _ in 0..6 {
        let service = Arc::clone(&service);
        let query = query.clone();
        handles.push(tokio::spawn(
            async move { service.find_subtitles(&query).await },
        ));
    }

    for handle in handles {
        let artifacts = handle.await.unwrap().unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].text, "only fetch\n");
    }
}

#[tokio::test]
async fn corrupt_archive_falls_through_to_next_candidate() {
    let server = MockServer::start().await;

    let results = json!([
        { "id": 11, "title": "Film", "release": "Film.1080p", "language": "ro", "downloads": 500 },
        { "id": 12, "title": "Film", "release": "Film.720p", "language": "ro", "downloads": 10 },
    ]);
    mount_search(&server, "/search/imdbid/tt9", "ro", results, 1).await;
    // Top-ranked candidate serves a recognized but unreadable container.
    mount_download(&server, "11", b"PK\x03\x04 garbage".to_vec(), 1).await;
    mount_download(&server, "12", zip_with("Film.srt", b"second choice\n"), 1).await;

    let service = service_for(&server);
    let query = SearchQuery::new(MediaId::Imdb("tt9".into()), vec!["ro".into()]);

    let artifacts = service.find_subtitles(&query).await.unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].candidate_id, "12");
    assert_eq!(artifacts[0].text, "second choice\n");
}

#[tokio::test]
async fn invalid_api_key_is_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search/imdbid/tt1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let service = service_for(&server);
    let query = SearchQuery::new(MediaId::Imdb("tt1".into()), vec!["ro".into()]);

    let err = service.find_subtitles(&query).await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn per_language_failure_does_not_poison_others() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search/imdbid/tt3"))
        .and(query_param("language", "ro"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let en_results = json!([
        { "id": 21, "title": "Film", "release": "Film.WEB", "language": "en" },
    ]);
    mount_search(&server, "/search/imdbid/tt3", "en", en_results, 1).await;
    mount_download(&server, "21", zip_with("Film.srt", b"english\n"), 1).await;

    let service = service_for(&server);
    let query = SearchQuery::new(
        MediaId::Imdb("tt3".into()),
        vec!["ro".into(), "en".into()],
    );

    let artifacts = service.find_subtitles(&query).await.unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].language.as_str(), "en");
}

#[tokio::test]
async fn no_results_is_empty_not_error() {
    let server = MockServer::start().await;
    mount_search(&server, "/search/title/Nothing", "ro", json!([]), 1).await;

    let service = service_for(&server);
    let query = SearchQuery::new(MediaId::Title("Nothing".into()), vec!["ro".into()]);

    let artifacts = service.find_subtitles(&query).await.unwrap();
    assert!(artifacts.is_empty());
}

#[tokio::test]
async fn unreachable_provider_degrades_to_empty() {
    // Nothing listens here; the client retries the connect once and the
    // orchestrator absorbs the failure as zero results for the language.
    let mut config = Config::with_api_key("test-key");
    config.base_url = "http://127.0.0.1:9".into();
    let service = SubtitleService::from_config(&config).unwrap();

    let query = SearchQuery::new(MediaId::Imdb("tt1".into()), vec!["ro".into()]);
    let artifacts = service.find_subtitles(&query).await.unwrap();
    assert!(artifacts.is_empty());
}

#[tokio::test]
async fn quota_endpoint_reports_remaining_requests() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/quota"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "limit": 200,
            "remaining": 137
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = SubsroProvider::with_base_url("test-key".into(), server.uri()).unwrap();
    let quota = provider.check_quota().await.unwrap();

    assert_eq!(quota.limit, Some(200));
    assert_eq!(quota.remaining, Some(137));
}

#[tokio::test]
async fn cancellation_returns_partial_results() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search/imdbid/tt5"))
        .and(query_param("language", "ro"))
        .respond_with(
            search_results(json!([])).set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let service = service_for(&server);
    let query = SearchQuery::new(MediaId::Imdb("tt5".into()), vec!["ro".into()]);

    let cancel = CancellationToken::new();
    let search = service.find_subtitles_with_cancel(&query, &cancel);
    tokio::pin!(search);

    let result = tokio::select! {
        result = &mut search => result,
        _ = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
            // Keep polling the search future after signalling.
            std::future::pending::<()>().await;
        } => unreachable!(),
    };

    let artifacts = result.unwrap();
    assert!(artifacts.is_empty());
}
