//! Status handling of the archive fetcher and the label lookup client

use reqwest::Client;
use std::sync::Arc;

use market_history_ingest::downloader::RateLimiter;
use market_history_ingest::fetcher::{DayFetcher, FetcherError, HttpArchiveFetcher};
use market_history_ingest::identifier::{EsiNameLookup, LabelEntry, LabelLookup, LookupError};

use crate::support::http::StubServer;
use crate::support::{compress, fixture_csv, fixture_date};

fn lookup_for(server: &StubServer) -> EsiNameLookup {
    EsiNameLookup::new(
        Arc::new(Client::new()),
        format!("{}/universe/names/", server.url),
        RateLimiter::per_second("lookup", 100),
    )
}

fn fetcher_for(server: &StubServer) -> HttpArchiveFetcher {
    HttpArchiveFetcher::with_base_url(Arc::new(Client::new()), server.url.clone())
}

#[tokio::test]
async fn test_lookup_ok_decodes_entries() {
    let server = StubServer::respond(
        200,
        r#"[{"category":"inventory_type","id":34,"name":"Tritanium"},{"category":"inventory_type","id":35,"name":"Pyerite"}]"#,
    )
    .await;

    let entries = lookup_for(&server).lookup(&[34, 35]).await.unwrap();

    assert_eq!(
        entries,
        vec![
            LabelEntry {
                id: 34,
                name: "Tritanium".to_string(),
                category: "inventory_type".to_string(),
            },
            LabelEntry {
                id: 35,
                name: "Pyerite".to_string(),
                category: "inventory_type".to_string(),
            },
        ]
    );

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].request_line.starts_with("POST /universe/names/"));
    assert_eq!(requests[0].body, "[34,35]");
}

#[tokio::test]
async fn test_lookup_not_found_is_unknown_id() {
    let server = StubServer::respond(404, r#"{"error":"Ensure all IDs are valid before resolving."}"#).await;

    let result = lookup_for(&server).lookup(&[34, 999_999_999]).await;
    assert!(matches!(result, Err(LookupError::UnknownId)));
}

#[tokio::test]
async fn test_lookup_other_status_is_server_error() {
    let server = StubServer::respond(503, "maintenance").await;

    let result = lookup_for(&server).lookup(&[34]).await;
    match result {
        Err(LookupError::Server { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("expected server error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_lookup_long_multibyte_error_body_is_cut_cleanly() {
    let server = StubServer::respond(502, format!("x{}", "é".repeat(400))).await;
    let lookup = lookup_for(&server);

    // Runs on its own task so a panic surfaces as a JoinError
    let result = tokio::spawn(async move { lookup.lookup(&[34]).await }).await;

    match result {
        Ok(Err(LookupError::Server { status, body })) => {
            assert_eq!(status, 502);
            assert_eq!(body.chars().count(), 512);
            assert!(body.starts_with('x'));
        }
        other => panic!("expected server error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_lookup_malformed_body_is_decode_error() {
    let server = StubServer::respond(200, "not json").await;

    let result = lookup_for(&server).lookup(&[34]).await;
    assert!(matches!(result, Err(LookupError::Decode(_))));
}

#[tokio::test]
async fn test_archive_ok_returns_payload() {
    let payload = compress(&fixture_csv());
    let server = StubServer::respond(200, payload.to_vec()).await;

    let bytes = fetcher_for(&server).fetch_day(fixture_date()).await.unwrap();
    assert_eq!(bytes, payload);

    let requests = server.requests();
    assert_eq!(
        requests[0].request_line,
        "GET /2003/market-history-2003-10-01.csv.bz2 HTTP/1.1"
    );
}

#[tokio::test]
async fn test_archive_missing_day_is_http_error() {
    let server = StubServer::respond(404, "").await;
    let fetcher = fetcher_for(&server);

    let result = fetcher.fetch_day(fixture_date()).await;
    match result {
        Err(FetcherError::HttpError { status, url }) => {
            assert_eq!(status, 404);
            assert_eq!(url, fetcher.url_for(fixture_date()));
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_archive_server_error_is_http_error() {
    let server = StubServer::respond(500, "boom").await;

    let result = fetcher_for(&server).fetch_day(fixture_date()).await;
    assert!(matches!(result, Err(FetcherError::HttpError { status: 500, .. })));
}
