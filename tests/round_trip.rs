//! End-to-end scenarios against a mock origin (wiremock), covering the
//! scenarios listed in SPEC_FULL §8.

use fetch_cache::{CacacheStore, Cache, CacheMode, Error, Options, Request};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn cache_in(dir: &tempfile::TempDir) -> Cache<CacacheStore> {
    Cache::new(CacacheStore::new(dir.path().to_string_lossy().into_owned()))
}

#[tokio::test]
async fn fresh_response_is_served_from_cache_on_second_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hello"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("cache-control", "max-age=300")
                .set_body_string("hello, world!"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let cache = cache_in(&dir);
    let url: url::Url = format!("{}/hello", server.uri()).parse().unwrap();
    let options = Options::default();

    let first = cache.run(&Request::get(url.clone()), &options).await.unwrap();
    assert_eq!(first.body, b"hello, world!");
    assert_eq!(first.headers.get("x-cache").unwrap(), "MISS");

    let second = cache.run(&Request::get(url), &options).await.unwrap();
    assert_eq!(second.body, b"hello, world!");
    assert_eq!(second.headers.get("x-cache").unwrap(), "HIT");
    assert!(second.headers.get("x-local-cache-hash").unwrap().starts_with("sha256-"));
    assert!(second.headers.contains_key("x-local-cache-key"));
    assert!(second.headers.contains_key("x-local-cache-time"));
}

#[tokio::test]
async fn etag_revalidation_serves_304_merge() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/etag"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("cache-control", "max-age=0")
                .insert_header("etag", "\"abc\"")
                .set_body_string("body"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/etag"))
        .and(header("if-none-match", "\"abc\""))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let cache = cache_in(&dir);
    let url: url::Url = format!("{}/etag", server.uri()).parse().unwrap();
    let options = Options::default();

    cache.run(&Request::get(url.clone()), &options).await.unwrap();
    let second = cache.run(&Request::get(url), &options).await.unwrap();
    assert_eq!(second.body, b"body");
    assert!(second.headers.get("warning").unwrap().starts_with("110"));
}

#[tokio::test]
async fn only_if_cached_miss_fails_without_contacting_origin() {
    let server = MockServer::start().await;
    // No mocks registered: if the client contacted the origin, wiremock
    // would panic on an unmatched request when the mock server is dropped.
    let dir = tempfile::TempDir::new().unwrap();
    let cache = cache_in(&dir);
    let url: url::Url = format!("{}/missing", server.uri()).parse().unwrap();
    let mut options = Options::default();
    options.cache = CacheMode::OnlyIfCached;

    let err = cache.run(&Request::get(url), &options).await.unwrap_err();
    assert!(matches!(err, Error::NotCached(_)));
}

#[tokio::test]
async fn no_store_response_is_never_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(ResponseTemplate::new(200).insert_header("cache-control", "no-store").set_body_string("secret"))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let cache = cache_in(&dir);
    let url: url::Url = format!("{}/private", server.uri()).parse().unwrap();
    let options = Options::default();

    cache.run(&Request::get(url.clone()), &options).await.unwrap();
    let second = cache.run(&Request::get(url), &options).await.unwrap();
    assert_eq!(second.headers.get("x-cache-lookup").unwrap(), "MISS");
}
