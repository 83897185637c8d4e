use std::time::Duration;

use serde_json::json;
use storefront_service::config::CmsConfig;
use storefront_service::{ApiError, CmsClient, Query};
use storefront_test::{self as test, CmsServer};

fn client(server: &CmsServer) -> CmsClient {
    let config = CmsConfig {
        url: server.base_url(),
        ..Default::default()
    };
    CmsClient::new(&config).unwrap()
}

#[tokio::test]
async fn test_repeated_requests_are_cached() {
    test::setup();
    let server = CmsServer::with_catalog();
    let client = client(&server);

    let products = client.products().await.unwrap();
    assert_eq!(products.data.len(), 2);
    assert_eq!(products.data[0].document_id, "abc123");

    let again = client.products().await.unwrap();
    assert_eq!(again, products);

    assert_eq!(
        server.all_hits(),
        vec![("/api/products?populate=img&locale=ru".to_owned(), 1)]
    );
}

#[tokio::test]
async fn test_concurrent_requests_are_deduplicated() {
    test::setup();
    let server = CmsServer::with_catalog();
    server.set_delay(Duration::from_millis(100));
    let client = client(&server);

    let (a, b, c) = futures::join!(client.categories(), client.categories(), client.categories());
    let a = a.unwrap();
    assert_eq!(a, b.unwrap());
    assert_eq!(a, c.unwrap());
    assert_eq!(a.data[0].slug, "sofas");

    assert_eq!(server.accesses(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_share_clients() {
    test::setup();
    let server = CmsServer::with_catalog();
    server.set_delay(Duration::from_millis(100));
    let client = client(&server);

    // clones share the same request cache
    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.global().await })
        })
        .collect();
    for task in tasks {
        let global = task.await.unwrap().unwrap();
        assert_eq!(global.data.site_name, "Mebel");
    }

    assert_eq!(server.accesses(), 1);
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    test::setup();
    let server = CmsServer::new();
    server.respond_with_status(
        "global",
        500,
        json!({"data": null, "error": {"status": 500, "message": "Internal Server Error"}}),
    );
    let client = client(&server);

    let err = client.global().await.unwrap_err();
    assert_eq!(
        err,
        ApiError::Status {
            status: 500,
            message: Some("Internal Server Error".into())
        }
    );
    assert!(client.cache().is_empty());
    assert_eq!(client.cache().in_flight_len(), 0);

    server.respond("global", test::read_json_fixture("cms/global.json"));
    let global = client.global().await.unwrap();
    assert_eq!(global.data.phone_numbers.unwrap().tel1.unwrap(), "+998 90 000 00 00");

    assert_eq!(server.accesses(), 2);
}

#[tokio::test]
async fn test_not_found() {
    test::setup();
    let server = CmsServer::with_catalog();
    let client = client(&server);

    let err = client.product("missing").await.unwrap_err();
    assert_eq!(
        err,
        ApiError::Status {
            status: 404,
            message: Some("Not Found".into())
        }
    );

    let product = client.product("abc123").await.unwrap();
    assert_eq!(product.data.title, "Chesterfield Sofa");
    assert_eq!(product.data.sizes.unwrap().depth, Some(96.0));
}

#[tokio::test]
async fn test_invalidate() {
    test::setup();
    let server = CmsServer::with_catalog();
    let client = client(&server);

    client.products().await.unwrap();
    client.categories().await.unwrap();
    assert_eq!(server.accesses(), 2);

    client.invalidate(Some(&Query::Products));
    client.products().await.unwrap();
    client.categories().await.unwrap();
    assert_eq!(
        server.all_hits(),
        vec![("/api/products?populate=img&locale=ru".to_owned(), 1)]
    );

    client.invalidate(None);
    client.products().await.unwrap();
    client.categories().await.unwrap();
    assert_eq!(server.accesses(), 2);
}

#[tokio::test]
async fn test_locales_are_cached_separately() {
    test::setup();
    let server = CmsServer::with_catalog();
    let mut client = client(&server);

    client.categories().await.unwrap();
    client.set_locale("uz");
    client.categories().await.unwrap();
    client.categories().await.unwrap();

    assert_eq!(
        server.all_hits(),
        vec![
            ("/api/categories?populate=image&locale=ru".to_owned(), 1),
            ("/api/categories?populate=image&locale=uz".to_owned(), 1),
        ]
    );
    assert_eq!(client.cache().len(), 2);
}

#[tokio::test]
async fn test_invalid_queries_are_not_sent() {
    test::setup();
    let server = CmsServer::with_catalog();
    let client = client(&server);

    let err = client.category_by_slug("").await.unwrap_err();
    assert_eq!(err, ApiError::InvalidQuery("empty slug"));
    let err = client.products_by_category_ids(&[]).await.unwrap_err();
    assert_eq!(err, ApiError::InvalidQuery("no category ids"));

    assert_eq!(server.accesses(), 0);
}

#[tokio::test]
async fn test_zero_ttl_always_refetches() {
    test::setup();
    let server = CmsServer::with_catalog();
    let config = CmsConfig {
        url: server.base_url(),
        cache_ttl: Duration::ZERO,
        ..Default::default()
    };
    let client = CmsClient::new(&config).unwrap();

    client.products().await.unwrap();
    client.products().await.unwrap();

    assert_eq!(server.accesses(), 2);
}

#[tokio::test]
async fn test_malformed_response() {
    test::setup();
    let server = CmsServer::new();
    server.respond("products", json!({"data": "not a list"}));
    let client = client(&server);

    // the raw response is fine, decoding it into products is not
    let raw = client.fetch(&Query::Products).await.unwrap();
    assert_eq!(raw["data"], "not a list");

    let err = client.products().await.unwrap_err();
    assert!(matches!(err, ApiError::Malformed(_)));
    assert_eq!(server.accesses(), 1);
}

#[tokio::test]
async fn test_filtered_products() {
    test::setup();
    let server = CmsServer::new();
    server.respond("products", test::read_json_fixture("cms/products.json"));
    let client = client(&server);

    client.products_by_material("oak").await.unwrap();
    client.products_by_category_slug("sofas").await.unwrap();
    client.products_by_category_ids(&[1, 2]).await.unwrap();
    // same query again, served from the cache
    client.products_by_category_ids(&[1, 2]).await.unwrap();

    let hits = server.all_hits();
    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|(_, count)| *count == 1));
    assert!(hits.iter().any(|(uri, _)| uri.contains("filters%5Bmaterial%5D%5B%24eq%5D=oak")));
}
