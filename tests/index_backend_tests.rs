use anyhow::Result;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{Request, StatusCode, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

use webcloset::api::{AppState, create_router};
use webcloset::config::IndexConfig;
use webcloset::error::Error;
use webcloset::query_engine::{Backend, QueryEngine};
use webcloset::search_index::SearchIndex;

mod test_helpers {
    use super::*;

    /// Serve `router` on an ephemeral port and return its base URL.
    pub async fn spawn_fake_index(router: Router) -> Result<String> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Ok(format!("http://{addr}"))
    }

    pub fn engine(config: &IndexConfig) -> Result<QueryEngine> {
        Ok(QueryEngine::new(Backend::Index(SearchIndex::new(config)?)))
    }

    pub fn app(config: &IndexConfig) -> Result<Router> {
        Ok(create_router(AppState::new(engine(config)?, Vec::new())))
    }

    pub async fn send(app: Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
        let response = app.oneshot(request).await?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, body))
    }

    pub fn post_search(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/search")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    pub fn hits(total: Value, hits: Value) -> Value {
        json!({ "took": 3, "timed_out": false, "hits": { "total": total, "hits": hits } })
    }

    /// A fake index that records each search body and answers with no hits.
    pub fn recording_index(sink: Arc<Mutex<Option<Value>>>) -> Router {
        Router::new().route(
            "/products/_search",
            post(move |Json(body): Json<Value>| {
                let sink = sink.clone();
                async move {
                    *sink.lock().unwrap() = Some(body);
                    Json(hits(json!({ "value": 0 }), json!([])))
                }
            }),
        )
    }
}

use test_helpers::*;

#[tokio::test]
async fn test_search_sends_query_document_and_assembles_hits() -> Result<()> {
    let captured: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
    let sink = captured.clone();
    let fake = Router::new().route(
        "/products/_search",
        post(move |Json(body): Json<Value>| {
            let sink = sink.clone();
            async move {
                *sink.lock().unwrap() = Some(body);
                Json(hits(
                    json!({ "value": 42, "relation": "eq" }),
                    json!([{
                        "_id": "es-1",
                        "_score": 3.2,
                        "_source": {
                            "title": "Dunk Low Panda",
                            "brand": "Nike",
                            "image": "https://img.webcloset.shop/dunk.jpg",
                            "price_cents": 8000.0,
                            "listings_count": 3,
                            "seller_urls": ["https://stockx.com/dunk-panda"]
                        }
                    }]),
                ))
            }
        }),
    );
    let url = spawn_fake_index(fake).await?;

    let (status, body) = send(
        app(&IndexConfig::new(url, "products"))?,
        post_search(json!({
            "q": "dunk",
            "brands": ["Nike"],
            "price_min": 50,
            "sort": "price_asc",
            "page": 2,
            "per_page": 10
        })),
    )
    .await?;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["total"], json!(42));
    assert_eq!(body["page"], json!(2));
    assert_eq!(body["total_pages"], json!(5));
    assert_eq!(body["has_more"], json!(true));
    let item = &body["items"][0];
    assert_eq!(item["id"], json!("es-1"));
    assert_eq!(
        item["image_url"],
        json!("https://img.webcloset.shop/dunk.jpg")
    );
    assert_eq!(item["price_cents"], json!(8000));
    assert_eq!(item["listings_count"], json!(3));

    let sent = captured.lock().unwrap().clone().expect("index was queried");
    assert_eq!(sent["from"], json!(10));
    assert_eq!(sent["size"], json!(10));
    assert_eq!(sent["track_total_hits"], json!(true));
    assert_eq!(
        sent["sort"],
        json!([{ "price_cents": "asc" }, { "_score": "desc" }])
    );
    let filters = sent["query"]["bool"]["filter"].as_array().unwrap();
    assert!(filters.contains(&json!({ "terms": { "brand": ["nike"] } })));
    assert!(filters.contains(&json!({ "range": { "price_cents": { "gte": 5000 } } })));
    let should = &sent["query"]["bool"]["must"][0]["bool"]["should"];
    assert_eq!(should.as_array().unwrap().len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_legacy_numeric_total() -> Result<()> {
    let fake = Router::new().route(
        "/products/_search",
        post(|| async { Json(hits(json!(7), json!([]))) }),
    );
    let url = spawn_fake_index(fake).await?;
    let engine = engine(&IndexConfig::new(url, "products"))?;

    let page = engine
        .search(&webcloset::normalizer::normalize(&Default::default())?)
        .await?;
    assert_eq!(page.total, 7);
    assert!(page.items.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_malformed_hit_fails_the_page() -> Result<()> {
    let fake = Router::new().route(
        "/products/_search",
        post(|| async {
            Json(hits(
                json!({ "value": 2 }),
                json!([
                    { "_id": "ok", "_source": { "title": "Samba", "price_cents": 9000 } },
                    { "_id": "bad", "_source": { "title": "Broken", "price_cents": "cheap" } }
                ]),
            ))
        }),
    );
    let url = spawn_fake_index(fake).await?;

    let (status, body) = send(
        app(&IndexConfig::new(url, "products"))?,
        post_search(json!({})),
    )
    .await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], json!("InternalError"));
    // details stay in the logs
    assert!(!body["message"].as_str().unwrap().contains("cheap"));
    Ok(())
}

#[tokio::test]
async fn test_validation_happens_before_the_index_is_touched() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let fake = Router::new().route(
        "/products/_search",
        post(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Json(hits(json!({ "value": 0 }), json!([])))
            }
        }),
    );
    let url = spawn_fake_index(fake).await?;

    let (status, _) = send(
        app(&IndexConfig::new(url, "products"))?,
        post_search(json!({ "price_min": 300, "price_max": 100 })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_timeouts_are_retried_then_reported_unavailable() -> Result<()> {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let fake = Router::new().route(
        "/products/_search",
        post(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(hits(json!({ "value": 0 }), json!([])))
            }
        }),
    );
    let url = spawn_fake_index(fake).await?;
    let config = IndexConfig {
        timeout: Duration::from_millis(150),
        max_retries: 2,
        ..IndexConfig::new(url, "products")
    };

    let (status, body) = send(app(&config)?, post_search(json!({}))).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], json!("BackendUnavailable"));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    Ok(())
}

#[tokio::test]
async fn test_server_errors_are_not_retried() -> Result<()> {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let fake = Router::new().route(
        "/products/_search",
        post(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                (StatusCode::SERVICE_UNAVAILABLE, "cluster is recovering")
            }
        }),
    );
    let url = spawn_fake_index(fake).await?;

    let (status, _) = send(
        app(&IndexConfig::new(url, "products"))?,
        post_search(json!({})),
    )
    .await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_index_is_unavailable() -> Result<()> {
    let engine = engine(&IndexConfig::new("http://127.0.0.1:1", "products"))?;
    let err = engine
        .search(&webcloset::normalizer::normalize(&Default::default())?)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BackendUnavailable(_)), "{err:?}");
    Ok(())
}

async fn fake_doc(
    State(includes): State<Arc<Mutex<Vec<String>>>>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    if let Some(fields) = params.get("_source_includes") {
        includes.lock().unwrap().push(fields.clone());
    }
    let urls = match id.as_str() {
        "dunk-panda" => json!(["https://stockx.com/dunk-panda", "https://ebay.com/itm/9"]),
        "ftp-item" => json!(["ftp://files.example.com/x"]),
        "no-urls" => json!([]),
        _ => {
            let missing = json!({ "_index": "products", "_id": id, "found": false });
            return (StatusCode::NOT_FOUND, Json(missing));
        }
    };
    let doc = json!({
        "_index": "products",
        "_id": id,
        "found": true,
        "_source": { "seller_urls": urls }
    });
    (StatusCode::OK, Json(doc))
}

fn click_index(includes: Arc<Mutex<Vec<String>>>) -> Router {
    Router::new()
        .route("/products/_doc/:id", get(fake_doc))
        .route("/products", get(|| async { StatusCode::OK }))
        .with_state(includes)
}

#[tokio::test]
async fn test_click_redirects_to_first_seller_url() -> Result<()> {
    let includes = Arc::new(Mutex::new(Vec::new()));
    let url = spawn_fake_index(click_index(includes.clone())).await?;
    let app = app(&IndexConfig::new(url, "products"))?;

    let response = app.oneshot(get_request("/click?id=dunk-panda")).await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://stockx.com/dunk-panda"
    );
    assert_eq!(
        includes.lock().unwrap().as_slice(),
        ["seller_urls".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn test_click_failures() -> Result<()> {
    let url = spawn_fake_index(click_index(Arc::new(Mutex::new(Vec::new())))).await?;
    let config = IndexConfig::new(url, "products");

    let (status, body) = send(app(&config)?, get_request("/click?id=missing-id")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], json!("NotFoundError"));

    let (status, body) = send(app(&config)?, get_request("/click?id=no-urls")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], json!("NotFoundError"));

    let (status, body) = send(app(&config)?, get_request("/click?id=ftp-item")).await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], json!("ValidationError"));
    Ok(())
}

#[tokio::test]
async fn test_deep_health_pings_index() -> Result<()> {
    let url = spawn_fake_index(click_index(Arc::new(Mutex::new(Vec::new())))).await?;
    let (status, body) = send(
        app(&IndexConfig::new(url, "products"))?,
        get_request("/health?deep=true"),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["backend"], json!("elasticsearch"));

    let missing = IndexConfig::new("http://127.0.0.1:1", "products");
    let (status, body) = send(app(&missing)?, get_request("/health?deep=true")).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], json!("BackendUnavailable"));
    Ok(())
}

#[tokio::test]
async fn test_click_dot_segment_ids_never_reach_the_index() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let fake = Router::new().fallback(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Json(json!({
                "_index": "products",
                "_id": "products",
                "found": true,
                "_source": { "seller_urls": ["https://ebay.com/itm/1"] }
            }))
        }
    });
    let url = spawn_fake_index(fake).await?;
    let config = IndexConfig::new(url, "products");

    for uri in ["/click?id=.", "/click?id=..", "/click?id=%2E%2E"] {
        let (status, body) = send(app(&config)?, get_request(uri)).await?;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["kind"], json!("NotFoundError"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_keyword_search_filters_on_hints() -> Result<()> {
    let captured = Arc::new(Mutex::new(None));
    let url = spawn_fake_index(recording_index(captured.clone())).await?;

    let (status, body) = send(
        app(&IndexConfig::new(url, "products"))?,
        get_request("/nlp/search?q=black%20nike%20under%2090&per_page=5"),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["total"], json!(0));

    let sent = captured.lock().unwrap().clone().expect("index was queried");
    assert_eq!(sent["size"], json!(5));
    assert_eq!(sent["sort"], json!([{ "_score": "desc" }]));
    let query = &sent["query"]["bool"];
    assert_eq!(query["must"], json!([{ "match_all": {} }]));
    assert_eq!(
        query["should"][0]["multi_match"]["query"],
        json!("black nike under 90")
    );
    let filters = query["filter"].as_array().unwrap();
    assert!(filters.contains(&json!({ "terms": { "brand": ["nike"] } })));
    assert!(filters.contains(&json!({ "terms": { "color": ["black"] } })));
    assert!(filters.contains(&json!({ "range": { "price_cents": { "lte": 9000 } } })));
    Ok(())
}
