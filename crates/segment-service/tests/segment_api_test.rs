//! 分群 REST API 集成测试
//!
//! 使用内存存储和固定时钟，通过 `tower::ServiceExt::oneshot` 驱动完整路由。

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use crm_shared::config::SegmentConfig;
use fake::Fake;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use segment_service::{
    AppState, Customer, SegmentService,
    auth::USER_ID_HEADER,
    routes,
    store::{CustomerStore, MemoryCustomerStore, MemorySegmentRepository, SegmentRepository},
};
use serde_json::{Value, json};
use tower::ServiceExt;

const OWNER: &str = "marketer-1";
const OTHER_OWNER: &str = "marketer-2";

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn fake_customer(owner: &str) -> Customer {
    Customer::new(owner, Name().fake::<String>(), SafeEmail().fake::<String>())
}

struct TestApp {
    router: Router,
    customers: Arc<MemoryCustomerStore>,
}

/// OWNER 名下三个客户：高消费近期活跃、低消费沉睡、从未下单；
/// OTHER_OWNER 名下若干高消费客户，用于验证数据隔离
fn create_test_app() -> TestApp {
    let customers = Arc::new(MemoryCustomerStore::new());

    customers.insert(
        fake_customer(OWNER)
            .with_spend(2000.0)
            .with_visits(12)
            .with_last_order(fixed_now() - Duration::days(3)),
    );
    customers.insert(
        fake_customer(OWNER)
            .with_spend(50.0)
            .with_visits(1)
            .with_last_order(fixed_now() - Duration::days(60)),
    );
    customers.insert(fake_customer(OWNER).with_spend(800.0));
    for _ in 0..5 {
        customers.insert(fake_customer(OTHER_OWNER).with_spend(9000.0));
    }

    let customer_store: Arc<dyn CustomerStore> = customers.clone();
    let segment_repo: Arc<dyn SegmentRepository> = Arc::new(MemorySegmentRepository::new());
    let service = SegmentService::new(
        customer_store,
        segment_repo,
        SegmentConfig {
            preview_sample_size: 2,
            audience_limit: 100,
        },
    )
    .with_clock(fixed_now);

    TestApp {
        router: routes::app(AppState::new(Arc::new(service))),
        customers,
    }
}

impl TestApp {
    async fn send(&self, method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn create(&self, name: &str, rules: Value) -> (StatusCode, Value) {
        self.send(
            "POST",
            "/api/segments",
            Some(OWNER),
            Some(json!({"name": name, "description": "test", "rules": rules})),
        )
        .await
    }
}

fn high_spenders() -> Value {
    json!({
        "combinator": "and",
        "rules": [{"field": "spend", "operator": ">", "value": 500}]
    })
}

// ==================== 探针与身份 ====================

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app();
    let (status, body) = app.send("GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "segment-service");
}

#[tokio::test]
async fn test_ready_without_database() {
    let app = create_test_app();
    let (status, body) = app.send("GET", "/ready", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["database"], "skipped");
}

#[tokio::test]
async fn test_missing_user_header_is_unauthorized() {
    let app = create_test_app();
    let (status, body) = app.send("GET", "/api/segments", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

// ==================== 预览 ====================

#[tokio::test]
async fn test_preview_counts_and_samples_owner_customers() {
    let app = create_test_app();
    let (status, body) = app
        .send(
            "POST",
            "/api/segments/preview",
            Some(OWNER),
            Some(json!({"rules": high_spenders()})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["count"], 2);

    let sample = body["data"]["sample"].as_array().unwrap();
    assert_eq!(sample.len(), 2);
    // 最近下单的排在前面，从未下单的排最后
    assert_eq!(sample[0]["spend"], 2000.0);
    assert_eq!(sample[0]["inactiveDays"], 3);
    assert_eq!(sample[1]["spend"], 800.0);
    assert_eq!(sample[1]["inactiveDays"], Value::Null);
}

#[tokio::test]
async fn test_preview_respects_sample_size() {
    let app = create_test_app();
    let (status, body) = app
        .send(
            "POST",
            "/api/segments/preview",
            Some(OWNER),
            Some(json!({"rules": {"combinator": "and", "rules": []}})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 3);
    assert_eq!(body["data"]["sample"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_preview_inactive_days() {
    let app = create_test_app();
    let rules = json!({
        "combinator": "and",
        "rules": [{"field": "inactiveDays", "operator": ">", "value": "30"}]
    });
    let (status, body) = app
        .send("POST", "/api/segments/preview", Some(OWNER), Some(json!({"rules": rules})))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 1);
    assert_eq!(body["data"]["sample"][0]["inactiveDays"], 60);
}

#[tokio::test]
async fn test_preview_invalid_rules() {
    let app = create_test_app();
    let rules = json!({
        "combinator": "and",
        "rules": [
            {"field": "age", "operator": ">", "value": 1},
            {"field": "spend", "operator": "between", "value": 1}
        ]
    });
    let (status, body) = app
        .send("POST", "/api/segments/preview", Some(OWNER), Some(json!({"rules": rules})))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_RULES");
    assert_eq!(body["message"], "Invalid query rules");
    assert_eq!(body["errors"].as_array().unwrap().len(), 2);
}

// ==================== 保存与查询 ====================

#[tokio::test]
async fn test_create_segment() {
    let app = create_test_app();
    let (status, body) = app.create("High spenders", high_spenders()).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["name"], "High spenders");
    assert_eq!(body["data"]["customerCount"], 2);
    assert!(body["data"]["id"].as_str().is_some());
}

#[tokio::test]
async fn test_create_segment_blank_name() {
    let app = create_test_app();
    let (status, body) = app.create("   ", high_spenders()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_create_segment_invalid_rules() {
    let app = create_test_app();
    let (status, body) = app
        .create(
            "Broken",
            json!({"combinator": "xor", "rules": [{"field": "spend", "operator": ">", "value": 1}]}),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_RULES");
}

#[tokio::test]
async fn test_create_segment_duplicate_name() {
    let app = create_test_app();
    let (status, _) = app.create("VIP", high_spenders()).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.create("VIP", high_spenders()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "SEGMENT_NAME_TAKEN");

    // 其他账号可以使用同名
    let (status, _) = app
        .send(
            "POST",
            "/api/segments",
            Some(OTHER_OWNER),
            Some(json!({"name": "VIP", "rules": high_spenders()})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_list_segments_is_scoped_to_owner() {
    let app = create_test_app();
    app.create("VIP", high_spenders()).await;
    app.create("Everyone", json!({"combinator": "and", "rules": []})).await;

    let (status, body) = app.send("GET", "/api/segments", Some(OWNER), None).await;
    assert_eq!(status, StatusCode::OK);

    let mut names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, vec!["Everyone", "VIP"]);

    let (_, body) = app.send("GET", "/api/segments", Some(OTHER_OWNER), None).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_get_segment() {
    let app = create_test_app();
    let (_, created) = app.create("VIP", high_spenders()).await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .send("GET", &format!("/api/segments/{id}"), Some(OWNER), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "VIP");
    assert_eq!(body["data"]["description"], "test");
    assert_eq!(body["data"]["isActive"], true);
    assert_eq!(body["data"]["rules"], high_spenders());
    assert!(body["data"]["compiledFilter"].is_object());

    let (status, body) = app
        .send("GET", &format!("/api/segments/{id}"), Some(OTHER_OWNER), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "SEGMENT_NOT_FOUND");
}

#[tokio::test]
async fn test_get_segment_unknown_or_malformed_id() {
    let app = create_test_app();

    let (status, _) = app
        .send("GET", &format!("/api/segments/{}", uuid::Uuid::new_v4()), Some(OWNER), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send("GET", "/api/segments/not-a-uuid", Some(OWNER), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ==================== 刷新与受众 ====================

#[tokio::test]
async fn test_refresh_segment_picks_up_new_customers() {
    let app = create_test_app();
    let (_, created) = app.create("VIP", high_spenders()).await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    app.customers.insert(fake_customer(OWNER).with_spend(1500.0));

    let (status, body) = app
        .send("POST", &format!("/api/segments/{id}/refresh"), Some(OWNER), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["customerCount"], 3);

    let last_run: DateTime<Utc> = serde_json::from_value(body["data"]["lastRun"].clone()).unwrap();
    assert_eq!(last_run, fixed_now());
}

#[tokio::test]
async fn test_refresh_all_segments() {
    let app = create_test_app();
    app.create("VIP", high_spenders()).await;
    app.create("Everyone", json!({"combinator": "and", "rules": []})).await;

    let (status, body) = app
        .send("POST", "/api/segments/refresh-all", Some(OWNER), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["refreshed"], 2);
    assert_eq!(body["data"]["failed"], 0);
}

#[tokio::test]
async fn test_segment_audience() {
    let app = create_test_app();
    let rules = json!({
        "combinator": "or",
        "rules": [
            {"field": "visits", "operator": ">=", "value": 10},
            {"field": "inactiveDays", "operator": ">", "value": 30}
        ]
    });
    let (_, created) = app.create("Loyal or lapsed", rules).await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .send("GET", &format!("/api/segments/{id}/audience"), Some(OWNER), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["segmentId"], id.as_str());
    assert_eq!(body["data"]["count"], 2);

    let customers = body["data"]["customers"].as_array().unwrap();
    assert_eq!(customers.len(), 2);
    assert_eq!(customers[0]["visits"], 12);
    assert_eq!(customers[1]["inactiveDays"], 60);
}

#[tokio::test]
async fn test_audience_of_other_owner_segment_is_not_found() {
    let app = create_test_app();
    let (_, created) = app.create("VIP", high_spenders()).await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .send("GET", &format!("/api/segments/{id}/audience"), Some(OTHER_OWNER), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = create_test_app();
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["x-request-id"], "req-42");
}
