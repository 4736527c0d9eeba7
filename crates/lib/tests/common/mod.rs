//! Shared helpers: free ports, a gateway launcher, and in-process mock engine / connector servers.

#![allow(dead_code)]

use axum::{
    extract::{Form, Path, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use lib::config::Config;
use lib::gateway;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

/// One request as seen by the mock engine.
#[derive(Debug, Clone)]
pub struct EngineCall {
    pub form: HashMap<String, String>,
    pub cookie: Option<String>,
}

#[derive(Clone, Default)]
pub struct MockEngine {
    pub calls: Arc<Mutex<Vec<EngineCall>>>,
}

impl MockEngine {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }
}

/// Engine that greets on empty input and otherwise answers with two chunks plus suggested
/// actions. Session ids rotate on every call: S-1, S-2, ...
pub async fn start_mock_engine() -> (String, MockEngine) {
    async fn input(
        State(engine): State<MockEngine>,
        headers: HeaderMap,
        Form(form): Form<HashMap<String, String>>,
    ) -> Json<Value> {
        let cookie = headers
            .get("cookie")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let n = {
            let mut calls = engine.calls.lock().unwrap();
            calls.push(EngineCall {
                form: form.clone(),
                cookie,
            });
            calls.len()
        };
        let user_input = form.get("userinput").cloned().unwrap_or_default();
        let (text, parameters) = if user_input.is_empty() {
            ("Hi! I am the engine.".to_string(), json!({}))
        } else {
            (
                "Hello || World ||  ".to_string(),
                json!({
                    "msbotframework": json!({
                        "actions": [{ "type": "imBack", "title": "Yes", "value": "yes" }]
                    })
                    .to_string()
                }),
            )
        };
        Json(json!({
            "status": 0,
            "input": { "text": user_input, "parameters": {} },
            "output": { "text": text, "emotion": "", "link": "", "parameters": parameters },
            "sessionId": format!("S-{}", n),
        }))
    }

    let engine = MockEngine::default();
    let app = Router::new()
        .route("/", post(input))
        .with_state(engine.clone());
    let url = serve(app).await;
    (format!("{}/", url), engine)
}

/// One activity as received by the mock connector.
#[derive(Debug, Clone)]
pub struct Delivered {
    pub conversation_id: String,
    pub reply_to: Option<String>,
    pub activity: Value,
}

#[derive(Clone, Default)]
pub struct MockConnector {
    pub delivered: Arc<Mutex<Vec<Delivered>>>,
}

impl MockConnector {
    pub fn delivered(&self) -> Vec<Delivered> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.delivered()
            .iter()
            .filter_map(|d| d.activity.get("text").and_then(|t| t.as_str()).map(str::to_string))
            .collect()
    }
}

pub async fn start_mock_connector() -> (String, MockConnector) {
    async fn reply(
        State(connector): State<MockConnector>,
        Path((conversation_id, reply_to)): Path<(String, String)>,
        Json(activity): Json<Value>,
    ) -> Json<Value> {
        connector.delivered.lock().unwrap().push(Delivered {
            conversation_id,
            reply_to: Some(reply_to),
            activity,
        });
        Json(json!({ "id": "out-1" }))
    }

    async fn send(
        State(connector): State<MockConnector>,
        Path(conversation_id): Path<String>,
        Json(activity): Json<Value>,
    ) -> Json<Value> {
        connector.delivered.lock().unwrap().push(Delivered {
            conversation_id,
            reply_to: None,
            activity,
        });
        Json(json!({ "id": "out-2" }))
    }

    let connector = MockConnector::default();
    let app = Router::new()
        .route("/v3/conversations/:conversation_id/activities", post(send))
        .route(
            "/v3/conversations/:conversation_id/activities/:reply_to",
            post(reply),
        )
        .with_state(connector.clone());
    let url = serve(app).await;
    (url, connector)
}

/// Start the gateway with `config` on a free port and wait until `GET /` answers.
/// Returns the gateway base URL. The server task is left running when the test ends.
pub async fn start_gateway(mut config: Config) -> String {
    let port = free_port();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();
    tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });

    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(format!("{}/", base)).send().await {
            if resp.status().is_success() {
                return base;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("gateway at {} did not come up within 5s", base);
}

pub fn message(service_url: &str, conversation_id: &str, activity_id: &str, text: &str) -> Value {
    json!({
        "type": "message",
        "id": activity_id,
        "serviceUrl": service_url,
        "channelId": "emulator",
        "from": { "id": "user-1", "name": "Ada Lovelace" },
        "conversation": { "id": conversation_id },
        "recipient": { "id": "bot-1", "name": "Relay" },
        "text": text,
        "entities": [{ "type": "ClientCapabilities", "locale": "en-US", "country": "US" }]
    })
}

pub fn members_added(service_url: &str, conversation_id: &str, members: &[&str]) -> Value {
    let added: Vec<Value> = members.iter().map(|id| json!({ "id": id })).collect();
    json!({
        "type": "conversationUpdate",
        "id": "upd-1",
        "serviceUrl": service_url,
        "channelId": "emulator",
        "from": { "id": "user-1", "name": "Ada Lovelace" },
        "conversation": { "id": conversation_id },
        "recipient": { "id": "bot-1", "name": "Relay" },
        "membersAdded": added,
        "entities": [{ "type": "ClientCapabilities", "locale": "en-US", "country": "US" }]
    })
}
