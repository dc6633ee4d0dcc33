//! Xiangongyun pool against a canned local HTTP server.

use std::sync::{Arc, Mutex};

use podshell::config::ProviderConfig;
use podshell::pool::{GpuModel, PodOptions, PodStatus, Pool, XiangongyunPool};
use podshell::{Error, ProviderError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const TOKEN: &str = "test-token";

const INSTANCE: &str = r#"{
    "id": "inst-42",
    "create_timestamp": 1718000000,
    "data_center_name": "Zone A",
    "name": "trainer",
    "gpu_model": "NVIDIA GeForce RTX 4090 D",
    "gpu_used": 1,
    "memory_size": 68719476736,
    "price_per_hour": 2.5,
    "ssh_port": "30022",
    "ssh_user": "root",
    "password": "pw",
    "status": "running",
    "ssh_domain": "ssh.example.com",
    "image_id": null
}"#;

/// One request as seen by the server, logged before it is answered.
#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    authorization: Option<String>,
    body: String,
}

type Route = fn(&str, &str) -> (u16, String);

/// A one-request-per-connection HTTP server answering from `route`.
struct CannedServer {
    base: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl CannedServer {
    async fn start(route: Route) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let log = Arc::clone(&log);
                tokio::spawn(handle(stream, route, log));
            }
        });

        Self { base, requests }
    }

    fn pool(&self) -> XiangongyunPool {
        let config = ProviderConfig {
            api_base: format!("{}/", self.base),
            ..ProviderConfig::default()
        };
        XiangongyunPool::new(TOKEN, &config).unwrap()
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn handle(mut stream: TcpStream, route: Route, log: Arc<Mutex<Vec<Recorded>>>) -> Option<()> {
    let mut buf = Vec::new();
    let header_end = loop {
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let mut authorization = None;
    let mut content_length = 0usize;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        match name.trim().to_ascii_lowercase().as_str() {
            "authorization" => authorization = Some(value.trim().to_string()),
            "content-length" => content_length = value.trim().parse().unwrap_or(0),
            _ => {}
        }
    }

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    let (status, payload) = route(&method, &path);
    log.lock().unwrap().push(Recorded {
        method,
        path,
        authorization,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let response = format!(
        "HTTP/1.1 {status} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    );
    stream.write_all(response.as_bytes()).await.ok()?;
    stream.shutdown().await.ok()
}

fn ok(data: &str) -> (u16, String) {
    (200, format!(r#"{{"code": 200, "msg": "ok", "data": {data}}}"#))
}

#[tokio::test]
async fn list_pods_sends_bearer_token() {
    let server = CannedServer::start(|_, _| ok(&format!(r#"{{"list": [{INSTANCE}]}}"#))).await;

    let pods = server.pool().list_pods().await.unwrap();
    assert_eq!(pods.len(), 1);
    let pod = &pods[0];
    assert_eq!(pod.id, "inst-42");
    assert_eq!(pod.pool_id, "xiangongyun");
    assert_eq!(pod.status, PodStatus::Running);
    assert_eq!(pod.gpu_model, GpuModel::Rtx4090D);
    assert_eq!(pod.ssh_port, Some(30022));
    assert_eq!(pod.image_id, "");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path, "/open/instances");
    assert_eq!(requests[0].authorization.as_deref(), Some("Bearer test-token"));
}

#[tokio::test]
async fn empty_list_is_no_pods() {
    let server = CannedServer::start(|_, _| ok("null")).await;
    assert!(server.pool().list_pods().await.unwrap().is_empty());
}

#[tokio::test]
async fn create_pod_deploys_then_fetches() {
    let server = CannedServer::start(|method, path| match (method, path) {
        ("POST", "/open/instance/deploy") => ok(r#"{"id": "inst-42"}"#),
        ("GET", "/open/instance/inst-42") => ok(&INSTANCE.replace("running", "deploying")),
        _ => (404, String::new()),
    })
    .await;

    let pod = server
        .pool()
        .create_pod(&PodOptions::new(GpuModel::Rtx4090D, 1))
        .await
        .unwrap();
    assert_eq!(pod.id, "inst-42");
    assert_eq!(pod.status, PodStatus::Creating);
    assert_eq!(pod.provider_status, "deploying");

    let requests = server.requests();
    let deploy = requests
        .iter()
        .find(|r| r.path == "/open/instance/deploy")
        .unwrap();
    let body: serde_json::Value = serde_json::from_str(&deploy.body).unwrap();
    assert_eq!(body["gpu_model"], "NVIDIA GeForce RTX 4090 D");
    assert_eq!(body["gpu_count"], 1);
    assert_eq!(body["data_center_id"], 1);
    assert_eq!(body["image_type"], "public");
    assert!(requests.iter().any(|r| r.path == "/open/instance/inst-42"));
}

#[tokio::test]
async fn create_pod_keeps_id_when_fetch_fails() {
    let server = CannedServer::start(|method, path| match (method, path) {
        ("POST", "/open/instance/deploy") => ok(r#"{"id": "inst-42"}"#),
        _ => (500, "backend down".to_string()),
    })
    .await;

    let pod = server
        .pool()
        .create_pod(&PodOptions::new(GpuModel::Rtx4090D, 2))
        .await
        .unwrap();
    assert_eq!(pod.id, "inst-42");
    assert_eq!(pod.pool_id, "xiangongyun");
    assert_eq!(pod.status, PodStatus::Creating);
    assert_eq!(pod.gpu_model, GpuModel::Rtx4090D);
    assert_eq!(pod.gpu_count, 2);
    assert!(pod.ssh_coordinates().is_none());
    assert!(server.requests().iter().any(|r| r.path == "/open/instance/inst-42"));
}

#[tokio::test]
async fn envelope_without_data_field_is_an_error() {
    let server = CannedServer::start(|_, _| (200, r#"{"code": 200, "msg": "ok"}"#.to_string())).await;

    let err = server.pool().get_pod("inst-42").await.unwrap_err();
    assert!(err.to_string().contains("no data"), "{err}");
}

#[tokio::test]
async fn unsupported_model_sends_nothing() {
    let server = CannedServer::start(|_, _| ok("{}")).await;

    let err = server
        .pool()
        .create_pod(&PodOptions::new(GpuModel::A100x80G, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedResource { .. }), "{err}");
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn destroy_posts_instance_id() {
    let server = CannedServer::start(|_, _| ok("null")).await;

    server.pool().destroy_pod("inst-42").await.unwrap();

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path, "/open/instance/shutdown_destroy");
    let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(body, serde_json::json!({"id": "inst-42"}));
}

#[tokio::test]
async fn application_error_code_fails() {
    let server = CannedServer::start(|_, _| {
        (200, r#"{"code": 401, "msg": "token expired", "data": null}"#.to_string())
    })
    .await;

    let err = server.pool().destroy_pod("inst-42").await.unwrap_err();
    assert!(
        matches!(err, Error::Provider(ProviderError::Api { code: 401, ref msg, .. }) if msg == "token expired"),
        "{err}"
    );
}

#[tokio::test]
async fn http_error_status_fails() {
    let server = CannedServer::start(|_, _| (503, "maintenance".to_string())).await;

    let err = server.pool().get_pod("inst-42").await.unwrap_err();
    assert!(
        matches!(err, Error::Provider(ProviderError::Status { status: 503, ref body, .. }) if body == "maintenance"),
        "{err}"
    );
}

#[tokio::test]
async fn malformed_body_fails_to_decode() {
    let server = CannedServer::start(|_, _| (200, "<html>".to_string())).await;

    let err = server.pool().get_pod("inst-42").await.unwrap_err();
    assert!(matches!(err, Error::Provider(ProviderError::Decode { .. })), "{err}");
}

#[tokio::test]
async fn missing_data_is_an_error() {
    let server = CannedServer::start(|_, _| ok("null")).await;

    let err = server.pool().get_pod("inst-42").await.unwrap_err();
    assert!(err.to_string().contains("no data"), "{err}");
}
