//! The HTTP device client against a minimal gateway on a random port.
//!
//! The gateway issues session tokens on `POST /auth/session`, revokes them on
//! `DELETE /auth/session`, and answers `GET /activities` only for live tokens.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use stride_skills::{DeviceClient, DeviceConfig, HttpDeviceClient};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Default)]
struct Gateway {
    live: HashSet<String>,
    logins: usize,
    logouts: usize,
}

async fn start_gateway() -> (String, Arc<Mutex<Gateway>>) {
    let state = Arc::new(Mutex::new(Gateway::default()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shared = state.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let state = shared.clone();
            tokio::spawn(async move { serve(stream, state).await });
        }
    });

    (format!("http://{addr}/api"), state)
}

async fn serve(mut stream: TcpStream, state: Arc<Mutex<Gateway>>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    let request = String::from_utf8_lossy(&buf).to_string();
    let request_line = request.lines().next().unwrap_or_default().to_string();
    let bearer = request
        .lines()
        .find_map(|l| {
            let (name, value) = l.split_once(':')?;
            name.eq_ignore_ascii_case("authorization")
                .then(|| value.trim().trim_start_matches("Bearer ").to_string())
        })
        .unwrap_or_default();

    let (status, body) = {
        let mut gateway = state.lock();
        if request_line.starts_with("POST /api/auth/session") {
            gateway.logins += 1;
            let token = format!("session-{}", gateway.logins);
            gateway.live.insert(token.clone());
            ("200 OK", format!("{{\"session_token\": \"{token}\"}}"))
        } else if request_line.starts_with("DELETE /api/auth/session") {
            gateway.logouts += 1;
            gateway.live.remove(&bearer);
            ("200 OK", "{}".to_string())
        } else if gateway.live.contains(&bearer) {
            ("200 OK", "[]".to_string())
        } else {
            ("401 Unauthorized", "{\"error\": \"session expired\"}".to_string())
        }
    };

    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn client(base_url: String) -> HttpDeviceClient {
    HttpDeviceClient::new(&DeviceConfig {
        provider: "garmin".into(),
        base_url,
        token: Some("api-token".into()),
    })
    .unwrap()
}

// ============================================================================
// Shared session
// ============================================================================

#[tokio::test]
async fn test_one_callers_disconnect_keeps_the_others_session() {
    let (url, gateway) = start_gateway().await;
    let device = client(url);

    device.connect().await.unwrap(); // morning health sync
    device.connect().await.unwrap(); // post-activity sync
    device.disconnect().await.unwrap(); // health sync finishes first

    let activities = device.recent_activities(20).await;
    assert!(activities.is_ok(), "{activities:?}");

    device.disconnect().await.unwrap();
    {
        let gateway = gateway.lock();
        assert_eq!(gateway.logins, 1);
        assert_eq!(gateway.logouts, 1);
        assert!(gateway.live.is_empty());
    }

    let err = device.recent_activities(20).await.unwrap_err();
    assert!(err.to_string().contains("not connected"));
}

#[tokio::test]
async fn test_concurrent_callers_share_one_login() {
    let (url, gateway) = start_gateway().await;
    let device = Arc::new(client(url));

    let run = |device: Arc<HttpDeviceClient>| async move {
        device.connect().await.unwrap();
        let listed = device.recent_activities(5).await;
        device.disconnect().await.unwrap();
        listed
    };
    let (a, b, c) = tokio::join!(
        run(device.clone()),
        run(device.clone()),
        run(device.clone())
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok(), "{a:?} {b:?} {c:?}");

    let gateway = gateway.lock();
    assert_eq!(gateway.logins, gateway.logouts);
    assert!(gateway.live.is_empty());
}

#[tokio::test]
async fn test_reconnect_after_last_disconnect_logs_in_again() {
    let (url, gateway) = start_gateway().await;
    let device = client(url);

    device.connect().await.unwrap();
    device.disconnect().await.unwrap();
    device.connect().await.unwrap();
    assert!(device.recent_activities(1).await.is_ok());
    device.disconnect().await.unwrap();

    let gateway = gateway.lock();
    assert_eq!(gateway.logins, 2);
    assert_eq!(gateway.logouts, 2);
}
