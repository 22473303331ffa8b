use hotspot_core::{CoreRequest, SessionStatus};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Stand-in for the daemon's core loop: rejects every login and reports a
/// session only for IPs the test registered.
async fn fake_core_loop(mut rx: mpsc::Receiver<CoreRequest>, known_user: Option<String>) {
    while let Some(request) = rx.recv().await {
        match request {
            CoreRequest::Auth(req) => {
                req.tx.send(false).ok();
            }
            CoreRequest::Logoff(req) => {
                req.tx.send(false).ok();
            }
            CoreRequest::Status(req) => {
                let status = known_user.clone().map(|username| SessionStatus {
                    ip: req.ip,
                    username,
                    mac: "AA:BB:CC:DD:EE:01".to_string(),
                    elapsed: 65,
                    remaining: 3535,
                });
                req.tx.send(status).ok();
            }
        }
    }
}

async fn spawn_app(known_user: Option<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().unwrap();
    let address = format!("http://{}", addr);

    let (core_tx, core_rx) = mpsc::channel(100);
    tokio::spawn(fake_core_loop(core_rx, known_user));
    tokio::spawn(async move {
        hotspot_http::server::run_server(listener, core_tx).await.ok();
    });

    address
}

#[tokio::test]
async fn portal_returns_login_form() {
    // Arrange
    let app_address = spawn_app(None).await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(&format!("{}/portal", &app_address))
        .send()
        .await
        .expect("Failed to execute request.");

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let html = response.text().await.unwrap();
    assert!(html.contains("<form name=\"login\""));
    assert!(html.contains("Login"));
}

#[tokio::test]
async fn unauthenticated_status_redirects_to_portal() {
    // Arrange
    let app_address = spawn_app(None).await;
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    // Act
    let response = client
        .get(&format!("{}/status", &app_address))
        .send()
        .await
        .expect("Failed to execute request.");

    // Assert
    assert_eq!(response.status().as_u16(), 303);
    assert_eq!(response.headers().get("Location").unwrap(), "/portal");
}

#[tokio::test]
async fn authenticated_status_shows_session() {
    // Arrange
    let app_address = spawn_app(Some("alice".to_string())).await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(&format!("{}/status", &app_address))
        .send()
        .await
        .expect("Failed to execute request.");

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let html = response.text().await.unwrap();
    assert!(html.contains("alice"));
    assert!(html.contains("1m 5s"));
    assert!(html.contains("58m"));
}

#[tokio::test]
async fn rejected_login_reports_failure() {
    // Arrange
    let app_address = spawn_app(None).await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .post(&format!("{}/login", &app_address))
        .form(&[("username", "mallory"), ("password", "guess")])
        .send()
        .await
        .expect("Failed to execute request.");

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let html = response.text().await.unwrap();
    assert!(html.contains("Login Failed"));
}
