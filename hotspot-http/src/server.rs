use axum::{
    extract::{ConnectInfo, State},
    response::{Html, Redirect},
    routing::{get, post},
    Form, Router,
};
use hotspot_core::session::format_duration;
use hotspot_core::{AuthRequest, CoreRequest, LogoffRequest, StatusRequest};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
    /// Some access points relay the client's hardware address with the
    /// login post; absent, the gateway resolves it itself.
    mac: Option<String>,
}

async fn portal() -> Html<&'static str> {
    Html(
        r#"
        <!doctype html>
        <html>
            <head>
                <title>Login</title>
            </head>
            <body>
                <h1>Login</h1>
                <form name="login" action="/login" method="post">
                    <label for="username">Username:</label><br>
                    <input type="text" id="username" name="username"><br>
                    <label for="password">Password:</label><br>
                    <input type="password" id="password" name="password"><br><br>
                    <input type="submit" value="Submit">
                </form>
            </body>
        </html>
        "#,
    )
}

fn client_v4(addr: SocketAddr) -> Option<Ipv4Addr> {
    match addr.ip() {
        IpAddr::V4(ip) => Some(ip),
        IpAddr::V6(_) => None,
    }
}

async fn login(
    State(tx): State<mpsc::Sender<CoreRequest>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Form(form): Form<LoginForm>,
) -> Html<&'static str> {
    info!("Login attempt from {} for user '{}'", addr.ip(), form.username);

    let Some(ip) = client_v4(addr) else {
        return Html("<h1>Login Failed</h1><p>IPv6 is not supported.</p>");
    };

    let (oneshot_tx, oneshot_rx) = oneshot::channel();
    let request = CoreRequest::Auth(AuthRequest {
        ip,
        username: form.username,
        password: form.password,
        mac_hint: form.mac,
        tx: oneshot_tx,
    });

    if tx.send(request).await.is_err() {
        warn!("Failed to send auth request to core loop");
        return Html("<h1>Login Failed</h1><p>Internal server error.</p>");
    }

    match tokio::time::timeout(tokio::time::Duration::from_secs(10), oneshot_rx).await {
        Ok(Ok(true)) => Html(
            r#"<h1>Success!</h1><p>You are now online.</p>
               <p><a href="/status">Session status</a></p>"#,
        ),
        Ok(Ok(false)) => Html("<h1>Login Failed</h1><p>Invalid credentials.</p>"),
        Ok(Err(_)) => Html("<h1>Login Failed</h1><p>Internal server error (channel closed).</p>"),
        Err(_) => Html("<h1>Login Failed</h1><p>Internal server error (timeout).</p>"),
    }
}

async fn logout(
    State(tx): State<mpsc::Sender<CoreRequest>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Redirect {
    if let Some(ip) = client_v4(addr) {
        info!("Logout request from {}", ip);
        let (oneshot_tx, oneshot_rx) = oneshot::channel();
        let request = CoreRequest::Logoff(LogoffRequest { ip, tx: oneshot_tx });
        if tx.send(request).await.is_ok() {
            // Whether a session existed or not, the user lands on the portal.
            let _ = tokio::time::timeout(tokio::time::Duration::from_secs(10), oneshot_rx).await;
        }
    }
    Redirect::to("/portal")
}

async fn status(
    State(tx): State<mpsc::Sender<CoreRequest>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Html<String>, Redirect> {
    let Some(ip) = client_v4(addr) else {
        return Err(Redirect::to("/portal"));
    };

    let (oneshot_tx, oneshot_rx) = oneshot::channel();
    let request = CoreRequest::Status(StatusRequest { ip, tx: oneshot_tx });
    if tx.send(request).await.is_err() {
        return Err(Redirect::to("/portal"));
    }

    match tokio::time::timeout(tokio::time::Duration::from_secs(10), oneshot_rx).await {
        Ok(Ok(Some(status))) => Ok(Html(format!(
            r#"
            <!doctype html>
            <html>
                <head>
                    <title>Session status</title>
                </head>
                <body>
                    <h1>Connected</h1>
                    <p>User: {}</p>
                    <p>Time online: {}</p>
                    <p>Time remaining: {}</p>
                    <form action="/logout" method="post">
                        <input type="submit" value="Log out">
                    </form>
                </body>
            </html>
            "#,
            status.username,
            format_duration(status.elapsed),
            format_duration(status.remaining),
        ))),
        // No valid session, whatever the internal reason: back to the portal.
        _ => Err(Redirect::to("/portal")),
    }
}

pub async fn run_server(
    listener: TcpListener,
    core_tx: mpsc::Sender<CoreRequest>,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = Router::new()
        .route("/", get(|| async { Redirect::to("/portal") }))
        .route("/portal", get(portal))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/status", get(status))
        .with_state(core_tx);

    info!("Portal listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
