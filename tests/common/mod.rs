// Minimal stand-in for the country service: one canned answer per path.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

#[derive(Clone)]
pub enum Reply {
    Json(u16, String),
    /// Accept the connection and never answer.
    Hang,
}

pub struct FakeCountries {
    pub base_url: String,
    /// Request targets (`/path?query`) in arrival order.
    pub requests: Arc<Mutex<Vec<String>>>,
}

pub fn country_json(ccn3: &str, common: &str, capital: &str) -> String {
    format!(
        r#"{{"flags":{{"png":"https://flagcdn.com/w320/{ccn3}.png","svg":"https://flagcdn.com/{ccn3}.svg","alt":"Flag of {common}"}},
            "name":{{"common":"{common}","official":"Republic of {common}","nativeName":{{"xx":{{"official":"x","common":"y"}}}}}},
            "ccn3":"{ccn3}","capital":["{capital}"],"languages":{{"eng":"English"}},"area":100.5,"population":42}}"#
    )
}

pub async fn serve(routes: HashMap<String, Reply>) -> FakeCountries {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let routes = Arc::new(routes);

    let seen = requests.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let routes = routes.clone();
            let seen = seen.clone();
            tokio::spawn(async move { handle(stream, &routes, &seen).await });
        }
    });

    FakeCountries {
        base_url: format!("http://{}/v3.1/alpha", addr),
        requests,
    }
}

async fn handle(
    mut stream: TcpStream,
    routes: &HashMap<String, Reply>,
    seen: &Mutex<Vec<String>>,
) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    let head = String::from_utf8_lossy(&buf);
    let target = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let path = target.split('?').next().unwrap_or("/").to_string();
    seen.lock().unwrap().push(target);

    let reply = routes
        .get(&path)
        .cloned()
        .unwrap_or_else(|| Reply::Json(404, r#"{"status":404,"message":"Not Found"}"#.into()));
    match reply {
        Reply::Hang => {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Reply::Json(status, body) => {
            let response = format!(
                "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    }
}

/// A base URL nothing listens on.
pub async fn dead_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/v3.1/alpha", addr)
}
