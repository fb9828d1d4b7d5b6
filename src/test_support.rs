//! 테스트용 로컬 HTTP 서버
//!
//! 127.0.0.1 임의 포트에 바인딩되어 핸들러가 돌려주는 응답을 그대로 씁니다.
//! 요청 경로는 `hits`에 기록되어 재시도 횟수 검증에 사용됩니다.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// 테스트 응답
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    /// 응답 전 대기 시간 (타임아웃 재현용)
    pub delay: Duration,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn hang(delay: Duration) -> Self {
        Self {
            status: 200,
            body: String::new(),
            delay,
        }
    }
}

type Handler = Arc<dyn Fn(&str, &str) -> Reply + Send + Sync>;

/// 실행 중인 테스트 서버
pub struct TestServer {
    pub base_url: String,
    hits: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    /// (method, path) -> Reply 핸들러로 서버 시작
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&str, &str) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler: Handler = Arc::new(handler);
        let hits = Arc::new(Mutex::new(Vec::new()));

        let accept_hits = hits.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let handler = handler.clone();
                let hits = accept_hits.clone();

                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }

                    let header_end = buf
                        .windows(4)
                        .position(|w| w == b"\r\n\r\n")
                        .map(|p| p + 4)
                        .unwrap_or(buf.len());
                    let content_length = String::from_utf8_lossy(&buf[..header_end])
                        .lines()
                        .filter_map(|line| line.split_once(':'))
                        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);

                    // 본문을 다 읽지 않고 닫으면 RST가 나갈 수 있음
                    while buf.len() < header_end + content_length {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }

                    let request = String::from_utf8_lossy(&buf[..header_end]);
                    let mut first_line = request.lines().next().unwrap_or("").split_whitespace();
                    let method = first_line.next().unwrap_or("GET").to_string();
                    let path = first_line.next().unwrap_or("/").to_string();
                    hits.lock().unwrap().push(format!("{} {}", method, path));

                    let reply = handler(&method, &path);
                    if !reply.delay.is_zero() {
                        tokio::time::sleep(reply.delay).await;
                    }

                    let mut response = format!(
                        "HTTP/1.1 {} Test\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        reply.status,
                        reply.body.len()
                    );
                    if method != "HEAD" {
                        response.push_str(&reply.body);
                    }

                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            hits,
        }
    }

    /// 경로를 절대 URL로 변환
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// 특정 경로로 들어온 요청 수 (method 무관)
    pub fn hit_count(&self, path: &str) -> usize {
        self.hits
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.split_whitespace().nth(1) == Some(path))
            .count()
    }

    /// 특정 method + 경로 요청 수
    pub fn method_hits(&self, method: &str, path: &str) -> usize {
        let key = format!("{} {}", method, path);
        self.hits.lock().unwrap().iter().filter(|h| **h == key).count()
    }
}

/// 품질 기준(200자, 50단어)을 넉넉히 넘는 기사 HTML
pub fn article_html(title: &str, topic: &str) -> String {
    let paragraph = |n: usize| {
        format!(
            "<p>Paragraph {} about {} describes field reports, supply routes and the \
             statements published by regional officials during the last quarter.</p>",
            n, topic
        )
    };

    format!(
        "<!DOCTYPE html><html><head><title>{}</title></head><body>\
         <nav><a href=\"/login\">Sign in to your account for more</a></nav>\
         <article>{}{}{}</article>\
         <footer>Copyright notice and privacy policy links for the site</footer>\
         </body></html>",
        title,
        paragraph(1),
        paragraph(2),
        paragraph(3)
    )
}
