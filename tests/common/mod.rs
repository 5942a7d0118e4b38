//! # 测试辅助函数
//!
//! 在随机端口上启动代理，上游指向 wiremock 服务器

#![allow(dead_code)]

use openai_auth_proxy::{
    auth::AuthorizationStore,
    proxy::{ForwardingEngine, ProxyState, ProxyTarget, UpstreamCredentials, serve},
};
use std::net::SocketAddr;
use std::sync::{Arc, Once};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

static INIT: Once = Once::new();

/// 初始化测试日志
pub fn init_test_env() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// 运行中的测试代理
pub struct TestProxy {
    pub addr: SocketAddr,
    pub store: Arc<AuthorizationStore>,
    pub target: Arc<ProxyTarget>,
    pub client: reqwest::Client,
}

impl TestProxy {
    /// 启动代理，上游为 `upstream`
    pub async fn start(upstream: &str, users: &[&str], token: Option<&str>, org: Option<&str>) -> Self {
        init_test_env();

        let store = Arc::new(AuthorizationStore::from_tokens(users.iter().copied()));
        let credentials =
            UpstreamCredentials::new(token.map(str::to_string), org.map(str::to_string));
        let target = Arc::new(ProxyTarget::new(upstream, credentials).unwrap());
        let forwarder = Arc::new(ForwardingEngine::new(Arc::clone(&target)).unwrap());
        let state = ProxyState::new(Arc::clone(&store), forwarder);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state, std::future::pending()));

        let client = reqwest::Client::builder()
            .no_proxy()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        Self {
            addr,
            store,
            target,
            client,
        }
    }

    /// 代理上的完整地址
    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{}", self.addr, path_and_query)
    }
}

/// 一个当前无人监听的本地地址
pub async fn unreachable_upstream() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// 读到空行为止，返回请求头部分（不含空行）
pub async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0_u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if stream.read(&mut byte).await.unwrap() == 0 {
            break;
        }
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap().trim_end().to_string()
}

/// 只接受一个连接的原始 TCP 上游：把收到的请求头交给调用方，再写回固定响应
pub async fn raw_upstream(response: &'static [u8]) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (head_tx, head_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let head = read_head(&mut stream).await;
        let _ = head_tx.send(head);
        stream.write_all(response).await.unwrap();
        stream.shutdown().await.ok();
    });

    (format!("http://{addr}"), head_rx)
}

/// 通过原始 TCP 向代理发送请求，读到连接关闭为止
pub async fn raw_request(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

/// 请求头部分中的头部名（小写、排序）
pub fn header_names(head: &str) -> Vec<String> {
    let mut names: Vec<String> = head
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .map(|(name, _)| name.trim().to_ascii_lowercase())
        .collect();
    names.sort();
    names
}
