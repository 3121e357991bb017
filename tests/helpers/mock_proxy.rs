use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// What a proxy saw for one tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelRecord {
    pub target: String,
    /// `Proxy-Authorization` value (HTTP) or `user:pass` (SOCKS5).
    pub credentials: Option<String>,
}

type Records = Arc<Mutex<Vec<TunnelRecord>>>;

/// HTTP CONNECT proxy that relays bytes to the requested target.
pub struct MockConnectProxy {
    listener: TcpListener,
    port: u16,
    records: Records,
}

impl MockConnectProxy {
    pub async fn new() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self {
            listener,
            port,
            records: Records::default(),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn records(&self) -> Records {
        self.records.clone()
    }

    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Ok((stream, _)) = self.listener.accept().await {
                tokio::spawn(serve_connect(stream, self.records.clone()));
            }
        })
    }
}

async fn serve_connect(mut client: TcpStream, records: Records) {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match client.read(&mut byte).await {
            Ok(1) => head.push(byte[0]),
            _ => return,
        }
    }

    let text = String::from_utf8_lossy(&head).into_owned();
    let mut lines = text.split("\r\n");
    let target = match lines.next().map(|line| line.split(' ').collect::<Vec<_>>()) {
        Some(parts) if parts.len() == 3 && parts[0] == "CONNECT" => parts[1].to_string(),
        _ => {
            let _ = client
                .write_all(b"HTTP/1.1 405 Method Not Allowed\r\n\r\n")
                .await;
            return;
        }
    };
    let credentials = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("proxy-authorization"))
        .map(|(_, value)| value.trim().to_string());

    records.lock().unwrap().push(TunnelRecord {
        target: target.clone(),
        credentials,
    });

    let mut upstream = match TcpStream::connect(&target).await {
        Ok(upstream) => upstream,
        Err(_) => {
            let _ = client.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await;
            return;
        }
    };
    if client
        .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
        .await
        .is_err()
    {
        return;
    }
    let _ = tokio::io::copy_bidirectional(&mut client, &mut upstream).await;
}

/// SOCKS5 proxy supporting no-auth and username/password, CONNECT only.
pub struct MockSocksProxy {
    listener: TcpListener,
    port: u16,
    records: Records,
}

impl MockSocksProxy {
    pub async fn new() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self {
            listener,
            port,
            records: Records::default(),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn records(&self) -> Records {
        self.records.clone()
    }

    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Ok((stream, _)) = self.listener.accept().await {
                let records = self.records.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_socks(stream, records).await {
                        tracing::debug!("SOCKS5 session failed: {}", e);
                    }
                });
            }
        })
    }
}

async fn serve_socks(mut client: TcpStream, records: Records) -> std::io::Result<()> {
    let mut greeting = [0u8; 2];
    client.read_exact(&mut greeting).await?;
    let mut methods = vec![0u8; greeting[1] as usize];
    client.read_exact(&mut methods).await?;

    let mut credentials = None;
    if methods.contains(&0x02) {
        client.write_all(&[0x05, 0x02]).await?;
        let mut version = [0u8; 2];
        client.read_exact(&mut version).await?;
        let mut user = vec![0u8; version[1] as usize];
        client.read_exact(&mut user).await?;
        let mut pass_len = [0u8; 1];
        client.read_exact(&mut pass_len).await?;
        let mut pass = vec![0u8; pass_len[0] as usize];
        client.read_exact(&mut pass).await?;
        credentials = Some(format!(
            "{}:{}",
            String::from_utf8_lossy(&user),
            String::from_utf8_lossy(&pass)
        ));
        client.write_all(&[0x01, 0x00]).await?;
    } else {
        client.write_all(&[0x05, 0x00]).await?;
    }

    let mut request = [0u8; 4];
    client.read_exact(&mut request).await?;
    let host = match request[3] {
        0x01 => {
            let mut ip = [0u8; 4];
            client.read_exact(&mut ip).await?;
            std::net::Ipv4Addr::from(ip).to_string()
        }
        0x03 => {
            let mut len = [0u8; 1];
            client.read_exact(&mut len).await?;
            let mut name = vec![0u8; len[0] as usize];
            client.read_exact(&mut name).await?;
            String::from_utf8_lossy(&name).into_owned()
        }
        _ => {
            client.write_all(&[0x05, 0x08, 0x00, 0x01, 0, 0, 0, 0, 0, 0]).await?;
            return Ok(());
        }
    };
    let mut port = [0u8; 2];
    client.read_exact(&mut port).await?;
    let target = format!("{}:{}", host, u16::from_be_bytes(port));

    records.lock().unwrap().push(TunnelRecord {
        target: target.clone(),
        credentials,
    });

    let mut upstream = TcpStream::connect(&target).await?;
    client
        .write_all(&[0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0, 0])
        .await?;
    tokio::io::copy_bidirectional(&mut client, &mut upstream).await?;
    Ok(())
}
