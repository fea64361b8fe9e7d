use crate::agent::{ Advisor, ChatSession, SendOutcome };
use crate::cli::Args;
use crate::models::websocket::{ ClientMessage, ServerMessage };
use super::load_tls_config;

use std::collections::HashMap;
use std::error::Error;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::io::{ AsyncRead, AsyncWrite };

use tokio_tungstenite::{ accept_hdr_async, WebSocketStream };
use tokio_tungstenite::tungstenite::handshake::server::{ Request, Response, ErrorResponse };
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_rustls::TlsAcceptor;

use lazy_static::lazy_static;
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };

use hmac::{ Hmac, Mac };
use sha2::Sha256;
use chrono::Utc;
use url::form_urlencoded;

use log::{ info, warn, error, debug };
use futures::{ SinkExt, StreamExt };
use tokio::sync::mpsc::{ self, UnboundedSender };

type HmacSha256 = Hmac<Sha256>;

const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
const MAX_CLOCK_SKEW_SECS: u64 = 300;

lazy_static! {
    static ref CONNECTION_LIMITER: RateLimiter<NotKeyed, InMemoryState, DefaultClock> =
        RateLimiter::direct(Quota::per_second(NonZeroU32::new(10).unwrap_or(NonZeroU32::MIN)));
}

/// Hex HMAC-SHA256 of `ts` keyed with `secret`.
pub fn sign_timestamp(secret: &str, ts: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(ts.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Checks the `ts`/`sig` handshake parameters. `Err` carries the reason sent
/// back with the 401.
pub fn verify_signature(
    secret: &str,
    params: &HashMap<String, String>,
    now: i64
) -> Result<(), &'static str> {
    let (Some(ts), Some(sig)) = (params.get("ts"), params.get("sig")) else {
        return Err("missing ts/sig");
    };

    let ts_i: i64 = ts.parse().map_err(|_| "bad timestamp")?;
    if now.abs_diff(ts_i) > MAX_CLOCK_SKEW_SECS {
        return Err("timestamp out of range");
    }

    let sig_bytes = hex::decode(sig).map_err(|_| "bad signature")?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "bad signature")?;
    mac.update(ts.as_bytes());
    mac.verify_slice(&sig_bytes).map_err(|_| "bad signature")
}

fn unauthorized(reason: &str) -> ErrorResponse {
    let mut res = ErrorResponse::new(Some(reason.to_string()));
    *res.status_mut() = StatusCode::UNAUTHORIZED;
    res
}

fn tls_acceptor(args: &Args) -> Result<Option<TlsAcceptor>, Box<dyn Error + Send + Sync>> {
    if !args.enable_tls {
        info!("TLS disabled; chat clients connect over plain ws://");
        return Ok(None);
    }
    let (Some(cert_path), Some(key_path)) = (&args.tls_cert_path, &args.tls_key_path) else {
        error!("--enable-tls needs both --tls-cert-path and --tls-key-path");
        return Err("TLS enabled without certificate and key".into());
    };
    info!("Chat TLS certificate '{}', key '{}'", cert_path, key_path);
    Ok(Some(TlsAcceptor::from(load_tls_config(cert_path, key_path)?)))
}

pub async fn start_ws_server(
    addr: &str,
    advisor: Arc<Advisor>,
    api_key: Option<String>,
    args: Args
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let acceptor = tls_acceptor(&args)?;
    let listener = TcpListener::bind(addr).await?;
    let scheme = if acceptor.is_some() { "wss" } else { "ws" };
    info!("Chat server listening on {}://{}", scheme, addr);

    loop {
        let (stream, peer) = listener.accept().await?;

        if CONNECTION_LIMITER.check().is_err() {
            warn!("Connection rate limit hit; dropping {}", peer);
            continue;
        }

        debug!("Chat client connecting from {}", peer);
        let advisor = Arc::clone(&advisor);
        let api_key = api_key.clone();
        let acceptor = acceptor.clone();

        tokio::spawn(async move {
            let result = match acceptor {
                Some(acceptor) =>
                    match acceptor.accept(stream).await {
                        Ok(tls_stream) => process_connection(peer, tls_stream, advisor, api_key).await,
                        Err(e) => Err(e.into()),
                    }
                None => process_connection(peer, stream, advisor, api_key).await,
            };

            if let Err(e) = result {
                error!("Chat connection from {} failed: {}", peer, e);
            }
        });
    }
}

async fn process_connection<S>(
    peer: SocketAddr,
    stream: S,
    advisor: Arc<Advisor>,
    required_api_key: Option<String>
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    let mut email: Option<String> = None;

    let auth_callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let qs = req.uri().query().unwrap_or("");
        let params: HashMap<String, String> = form_urlencoded
            ::parse(qs.as_bytes())
            .into_owned()
            .collect();

        email = params
            .get("email")
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());

        let secret = match &required_api_key {
            Some(k) if !k.is_empty() => k,
            _ => {
                return Ok(response);
            }
        };

        match verify_signature(secret, &params, Utc::now().timestamp()) {
            Ok(()) => {
                info!("{} authenticated", peer);
                Ok(response)
            }
            Err(reason) => {
                warn!("{}: rejected handshake ({})", peer, reason);
                Err(unauthorized(reason))
            }
        }
    };

    match accept_hdr_async(stream, auth_callback).await {
        Ok(ws) => {
            let session = Arc::new(advisor.session_for(email.as_deref()).await);
            handle_connection(peer, ws, session).await;
            Ok(())
        }
        Err(e) => {
            error!("Handshake failed for {}: {}", peer, e);
            Err(Box::new(e) as _)
        }
    }
}

fn push(out: &UnboundedSender<Message>, frame: &ServerMessage) {
    match serde_json::to_string(frame) {
        Ok(json) => {
            let _ = out.send(Message::Text(json));
        }
        Err(e) => error!("Failed to encode {:?}: {}", frame, e),
    }
}

fn outcome_frame(outcome: SendOutcome) -> Option<ServerMessage> {
    match outcome {
        SendOutcome::Replied { topic, message } =>
            Some(ServerMessage::Response {
                content: message.content,
                follow_up: message.follow_up,
                agent: message.agent,
                topic: topic.to_string(),
                timestamp: message.timestamp,
            }),
        SendOutcome::Ignored =>
            Some(ServerMessage::Error {
                message: "Message is empty".to_string(),
            }),
        SendOutcome::Rejected =>
            Some(ServerMessage::Error {
                message: "Still answering the previous message".to_string(),
            }),
        SendOutcome::Cancelled => None,
    }
}

/// Drives one chat socket. Each `chat` frame is answered on its own task, so a
/// `clear` or another `chat` is read while a reply is still typing; frames from
/// all tasks go out through a single writer.
pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    session: Arc<ChatSession>
)
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    info!("New WebSocket connection: {} (session {})", peer, session.id());
    let (mut sink, mut stream) = websocket.split();
    let (out, mut outbox) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            if let Err(e) = sink.send(message).await {
                error!("Error sending message to {}: {}", peer, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(msg) = stream.next().await {
        let message = match msg {
            Ok(message) => message,
            Err(e) => {
                match e {
                    | tokio_tungstenite::tungstenite::Error::ConnectionClosed
                    | tokio_tungstenite::tungstenite::Error::Protocol(_)
                    | tokio_tungstenite::tungstenite::Error::Utf8 => {
                        info!("WebSocket connection closed or protocol error for {}: {}", peer, e);
                    }
                    tokio_tungstenite::tungstenite::Error::Io(ref io_err) if
                        io_err.kind() == std::io::ErrorKind::ConnectionReset
                    => {
                        info!("WebSocket connection reset by peer {}", peer);
                    }
                    _ => {
                        error!("Error receiving message from {}: {}", peer, e);
                    }
                }
                break;
            }
        };

        if message.len() > MAX_MESSAGE_SIZE {
            warn!(
                "Message from {} exceeds size limit ({} > {})",
                peer,
                message.len(),
                MAX_MESSAGE_SIZE
            );
            push(&out, &ServerMessage::Error { message: "Message too large".to_string() });
            break;
        }

        match message {
            Message::Text(text) =>
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Chat { content }) => {
                        push(&out, &ServerMessage::Processing);
                        let session = Arc::clone(&session);
                        let out = out.clone();
                        tokio::spawn(async move {
                            if let Some(frame) = outcome_frame(session.send(&content).await) {
                                push(&out, &frame);
                            }
                        });
                    }
                    Ok(ClientMessage::Clear) => {
                        session.clear();
                        push(&out, &ServerMessage::Cleared);
                    }
                    Err(e) => {
                        warn!("Failed to parse message from {}: {}", peer, e);
                        push(&out, &ServerMessage::Error {
                            message: format!("Failed to parse message: {}", e),
                        });
                    }
                }
            Message::Close(_) => {
                info!("Received close frame from {}", peer);
                break;
            }
            Message::Ping(ping_data) => {
                let _ = out.send(Message::Pong(ping_data));
            }
            Message::Pong(_) | Message::Frame(_) => {}
            Message::Binary(_) => {
                warn!("Ignoring binary message from {}", peer);
            }
        }
    }

    // The writer stops once every in-flight reply has dropped its sender.
    drop(out);
    if let Err(e) = writer.await {
        error!("Writer for {} stopped abnormally: {}", peer, e);
    }
    debug!("Session {} ended with {} messages", session.id(), session.messages().len());
    info!("WebSocket connection closed for {}", peer);
}
