//! Dialing the panel server.
//!
//! [`Connector`] is the seam between the manager and the network: the
//! production [`WsConnector`] opens a tokio-tungstenite client, tests plug in
//! an in-memory one.

use std::future::Future;
use std::pin::Pin;

use futures_util::{Sink, Stream, StreamExt};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, Request, header};
use tracing::debug;

use xpanel_protocol::constants::WS_MAX_MESSAGE_SIZE;

use crate::error::LiveError;
use crate::types::LiveConfig;

/// Outbound half of a session.
pub type FrameSink = Pin<Box<dyn Sink<tungstenite::Message, Error = tungstenite::Error> + Send>>;

/// Inbound half of a session.
pub type FrameStream =
    Pin<Box<dyn Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Send>>;

/// Future returned by [`Connector::connect`].
pub type ConnectFuture<'a> = Pin<Box<dyn Future<Output = Result<Transport, LiveError>> + Send + 'a>>;

/// An open session, split into its two directions.
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens transport sessions.
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, config: &'a LiveConfig) -> ConnectFuture<'a>;
}

/// Plain WebSocket connector.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect<'a>(&'a self, config: &'a LiveConfig) -> ConnectFuture<'a> {
        Box::pin(async move {
            let request = handshake_request(config)?;
            let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
            ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
            ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);

            let (ws_stream, response) =
                tokio_tungstenite::connect_async_with_config(request, Some(ws_config), false)
                    .await?;
            debug!(status = %response.status(), url = %config.url, "websocket handshake complete");

            let (write, read) = ws_stream.split();
            Ok(Transport {
                sink: Box::pin(write),
                stream: Box::pin(read),
            })
        })
    }
}

/// Builds the upgrade request, adding auth and client identification.
pub(crate) fn handshake_request(config: &LiveConfig) -> Result<Request<()>, LiveError> {
    let mut request = config.url.as_str().into_client_request()?;
    let headers = request.headers_mut();
    if let Some(token) = &config.token {
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))?,
        );
    }
    if let Some(name) = &config.client_name {
        headers.insert(header::USER_AGENT, HeaderValue::from_str(name)?);
    }
    Ok(request)
}
