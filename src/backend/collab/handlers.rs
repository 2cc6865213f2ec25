/**
 * Collaboration Upgrade Handler
 *
 * `GET {COLLAB_PATH}/{document_name}` upgrades to a websocket carrying
 * binary y-sync frames.
 *
 * # Admission
 *
 * Everything that can reject a connection happens before the upgrade:
 * document name parsing (404), authentication (401/403/404) and hydration
 * (400/422/500). A rejected attempt answers with the usual JSON error body
 * and never touches the socket.
 *
 * # Token
 *
 * Browsers cannot set headers on websocket requests, so the token is also
 * accepted as `?token=`. The `Authorization: Bearer` header wins when both
 * are present.
 */

use axum::{
    body::Bytes,
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::backend::auth::{bearer_token, AuthenticationGuard};
use crate::backend::collab::gateway::{CollabGateway, PeerSession};
use crate::backend::error::CollabError;
use crate::shared::DocumentName;

/// Query string of an upgrade request
#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

/// Authenticate, admit and upgrade a collaboration connection
pub async fn handle_collab_upgrade(
    State(guard): State<AuthenticationGuard>,
    State(gateway): State<CollabGateway>,
    Path(document_name): Path<String>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, CollabError> {
    let document_name = DocumentName::parse(&document_name).map_err(|e| {
        tracing::debug!("[Collab] Rejecting unknown document name '{}': {}", document_name, e);
        CollabError::not_found(format!("Unknown document '{}'", document_name))
    })?;

    let token = bearer_token(&headers)
        .map(str::to_string)
        .or(query.token)
        .ok_or_else(|| CollabError::unauthorized("Missing collaboration token"))?;

    let auth = guard.authenticate(&document_name, &token).await?;
    let session = gateway.admit(&document_name, auth).await?;

    let peer_id = session.peer_id();
    let failed_gateway = gateway.clone();
    let failed_name = document_name.clone();

    Ok(ws
        .on_failed_upgrade(move |e| {
            tracing::warn!("[Collab] Upgrade failed for {}: {}", failed_name, e);
            tokio::spawn(async move { failed_gateway.release_peer(&failed_name, peer_id).await });
        })
        .on_upgrade(move |socket| serve_peer(socket, session)))
}

/// Pump frames between one socket and its session until either side ends
async fn serve_peer(socket: WebSocket, mut session: PeerSession) {
    let (mut sender, mut receiver) = socket.split();

    let greeting = session.greeting().await;
    if sender.send(WsMessage::Binary(Bytes::from(greeting))).await.is_err() {
        session.release().await;
        return;
    }

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(WsMessage::Binary(frame))) => match session.handle_message(&frame).await {
                    Ok(replies) => {
                        let mut delivered = true;
                        for reply in replies {
                            if sender.send(WsMessage::Binary(Bytes::from(reply))).await.is_err() {
                                delivered = false;
                                break;
                            }
                        }
                        if !delivered {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            "[Collab] Closing peer {} on {}: {}",
                            session.peer_id(),
                            session.document_name(),
                            e
                        );
                        break;
                    }
                },
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("[Collab] Socket error for peer {}: {}", session.peer_id(), e);
                    break;
                }
            },
            outbound = session.next_outbound() => match outbound {
                Some(frame) => {
                    if sender.send(WsMessage::Binary(Bytes::from(frame))).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    let _ = sender.close().await;
    session.release().await;
}
