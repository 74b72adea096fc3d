use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use bus_tracker_lib::{motion::LiveUpdate, trip::VehicleId};
use futures::{SinkExt, StreamExt};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

use crate::{api::ApiError, server_state::ServerState};

#[derive(Debug, Clone)]
pub struct LiveMessage {
    pub vehicle_id: VehicleId,
    pub update: LiveUpdate,
}

/// Periodic driver of one vehicle's simulated motion during one trip.
///
/// The task ends by itself once its trip is no longer the active one, and is
/// aborted when the ticker is stopped or dropped. A marker parked at the end
/// of its path is published once, then left alone until the trip ends.
pub struct LiveTicker {
    handle: JoinHandle<()>,
    trip: u64,
}

impl LiveTicker {
    pub fn start(state: Weak<ServerState>, vehicle_id: VehicleId, trip: u64, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::debug!("Live ticker for {vehicle_id} trip {trip} started");

            loop {
                interval.tick().await;
                let Some(state) = state.upgrade() else {
                    break;
                };

                let update = {
                    let mut sessions = state.sessions.lock().await;
                    match sessions.get_mut(&vehicle_id) {
                        Some(session) if session.trip_number() == trip => {
                            if session.state().is_active() && session.motion_finished() {
                                continue;
                            }
                            session.tick(Instant::now().into_std())
                        }
                        _ => None,
                    }
                };
                let Some(update) = update else {
                    break;
                };

                // No subscribers is fine, nobody is watching the map.
                let _ = state.tx.send(LiveMessage {
                    vehicle_id: vehicle_id.clone(),
                    update,
                });
            }

            tracing::debug!("Live ticker for {vehicle_id} trip {trip} finished");
        });

        Self { handle, trip }
    }

    /// The trip number this ticker drives.
    pub fn trip(&self) -> u64 {
        self.trip
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for LiveTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub async fn live_socket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
    Path(bus_id): Path<String>,
) -> Result<Response, ApiError> {
    state.data_manager.buses().get(&bus_id).await?;
    Ok(ws.on_upgrade(move |socket| stream_updates(socket, state, bus_id)))
}

async fn stream_updates(socket: WebSocket, state: Arc<ServerState>, vehicle_id: VehicleId) {
    tracing::info!("Live map opened for {vehicle_id}");
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.tx.subscribe();
    drop(state);

    let watched = vehicle_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = next_for_vehicle(&mut rx, &watched).await {
            let Ok(json) = serde_json::to_string(&message.update) else {
                continue;
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::info!("Live map closed for {vehicle_id}");
}

/// Waits for the next update of `vehicle_id`, skipping every other vehicle.
/// Returns `None` once the channel is closed.
pub async fn next_for_vehicle(rx: &mut broadcast::Receiver<LiveMessage>, vehicle_id: &str) -> Option<LiveMessage> {
    loop {
        match rx.recv().await {
            Ok(message) if message.vehicle_id == vehicle_id => return Some(message),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => tracing::debug!("Live map for {vehicle_id} skipped {skipped} updates"),
            Err(RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn feed_ends_with_the_channel() {
        let (tx, mut rx) = broadcast::channel::<LiveMessage>(4);
        drop(tx);
        assert!(next_for_vehicle(&mut rx, "b1").await.is_none());
    }
}
