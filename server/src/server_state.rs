use std::{collections::HashMap, sync::Arc};

use bus_tracker_data_management::DataManager;
use bus_tracker_lib::{
    session::{Role, SessionContext, TripSession},
    trip::VehicleId,
};
use tokio::sync::{Mutex, broadcast};

use crate::{
    configuration::Configuration,
    live::{LiveMessage, LiveTicker},
};

pub struct ServerState {
    // Channel used to send live updates to all connected clients.
    pub tx: broadcast::Sender<LiveMessage>,
    pub data_manager: DataManager,
    pub configuration: Configuration,
    // One session per vehicle. Holding the lock serializes actions on a trip.
    pub sessions: Mutex<HashMap<VehicleId, TripSession>>,
    tickers: Mutex<HashMap<VehicleId, LiveTicker>>,
}

impl ServerState {
    pub fn new(data_manager: DataManager, configuration: Configuration) -> Self {
        let (tx, _rx) = broadcast::channel(configuration.live_channel_capacity);
        Self {
            tx,
            data_manager,
            configuration,
            sessions: Mutex::new(HashMap::new()),
            tickers: Mutex::new(HashMap::new()),
        }
    }

    pub fn new_session(&self, vehicle_id: &str, role: Role) -> TripSession {
        TripSession::new(SessionContext::new(role, vehicle_id), self.configuration.motion_config())
    }

    /// Makes the vehicle's ticker match its session: one running ticker for
    /// the current trip while it is active, none otherwise.
    ///
    /// Must be called with the sessions lock held, so the decision and the
    /// session state it was made from cannot drift apart. Lock order is
    /// always sessions, then tickers.
    pub async fn sync_ticker(self: &Arc<Self>, vehicle_id: &str, session: &TripSession) {
        let mut tickers = self.tickers.lock().await;
        let trip = session.trip_number();

        if !session.state().is_active() {
            if let Some(ticker) = tickers.remove(vehicle_id) {
                tracing::debug!("Stopping live ticker for {vehicle_id}, trip {}", ticker.trip());
                ticker.stop();
            }
            return;
        }

        if tickers
            .get(vehicle_id)
            .is_some_and(|ticker| ticker.trip() == trip && !ticker.is_finished())
        {
            return;
        }
        let ticker = LiveTicker::start(Arc::downgrade(self), vehicle_id.to_string(), trip, self.configuration.position_tick);
        if let Some(previous) = tickers.insert(vehicle_id.to_string(), ticker) {
            previous.stop();
        }
    }

    pub async fn is_ticking(&self, vehicle_id: &str) -> bool {
        self.tickers
            .lock()
            .await
            .get(vehicle_id)
            .is_some_and(|ticker| !ticker.is_finished())
    }

    pub async fn stop_all_tickers(&self) {
        let mut tickers = self.tickers.lock().await;
        tracing::info!("Stopping {} live tickers", tickers.len());
        for (_, ticker) in tickers.drain() {
            ticker.stop();
        }
    }
}
