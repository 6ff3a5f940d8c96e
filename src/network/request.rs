use crate::error::Result;
use crate::utils::current_timestamp;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// A pending request to mine `payload`, arbitrated across peers by
/// `submitted_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningRequest {
    payload: String,
    origin_id: String,
    submitted_at: i64,
    /// Height of the submitter's tail at submission
    tip_height: Option<u64>,
}

impl MiningRequest {
    pub fn new(payload: &str, origin_id: &str, submitted_at: i64) -> MiningRequest {
        MiningRequest {
            payload: payload.to_string(),
            origin_id: origin_id.to_string(),
            submitted_at,
            tip_height: None,
        }
    }

    pub fn on_tip(mut self, tip_height: Option<u64>) -> MiningRequest {
        self.tip_height = tip_height;
        self
    }

    /// A request stamped with the current time
    pub fn now(payload: &str, origin_id: &str) -> Result<MiningRequest> {
        Ok(Self::new(payload, origin_id, current_timestamp()?))
    }

    pub fn get_payload(&self) -> &str {
        &self.payload
    }

    pub fn get_origin_id(&self) -> &str {
        &self.origin_id
    }

    pub fn get_submitted_at(&self) -> i64 {
        self.submitted_at
    }

    pub fn get_tip_height(&self) -> Option<u64> {
        self.tip_height
    }

    /// Whether a chain at `height` has grown past the tail this request was
    /// submitted on
    pub fn is_behind(&self, height: Option<u64>) -> bool {
        matches!((self.tip_height, height), (Some(tip), Some(height)) if height > tip)
    }

    /// Requests without payload or origin are never mined
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty() || self.origin_id.is_empty()
    }
}

/// A request as it arrived on a node's channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub request: MiningRequest,
    /// Peer whose channel it was forwarded from; `None` for local submissions
    pub via: Option<String>,
}

struct ChannelState {
    latest: Option<MiningRequest>,
    subscribers: Vec<mpsc::UnboundedSender<Delivery>>,
}

/// A node's own mining-request channel.
///
/// Holds the most recently accepted request and delivers every later one to
/// each subscriber in publish order. Subscribers do not get the current value
/// replayed.
pub struct RequestChannel {
    inner: Mutex<ChannelState>,
}

impl Default for RequestChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestChannel {
    pub fn new() -> RequestChannel {
        RequestChannel {
            inner: Mutex::new(ChannelState {
                latest: None,
                subscribers: vec![],
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn publish(&self, request: MiningRequest) {
        let mut state = self.lock();
        Self::fan_out(&mut state, request, None);
    }

    /// Accept a request seen on peer `via`'s channel.
    ///
    /// Only requests that did not originate at `receiver_id` and are strictly
    /// newer than the last accepted one get through. Returns whether the
    /// request was published.
    pub fn publish_if_newer(&self, request: MiningRequest, receiver_id: &str, via: &str) -> bool {
        let mut state = self.lock();
        let last = state.latest.as_ref().map_or(0, MiningRequest::get_submitted_at);
        if request.get_origin_id() == receiver_id || request.get_submitted_at() <= last {
            return false;
        }
        Self::fan_out(&mut state, request, Some(via.to_string()));
        true
    }

    fn fan_out(state: &mut ChannelState, request: MiningRequest, via: Option<String>) {
        let delivery = Delivery {
            request: request.clone(),
            via,
        };
        state
            .subscribers
            .retain(|subscriber| subscriber.send(delivery.clone()).is_ok());
        state.latest = Some(request);
    }

    pub fn latest(&self) -> Option<MiningRequest> {
        self.lock().latest.clone()
    }

    pub fn subscribe(&self) -> RequestFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(tx);
        RequestFeed { rx }
    }

    /// End every subscriber's feed
    pub fn close(&self) {
        self.lock().subscribers.clear();
    }
}

pub struct RequestFeed {
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl RequestFeed {
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }
}
