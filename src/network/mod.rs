//! In-process peer network
//!
//! Nodes talk only through each other's feeds: a node listens to a peer by
//! subscribing to its mining-request channel and its chain log, and every
//! effect lands on the listener's own state.

pub mod connection;
pub mod node;
pub mod observer;
pub mod request;

pub use connection::{ChainFollower, Connection};
pub use node::{random_node_id, Node};
pub use observer::{EventLog, LogObserver, NodeEvent, NodeObserver};
pub use request::{Delivery, MiningRequest, RequestChannel, RequestFeed};
