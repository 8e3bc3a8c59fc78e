//! Mapping protocol-id -> handler pair.

use crate::error::Error;
use crate::host::{BoxedStream, Host, StreamHandler};
use crate::types::PeerId;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// `client_wrapper` adapts a raw outbound stream into an opaque
/// application-defined client handle. Boxed as `dyn Any` since
/// each protocol's handle type is only known to its registrant.
pub type ClientWrapper = Arc<dyn Fn(BoxedStream) -> Box<dyn Any + Send> + Send + Sync>;

#[derive(Clone)]
pub struct ProtocolHandlerPair {
    pub server_handler: Arc<dyn StreamHandler>,
    pub client_wrapper: ClientWrapper,
}

pub struct ProtocolRegistry {
    protocols: Mutex<HashMap<String, ProtocolHandlerPair>>,
    host: Arc<dyn Host>,
}

impl ProtocolRegistry {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            protocols: Mutex::new(HashMap::new()),
            host,
        }
    }

    /// Installs the server handler with the transport and stores the pair.
    pub fn register(&self, id: impl Into<String>, pair: ProtocolHandlerPair) {
        let id = id.into();
        self.host.set_stream_handler(&id, pair.server_handler.clone());
        self.protocols.lock().insert(id, pair);
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.protocols.lock().contains_key(id)
    }

    /// Opens a new stream via the transport and returns `client_wrapper(stream)`.
    pub async fn open_stream(
        &self,
        id: &str,
        peer_id: PeerId,
    ) -> Result<Box<dyn Any + Send>, Error> {
        // Released before opening the stream.
        let wrapper = {
            let protocols = self.protocols.lock();
            protocols
                .get(id)
                .map(|pair| pair.client_wrapper.clone())
                .ok_or_else(|| Error::ProtocolNotFound(id.to_string()))?
        };
        let stream = self.host.new_stream(peer_id, id).await?;
        Ok(wrapper(stream))
    }
}
