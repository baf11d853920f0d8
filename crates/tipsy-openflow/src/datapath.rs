//! The send side of a switch connection.
//!
//! Encoding and the TCP session belong to the protocol adapter; the
//! controller only needs somewhere to put typed messages. [`ChannelDatapath`]
//! forwards them to the adapter task, [`MemoryDatapath`] keeps them for
//! inspection.

use crate::error::{OfpError, OfpResult};
use crate::flow::FlowMod;
use crate::message::OfpMessage;
use crate::types::DatapathId;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::trace;

/// A connected switch that accepts controller messages.
pub trait Datapath: Send + Sync + fmt::Debug {
    fn id(&self) -> DatapathId;

    fn send_msg(&self, msg: OfpMessage) -> OfpResult<()>;
}

/// Forwards messages to a protocol adapter over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelDatapath {
    id: DatapathId,
    tx: mpsc::UnboundedSender<OfpMessage>,
}

impl ChannelDatapath {
    pub fn new(id: DatapathId) -> (Self, mpsc::UnboundedReceiver<OfpMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }
}

impl Datapath for ChannelDatapath {
    fn id(&self) -> DatapathId {
        self.id
    }

    fn send_msg(&self, msg: OfpMessage) -> OfpResult<()> {
        trace!(dpid = %self.id, kind = msg.kind(), "send");
        self.tx
            .send(msg)
            .map_err(|_| OfpError::disconnected(self.id))
    }
}

/// Records every message in order. Cloning shares the record.
#[derive(Debug, Clone)]
pub struct MemoryDatapath {
    id: DatapathId,
    sent: Arc<Mutex<Vec<OfpMessage>>>,
}

impl MemoryDatapath {
    pub fn new(id: DatapathId) -> Self {
        Self {
            id,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<OfpMessage>> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn messages(&self) -> Vec<OfpMessage> {
        self.lock().clone()
    }

    /// Drains the record.
    pub fn take(&self) -> Vec<OfpMessage> {
        std::mem::take(&mut *self.lock())
    }

    pub fn flow_mods(&self) -> Vec<FlowMod> {
        self.lock()
            .iter()
            .filter_map(|m| m.as_flow_mod().cloned())
            .collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.lock().iter().filter(|m| m.kind() == kind).count()
    }
}

impl Datapath for MemoryDatapath {
    fn id(&self) -> DatapathId {
        self.id
    }

    fn send_msg(&self, msg: OfpMessage) -> OfpResult<()> {
        self.lock().push(msg);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowModCommand;
    use crate::types::TableId;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_channel_datapath_forwards() {
        let (dp, mut rx) = ChannelDatapath::new(DatapathId(7));
        dp.send_msg(OfpMessage::BarrierRequest).unwrap();
        assert_eq!(rx.recv().await, Some(OfpMessage::BarrierRequest));
    }

    #[test]
    fn test_channel_datapath_closed() {
        let (dp, rx) = ChannelDatapath::new(DatapathId(7));
        drop(rx);
        assert!(matches!(
            dp.send_msg(OfpMessage::DescStatsRequest),
            Err(OfpError::Disconnected { .. })
        ));
    }

    #[test]
    fn test_memory_datapath_records() {
        let dp = MemoryDatapath::new(DatapathId(1));
        let shared = dp.clone();
        dp.send_msg(OfpMessage::DescStatsRequest).unwrap();
        dp.send_msg(FlowMod::new(TableId(0), FlowModCommand::Add).into())
            .unwrap();
        assert_eq!(shared.count("flow_mod"), 1);
        assert_eq!(shared.flow_mods().len(), 1);
        assert_eq!(shared.take().len(), 2);
        assert!(dp.messages().is_empty());
    }
}
