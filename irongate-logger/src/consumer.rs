/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Consumer callbacks and configuration for the message logger.

use irongate_transport::stream::FrameHeader;

/// Receives ordered FIX tag=value messages from the logger.
pub trait FixMessageConsumer {
    /// Called once per released message, in timestamp order.
    fn on_message(&mut self, header: &FrameHeader, payload: &[u8]);
}

/// Receives ordered binary FIXP/iLink messages from the logger.
pub trait IlinkMessageConsumer {
    /// Called once per released message, in timestamp order.
    fn on_message(&mut self, header: &FrameHeader, payload: &[u8]);
}

/// Configuration for a [`crate::FixMessageLogger`].
#[derive(Debug, Clone, Copy)]
pub struct LoggerConfiguration {
    /// Once the live byte-range of the reordering buffer exceeds this after
    /// a drain, remaining records are relocated to the buffer head.
    pub compaction_size: usize,
    /// Maximum frames read from each input stream per duty cycle.
    pub poll_fragment_limit: usize,
}

impl Default for LoggerConfiguration {
    fn default() -> Self {
        Self {
            compaction_size: 64 * 1024,
            poll_fragment_limit: 32,
        }
    }
}

impl LoggerConfiguration {
    /// Sets the compaction size in bytes.
    #[must_use]
    pub const fn with_compaction_size(mut self, compaction_size: usize) -> Self {
        self.compaction_size = compaction_size;
        self
    }
}
