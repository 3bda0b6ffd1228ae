//! This module exports the non-blocking message-passing API used by the
//! boundary exchange, encapsulated by a `Transport` trait. Sends return a
//! `Request` right away; receives are polled with `try_recv` and never
//! block, so a task waiting on a neighbor simply reports that it is
//! incomplete. Messages are matched on `(source rank, tag)`.
//!
//! Two transports are included: `SerialTransport` for a single process, and
//! `ChannelTransport`, which connects a group of ranks running on threads of
//! one process through crossbeam channels.

mod channel;

pub use channel::{ChannelTransport, Envelope};

use crate::error::{Error, Result};




/// A message tag. Tags distinguish the messages exchanged between one pair
/// of ranks.
pub type Tag = u64;

/// Handle to an outstanding non-blocking send.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Request(pub(crate) u64);

/// Identifies the kind of data a boundary message carries, so that ghost
/// data and flux corrections of the same field never share a tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Ghost,
    FluxCorrection,
    Swarm,
}

const LID_SHIFT: u64 = 24;
const BUFID_SHIFT: u64 = 12;

/// Build the tag of a boundary message from the receiver's point of view:
/// the receiving block's local id, the receiver's buffer id for the
/// relation, and the field index with its channel. A sender builds the same
/// tag from the neighbor's local id and the neighbor's buffer id (its
/// `targetid`).
pub fn boundary_tag(lid: usize, bufid: usize, field: usize, channel: Channel) -> Tag {
    let phys = 3 * field as u64
        + match channel {
            Channel::Ghost => 0,
            Channel::FluxCorrection => 1,
            Channel::Swarm => 2,
        };
    debug_assert!(phys < 1 << BUFID_SHIFT, "too many fields for the tag layout");
    debug_assert!((bufid as u64) < 1 << (LID_SHIFT - BUFID_SHIFT), "buffer id out of range");
    ((lid as u64) << LID_SHIFT) | ((bufid as u64) << BUFID_SHIFT) | phys
}




/// Interface for a group of processes that exchange tagged arrays of `f64`
/// without blocking. Implementations can sit on any transport; the
/// requirement is that messages between one pair of ranks with one tag are
/// delivered in the order they were sent.
pub trait Transport: Send {
    /// Must be implemented to return the rank of this process.
    fn rank(&self) -> usize;

    /// Must be implemented to return the number of processes.
    fn size(&self) -> usize;

    /// Start sending `payload` to `dest`. Must return without waiting for a
    /// matching receive.
    fn isend(&mut self, dest: usize, tag: Tag, payload: &[f64]) -> Result<Request>;

    /// Return whether a send has completed, meaning its payload may be
    /// reused.
    fn test(&mut self, request: Request) -> Result<bool>;

    /// Block until a send has completed.
    fn wait(&mut self, request: Request) -> Result<()>;

    /// Return the length of the next message from `source` with `tag`, if
    /// one has arrived.
    fn iprobe(&mut self, source: usize, tag: Tag) -> Result<Option<usize>>;

    /// Take the next message from `source` with `tag`, if one has arrived.
    fn try_recv(&mut self, source: usize, tag: Tag) -> Result<Option<Vec<f64>>>;
}




/// The transport of a single process, which has no peers to talk to.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialTransport;

impl Transport for SerialTransport {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn isend(&mut self, dest: usize, _tag: Tag, _payload: &[f64]) -> Result<Request> {
        Err(Error::Transport(format!("serial transport cannot send to rank {}", dest)))
    }

    fn test(&mut self, _request: Request) -> Result<bool> {
        Ok(true)
    }

    fn wait(&mut self, _request: Request) -> Result<()> {
        Ok(())
    }

    fn iprobe(&mut self, source: usize, _tag: Tag) -> Result<Option<usize>> {
        Err(Error::Transport(format!("serial transport cannot receive from rank {}", source)))
    }

    fn try_recv(&mut self, source: usize, _tag: Tag) -> Result<Option<Vec<f64>>> {
        Err(Error::Transport(format!("serial transport cannot receive from rank {}", source)))
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn tags_separate_channels_and_buffers() {
        let a = boundary_tag(3, 17, 0, Channel::Ghost);
        let b = boundary_tag(3, 17, 0, Channel::FluxCorrection);
        let c = boundary_tag(3, 18, 0, Channel::Ghost);
        let d = boundary_tag(4, 17, 0, Channel::Ghost);
        let e = boundary_tag(3, 17, 1, Channel::Ghost);
        let tags = [a, b, c, d, e];
        for (n, x) in tags.iter().enumerate() {
            assert!(tags[n + 1..].iter().all(|y| y != x));
        }
    }

    #[test]
    fn serial_transport_refuses_remote_traffic() {
        let mut t = SerialTransport;
        assert!(t.isend(1, 0, &[1.0]).is_err());
        assert!(t.try_recv(1, 0).is_err());
    }
}
