use std::collections::{HashMap, VecDeque};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use super::{Request, Tag, Transport};




/// A tagged message on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub source: usize,
    pub tag: Tag,
    pub payload: Vec<f64>,
}




/// A transport between ranks that live on threads of one process. Each rank
/// owns one inbound channel; envelopes are encoded with MessagePack so the
/// bytes on the channel are exactly what a socket transport would carry.
/// Arriving envelopes are sorted into a mailbox keyed by `(source, tag)`
/// and kept until the matching receive is polled, so messages may arrive in
/// any order relative to the receives that consume them.
pub struct ChannelTransport {
    rank: usize,
    peers: Vec<Sender<Vec<u8>>>,
    inbox: Receiver<Vec<u8>>,
    mailbox: HashMap<(usize, Tag), VecDeque<Vec<f64>>>,
    next_request: u64,
}

impl ChannelTransport {
    /// Create a fully connected group of `size` transports, one per rank,
    /// in rank order.
    pub fn group(size: usize) -> Vec<Self> {
        let (sinks, sources): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();

        sources
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| ChannelTransport {
                rank,
                peers: sinks.clone(),
                inbox,
                mailbox: HashMap::new(),
                next_request: 0,
            })
            .collect()
    }

    fn drain(&mut self) -> Result<()> {
        loop {
            match self.inbox.try_recv() {
                Ok(bytes) => {
                    let envelope: Envelope = rmp_serde::from_slice(&bytes)?;
                    trace!("rank {}: mail from {} tag {:#x}", self.rank, envelope.source, envelope.tag);
                    self.mailbox
                        .entry((envelope.source, envelope.tag))
                        .or_insert_with(VecDeque::new)
                        .push_back(envelope.payload);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }
    }
}

impl Transport for ChannelTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn isend(&mut self, dest: usize, tag: Tag, payload: &[f64]) -> Result<Request> {
        let peer = self
            .peers
            .get(dest)
            .ok_or_else(|| Error::Transport(format!("no rank {} in a group of {}", dest, self.peers.len())))?;
        let envelope = Envelope {
            source: self.rank,
            tag,
            payload: payload.to_vec(),
        };
        peer.send(rmp_serde::to_vec(&envelope)?)
            .map_err(|_| Error::Transport(format!("rank {} has hung up", dest)))?;

        let request = Request(self.next_request);
        self.next_request += 1;
        Ok(request)
    }

    fn test(&mut self, _request: Request) -> Result<bool> {
        Ok(true)
    }

    fn wait(&mut self, _request: Request) -> Result<()> {
        Ok(())
    }

    fn iprobe(&mut self, source: usize, tag: Tag) -> Result<Option<usize>> {
        self.drain()?;
        Ok(self.mailbox.get(&(source, tag)).and_then(|q| q.front()).map(|m| m.len()))
    }

    fn try_recv(&mut self, source: usize, tag: Tag) -> Result<Option<Vec<f64>>> {
        self.drain()?;

        let message = self.mailbox.get_mut(&(source, tag)).and_then(|q| q.pop_front());

        if message.is_some() {
            debug!("rank {}: received tag {:#x} from rank {}", self.rank, tag, source);
        }
        Ok(message)
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn messages_are_matched_by_source_and_tag() {
        let mut group = ChannelTransport::group(3);
        let mut c = group.pop().unwrap();
        let mut b = group.pop().unwrap();
        let mut a = group.pop().unwrap();

        a.isend(2, 7, &[1.0, 2.0]).unwrap();
        b.isend(2, 7, &[3.0]).unwrap();
        a.isend(2, 8, &[4.0]).unwrap();
        a.isend(2, 7, &[5.0]).unwrap();

        assert_eq!(c.iprobe(0, 8).unwrap(), Some(1));
        assert_eq!(c.try_recv(0, 7).unwrap(), Some(vec![1.0, 2.0]));
        assert_eq!(c.try_recv(0, 7).unwrap(), Some(vec![5.0]));
        assert_eq!(c.try_recv(0, 7).unwrap(), None);
        assert_eq!(c.try_recv(1, 7).unwrap(), Some(vec![3.0]));
        assert_eq!(c.try_recv(0, 8).unwrap(), Some(vec![4.0]));
        assert_eq!(b.try_recv(0, 7).unwrap(), None);
    }

    #[test]
    fn sending_to_an_unknown_rank_fails() {
        let mut group = ChannelTransport::group(1);
        assert!(matches!(group[0].isend(4, 0, &[]), Err(Error::Transport(_))));
    }
}
