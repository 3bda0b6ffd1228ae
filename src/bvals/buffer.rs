use crate::array::ParArray4;
use crate::index_space::IndexBox;
use crate::kernel::ExecSpace;
use crate::message::Request;
use crate::neighbor::MAX_NEIGHBOR_BUFFERS;
use super::BoundaryStatus;




/// Send side of one boundary buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendState {
    /// Nothing sent in the current phase.
    Idle,
    /// Handed to the transport; the request must be waited on before the
    /// send buffer is reused.
    InFlight(Request),
    /// Copied directly into a neighbor on this process.
    Completed,
}

/// Receive side of one boundary buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecvState {
    /// Never armed; nothing may be written or received.
    Idle,
    /// Armed and sized, no data yet.
    Waiting,
    /// Data present, not yet consumed.
    Arrived,
    /// Consumed in the current phase.
    Completed,
}

impl SendState {
    /// Return whether the data has been handed off in the current phase.
    pub fn is_sent(&self) -> bool {
        !matches!(self, SendState::Idle)
    }
}




/// Storage and state for the exchange with one neighbor relation.
#[derive(Clone, Debug)]
pub struct BoundaryBuffer {
    pub(crate) send: Vec<f64>,
    pub(crate) recv: Vec<f64>,
    pub(crate) recv_len: usize,
    pub(crate) send_state: SendState,
    pub(crate) recv_state: RecvState,
}

impl Default for BoundaryBuffer {
    fn default() -> Self {
        Self {
            send: Vec::new(),
            recv: Vec::new(),
            recv_len: 0,
            send_state: SendState::Idle,
            recv_state: RecvState::Idle,
        }
    }
}

impl BoundaryBuffer {
    /// Return the receive-side flag.
    pub fn status(&self) -> BoundaryStatus {
        match self.recv_state {
            RecvState::Idle | RecvState::Waiting => BoundaryStatus::Waiting,
            RecvState::Arrived => BoundaryStatus::Arrived,
            RecvState::Completed => BoundaryStatus::Completed,
        }
    }

    pub fn send_state(&self) -> SendState {
        self.send_state
    }

    pub fn recv_state(&self) -> RecvState {
        self.recv_state
    }

    /// Return the received data.
    pub fn received(&self) -> &[f64] {
        &self.recv[..self.recv_len]
    }

    /// Return whether a neighbor on this process may write into the
    /// receive buffer.
    pub(crate) fn is_armed(&self) -> bool {
        self.recv_state == RecvState::Waiting
    }

    /// Store a message in the receive buffer, growing it when the message is
    /// larger than the buffer. Returns true if the buffer was reallocated.
    pub(crate) fn store(&mut self, data: &[f64]) -> bool {
        let grown = data.len() > self.recv.len();

        if grown {
            self.recv.resize(data.len(), 0.0);
        }
        self.recv[..data.len()].copy_from_slice(data);
        self.recv_len = data.len();
        self.recv_state = RecvState::Arrived;
        grown
    }
}




/// The buffers of one field on one block, one slot per buffer id.
#[derive(Clone, Debug)]
pub struct BoundaryData {
    buffers: Vec<BoundaryBuffer>,
}

impl Default for BoundaryData {
    fn default() -> Self {
        Self {
            buffers: vec![BoundaryBuffer::default(); MAX_NEIGHBOR_BUFFERS],
        }
    }
}

impl BoundaryData {
    pub fn buffer(&self, bufid: usize) -> &BoundaryBuffer {
        &self.buffers[bufid]
    }

    pub(crate) fn buffer_mut(&mut self, bufid: usize) -> &mut BoundaryBuffer {
        &mut self.buffers[bufid]
    }
}




/// Copy `nv` components of `region` from `src` into `buf`, in the order of
/// [`IndexBox::linear_offset`].
pub fn pack(exec: &ExecSpace, src: &ParArray4, region: &IndexBox, nv: usize, buf: &mut [f64]) {
    let ni = region.i.len();
    let nj = region.j.len();
    let nk = region.k.len();
    let len = nv * region.len();

    if len == 0 {
        return;
    }
    let (si, ei) = (region.i.s, region.i.e);

    exec.for_each_row("pack", &mut buf[..len], ni, |row, out| {
        let j = region.j.s + (row % nj) as i64;
        let k = region.k.s + ((row / nj) % nk) as i64;
        let v = row / (nj * nk);
        let start = src.offset(v, k, j, si);
        let end = src.offset(v, k, j, ei) + 1;
        out.copy_from_slice(&src.as_slice()[start..end]);
    });
}

/// Copy `nv` components of `region` from `buf` into `dst`; the inverse of
/// [`pack`].
pub fn unpack(exec: &ExecSpace, buf: &[f64], region: &IndexBox, nv: usize, dst: &mut ParArray4) {
    if region.is_empty() || nv == 0 {
        return;
    }
    let (si, ei) = (region.i.s as usize, region.i.e as usize);
    let rows = dst.rows_mut(nv, region.k, region.j);

    exec.for_each_selected_row("unpack", rows, |(v, k, j), out| {
        let start = region.linear_offset(v, k, j, region.i.s);
        out[si..=ei].copy_from_slice(&buf[start..start + region.i.len()]);
    });
}
